//! Share-link format.
//!
//! Zero-knowledge: `<origin>/share/<fileId>#key=<hex>&iv=<hex>`
//! Hybrid:         `<origin>/share/<fileId>#ck=<hex>&iv=<hex>`
//!
//! Everything after `#` is the secret part. It is never sent to the server
//! and must never be logged, so `Debug` on these types redacts it.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{SealdropError, SealdropResult};

const KEY_HEX_LEN: usize = 64;
const CLIENT_HALF_HEX_LEN: usize = 32;
const IV_HEX_LEN: usize = 24;

/// Secret material carried in the link fragment.
#[derive(Clone, PartialEq, Eq)]
pub enum LinkSecret {
    /// Full 256-bit key and base nonce, both hex.
    ZeroKnowledge {
        key_hex: Zeroizing<String>,
        iv_hex: Zeroizing<String>,
    },
    /// Client half of a hybrid key and base nonce, both hex.
    Hybrid {
        client_half_hex: Zeroizing<String>,
        iv_hex: Zeroizing<String>,
    },
}

impl LinkSecret {
    pub fn iv_hex(&self) -> &str {
        match self {
            LinkSecret::ZeroKnowledge { iv_hex, .. } | LinkSecret::Hybrid { iv_hex, .. } => iv_hex.as_str(),
        }
    }

    fn fragment(&self) -> Zeroizing<String> {
        Zeroizing::new(match self {
            LinkSecret::ZeroKnowledge { key_hex, iv_hex } => {
                format!("key={}&iv={}", key_hex.as_str(), iv_hex.as_str())
            }
            LinkSecret::Hybrid {
                client_half_hex,
                iv_hex,
            } => format!("ck={}&iv={}", client_half_hex.as_str(), iv_hex.as_str()),
        })
    }
}

impl fmt::Debug for LinkSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkSecret::ZeroKnowledge { .. } => f.write_str("ZeroKnowledge([REDACTED])"),
            LinkSecret::Hybrid { .. } => f.write_str("Hybrid([REDACTED])"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub origin: String,
    pub file_id: String,
    pub secret: LinkSecret,
}

impl ShareLink {
    pub fn new(origin: impl Into<String>, file_id: impl Into<String>, secret: LinkSecret) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            file_id: file_id.into(),
            secret,
        }
    }

    /// The link without its fragment. Safe to log.
    pub fn public_url(&self) -> String {
        format!("{}/share/{}", self.origin, self.file_id)
    }

    /// The complete link including the secret fragment.
    pub fn to_url(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("{}#{}", self.public_url(), self.secret.fragment().as_str()))
    }

    pub fn parse(url: &str) -> SealdropResult<Self> {
        let (base, fragment) = url
            .split_once('#')
            .ok_or_else(|| invalid("missing '#' fragment"))?;

        let (origin, file_id) = base
            .rsplit_once("/share/")
            .ok_or_else(|| invalid("expected '/share/<fileId>' path"))?;
        if file_id.is_empty() || file_id.contains('/') || file_id.contains('?') {
            return Err(invalid("malformed file id"));
        }

        let mut key = None;
        let mut client_half = None;
        let mut iv = None;
        for pair in fragment.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid("fragment parameter without '='"))?;
            match name {
                "key" => key = Some(value),
                "ck" => client_half = Some(value),
                "iv" => iv = Some(value),
                _ => {}
            }
        }

        let iv_hex = check_hex(iv.ok_or_else(|| invalid("missing iv"))?, IV_HEX_LEN, "iv")?;
        let secret = match (key, client_half) {
            (Some(k), None) => LinkSecret::ZeroKnowledge {
                key_hex: check_hex(k, KEY_HEX_LEN, "key")?,
                iv_hex,
            },
            (None, Some(ck)) => LinkSecret::Hybrid {
                client_half_hex: check_hex(ck, CLIENT_HALF_HEX_LEN, "ck")?,
                iv_hex,
            },
            (Some(_), Some(_)) => return Err(invalid("both key and ck present")),
            (None, None) => return Err(invalid("missing key or ck")),
        };

        Ok(ShareLink::new(origin, file_id, secret))
    }
}

impl fmt::Debug for ShareLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareLink")
            .field("url", &self.public_url())
            .field("secret", &self.secret)
            .finish()
    }
}

fn invalid(msg: &str) -> SealdropError {
    SealdropError::InvalidLink(msg.to_string())
}

fn check_hex(value: &str, len: usize, name: &str) -> SealdropResult<Zeroizing<String>> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SealdropError::InvalidLink(format!(
            "{name} must be {len} hex characters"
        )));
    }
    Ok(Zeroizing::new(value.to_ascii_lowercase()))
}
