//! Per-file key material for both share modes.

use sealdrop_core::link::LinkSecret;
use sealdrop_core::types::FileManifest;
use sealdrop_core::{SealdropError, SealdropResult};
use sealdrop_crypto::{
    combine_halves, generate_base_nonce, generate_key, open_stored_chunk, seal_chunk,
    unwrap_server_half, wrap_server_half, BaseNonce, EncryptionKey, KeyHalf, MasterSecret,
    SealedChunk,
};
use zeroize::Zeroizing;

/// Key and base nonce of one file. Owned by a single upload or download
/// and dropped (zeroized) when it returns.
pub struct ChunkCipher {
    key: EncryptionKey,
    base_nonce: BaseNonce,
}

impl ChunkCipher {
    pub fn new(key: EncryptionKey, base_nonce: BaseNonce) -> Self {
        Self { key, base_nonce }
    }

    pub fn from_hex(key_hex: &str, iv_hex: &str) -> SealdropResult<Self> {
        Ok(Self::new(
            EncryptionKey::from_hex(key_hex)?,
            BaseNonce::from_hex(iv_hex)?,
        ))
    }

    pub fn key_hex(&self) -> Zeroizing<String> {
        self.key.to_hex()
    }

    pub fn iv_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(self.base_nonce.to_hex())
    }

    pub fn seal(&self, index: u32, plaintext: Vec<u8>) -> SealdropResult<SealedChunk> {
        seal_chunk(&self.key, &self.base_nonce, index, plaintext)
    }

    pub fn open(&self, index: u32, stored: Vec<u8>) -> SealdropResult<Vec<u8>> {
        open_stored_chunk(&self.key, &self.base_nonce, index, stored)
    }
}

impl std::fmt::Debug for ChunkCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChunkCipher([REDACTED])")
    }
}

/// How the key of a new upload is produced and shared.
#[derive(Debug)]
pub enum KeyMode {
    /// The whole key travels in the link; nothing is stored server-side.
    ZeroKnowledge,
    /// The link carries the client half; the server half is wrapped under
    /// the master secret and stored in the manifest.
    Hybrid(MasterSecret),
}

/// Fresh key material for one upload.
#[derive(Debug)]
pub struct UploadKeys {
    pub cipher: ChunkCipher,
    pub link_secret: LinkSecret,
    /// Hex `iv || tag || ciphertext` of the server half (hybrid only)
    pub wrapped_server_key: Option<String>,
}

impl KeyMode {
    pub fn is_hybrid(&self) -> bool {
        matches!(self, KeyMode::Hybrid(_))
    }

    pub fn generate(&self) -> SealdropResult<UploadKeys> {
        let base_nonce = generate_base_nonce();
        let iv_hex = Zeroizing::new(base_nonce.to_hex());

        match self {
            KeyMode::ZeroKnowledge => {
                let key = generate_key();
                let link_secret = LinkSecret::ZeroKnowledge {
                    key_hex: key.to_hex(),
                    iv_hex,
                };
                Ok(UploadKeys {
                    cipher: ChunkCipher::new(key, base_nonce),
                    link_secret,
                    wrapped_server_key: None,
                })
            }
            KeyMode::Hybrid(master) => {
                let server = KeyHalf::generate();
                let client = KeyHalf::generate();
                let wrapped = wrap_server_half(master, &server)?;
                let link_secret = LinkSecret::Hybrid {
                    client_half_hex: client.to_hex(),
                    iv_hex,
                };
                Ok(UploadKeys {
                    cipher: ChunkCipher::new(combine_halves(&server, &client), base_nonce),
                    link_secret,
                    wrapped_server_key: Some(wrapped),
                })
            }
        }
    }
}

/// Rebuild the file cipher for a download from the link fragment and the
/// manifest. Hybrid links also need the master secret to unwrap the
/// server half.
pub fn resolve_cipher(
    secret: &LinkSecret,
    manifest: &FileManifest,
    master: Option<&MasterSecret>,
) -> SealdropResult<ChunkCipher> {
    match secret {
        LinkSecret::ZeroKnowledge { key_hex, iv_hex } => ChunkCipher::from_hex(key_hex, iv_hex),
        LinkSecret::Hybrid {
            client_half_hex,
            iv_hex,
        } => {
            let wrapped = manifest.wrapped_server_key.as_deref().ok_or_else(|| {
                SealdropError::Configuration(format!(
                    "file {} has no wrapped server key; not a hybrid share",
                    manifest.file_id
                ))
            })?;
            let master = master.ok_or_else(|| {
                SealdropError::Configuration("hybrid link requires the master secret".into())
            })?;
            let server = unwrap_server_half(master, wrapped)?;
            let client = KeyHalf::from_hex(client_half_hex)?;
            Ok(ChunkCipher::new(
                combine_halves(&server, &client),
                BaseNonce::from_hex(iv_hex)?,
            ))
        }
    }
}
