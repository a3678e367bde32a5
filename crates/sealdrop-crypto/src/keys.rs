//! Per-file key material: the encryption key and the base nonce.

use rand::RngCore;
use sealdrop_core::{SealdropError, SealdropResult};
use zeroize::{Zeroize, Zeroizing};

use crate::nonce::{derive_chunk_nonce, ChunkNonce};
use crate::{KEY_SIZE, NONCE_SIZE};

/// A per-file 256-bit encryption key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn from_hex(hex_str: &str) -> SealdropResult<Self> {
        Ok(Self::from_bytes(decode_fixed::<KEY_SIZE>(hex_str, "key")?))
    }

    /// Hex form for the link fragment. The returned string is wiped on drop.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes))
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The random 96-bit per-file nonce every chunk nonce is derived from.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BaseNonce {
    bytes: [u8; NONCE_SIZE],
}

impl BaseNonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    pub fn from_hex(hex_str: &str) -> SealdropResult<Self> {
        Ok(Self::from_bytes(decode_fixed::<NONCE_SIZE>(hex_str, "iv")?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn for_chunk(&self, index: u32) -> ChunkNonce {
        derive_chunk_nonce(&self.bytes, index)
    }
}

impl std::fmt::Debug for BaseNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseNonce")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit file encryption key.
pub fn generate_key() -> EncryptionKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    EncryptionKey::from_bytes(bytes)
}

/// Generate a random 96-bit base nonce.
pub fn generate_base_nonce() -> BaseNonce {
    let mut bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    BaseNonce::from_bytes(bytes)
}

pub(crate) fn decode_fixed<const N: usize>(hex_str: &str, what: &str) -> SealdropResult<[u8; N]> {
    let decoded = Zeroizing::new(
        hex::decode(hex_str).map_err(|e| SealdropError::Crypto(format!("{what} is not valid hex: {e}")))?,
    );
    if decoded.len() != N {
        return Err(SealdropError::Crypto(format!(
            "{what} has wrong size: {} bytes (expected {N})",
            decoded.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&decoded);
    Ok(out)
}
