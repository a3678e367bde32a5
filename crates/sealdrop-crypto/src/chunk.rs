//! Per-chunk AES-256-GCM encryption/decryption
//!
//! Stored chunk format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! nonce = derive_chunk_nonce(base_nonce, chunk_index), no AAD
//! ```
//!
//! Ciphertext length always equals plaintext length, so the stored size of
//! a chunk is its plaintext size plus 16.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use sealdrop_core::{SealdropError, SealdropResult};
use zeroize::Zeroize;

use crate::keys::{BaseNonce, EncryptionKey};
use crate::nonce::ChunkNonce;
use crate::TAG_SIZE;

const AUTH_FAILED: &str = "authentication tag mismatch";

/// Encrypted chunk with its tag held separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedChunk {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

impl SealedChunk {
    /// Length of the stored form (`ciphertext || tag`).
    pub fn stored_len(&self) -> u64 {
        (self.ciphertext.len() + TAG_SIZE) as u64
    }

    /// Append the tag to the ciphertext, reusing its allocation.
    pub fn into_stored(self) -> Vec<u8> {
        let mut out = self.ciphertext;
        out.extend_from_slice(&self.tag);
        out
    }
}

/// Encrypt a single chunk in place.
///
/// Takes ownership of the plaintext buffer so no plaintext copy outlives the
/// call.
pub fn encrypt_chunk(
    key: &EncryptionKey,
    nonce: &ChunkNonce,
    mut plaintext: Vec<u8>,
) -> SealdropResult<SealedChunk> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    match cipher.encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut plaintext) {
        Ok(tag) => {
            let mut tag_bytes = [0u8; TAG_SIZE];
            tag_bytes.copy_from_slice(&tag);
            Ok(SealedChunk {
                ciphertext: plaintext,
                tag: tag_bytes,
            })
        }
        Err(e) => {
            plaintext.zeroize();
            Err(SealdropError::Crypto(format!("chunk encryption failed: {e}")))
        }
    }
}

/// Decrypt a single chunk in place.
///
/// Fails with `SealdropError::Crypto` when the tag does not verify. On
/// failure the working buffer is wiped before it is dropped, so unverified
/// plaintext is never observable.
pub fn decrypt_chunk(
    key: &EncryptionKey,
    nonce: &ChunkNonce,
    mut ciphertext: Vec<u8>,
    tag: &[u8; TAG_SIZE],
) -> SealdropResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    match cipher.decrypt_in_place_detached(
        Nonce::from_slice(nonce),
        b"",
        &mut ciphertext,
        Tag::from_slice(tag),
    ) {
        Ok(()) => Ok(ciphertext),
        Err(_) => {
            ciphertext.zeroize();
            Err(SealdropError::Crypto(AUTH_FAILED.into()))
        }
    }
}

/// Encrypt chunk `index` of a file and return its stored form.
pub fn seal_chunk(
    key: &EncryptionKey,
    base: &BaseNonce,
    index: u32,
    plaintext: Vec<u8>,
) -> SealdropResult<SealedChunk> {
    encrypt_chunk(key, &base.for_chunk(index), plaintext)
}

/// Decrypt chunk `index` from its stored form (`ciphertext || tag`).
///
/// Any verification failure, including a stored chunk too short to carry a
/// tag, is reported as `ChunkIntegrity { index }`.
pub fn open_stored_chunk(
    key: &EncryptionKey,
    base: &BaseNonce,
    index: u32,
    mut stored: Vec<u8>,
) -> SealdropResult<Vec<u8>> {
    if stored.len() < TAG_SIZE {
        return Err(SealdropError::ChunkIntegrity { index });
    }
    let split = stored.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&stored[split..]);
    stored.truncate(split);

    decrypt_chunk(key, &base.for_chunk(index), stored, &tag).map_err(|e| match e {
        SealdropError::Crypto(_) => SealdropError::ChunkIntegrity { index },
        other => other,
    })
}
