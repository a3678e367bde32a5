//! Hybrid-mode key halves and the at-rest wrap of the server half.
//!
//! ```text
//! file key      = server_half (16 bytes) || client_half (16 bytes)
//! wrapping key  = SHA-256(master secret)
//! wrapped half  = hex( iv (12) || tag (16) || ciphertext (16) )
//! ```
//!
//! The wrapped layout is a stored format shared with the share server and is
//! kept byte-for-byte.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;
use sealdrop_core::{SealdropError, SealdropResult};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::keys::{decode_fixed, EncryptionKey};
use crate::{HALF_KEY_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// One 128-bit half of a hybrid key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyHalf {
    bytes: [u8; HALF_KEY_SIZE],
}

impl KeyHalf {
    pub fn from_bytes(bytes: [u8; HALF_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; HALF_KEY_SIZE] {
        &self.bytes
    }

    pub fn from_hex(hex_str: &str) -> SealdropResult<Self> {
        Ok(Self::from_bytes(decode_fixed::<HALF_KEY_SIZE>(hex_str, "key half")?))
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; HALF_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }
}

impl Drop for KeyHalf {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for KeyHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHalf")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Application-wide secret protecting server halves at rest.
pub struct MasterSecret(SecretString);

impl MasterSecret {
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }

    fn wrapping_key(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        let digest = Sha256::digest(self.0.expose_secret().as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&digest);
        key
    }
}

impl From<String> for MasterSecret {
    fn from(value: String) -> Self {
        Self(SecretString::from(value))
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// Concatenate the halves into the file key: server half first.
pub fn combine_halves(server: &KeyHalf, client: &KeyHalf) -> EncryptionKey {
    let mut bytes = [0u8; KEY_SIZE];
    bytes[..HALF_KEY_SIZE].copy_from_slice(server.as_bytes());
    bytes[HALF_KEY_SIZE..].copy_from_slice(client.as_bytes());
    EncryptionKey::from_bytes(bytes)
}

/// Split a file key into (server half, client half).
pub fn split_key(key: &EncryptionKey) -> (KeyHalf, KeyHalf) {
    let mut server = [0u8; HALF_KEY_SIZE];
    let mut client = [0u8; HALF_KEY_SIZE];
    server.copy_from_slice(&key.as_bytes()[..HALF_KEY_SIZE]);
    client.copy_from_slice(&key.as_bytes()[HALF_KEY_SIZE..]);
    (KeyHalf::from_bytes(server), KeyHalf::from_bytes(client))
}

/// Wrap the server half for storage. Output is hex of `iv || tag || ciphertext`.
pub fn wrap_server_half(master: &MasterSecret, half: &KeyHalf) -> SealdropResult<String> {
    let wrapping_key = master.wrapping_key();
    let cipher = Aes256Gcm::new((&*wrapping_key).into());

    let mut iv = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut buf = Zeroizing::new(half.as_bytes().to_vec());
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut *buf)
        .map_err(|e| SealdropError::Crypto(format!("server key wrap failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + HALF_KEY_SIZE);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&buf);
    Ok(hex::encode(out))
}

/// Reverse of [`wrap_server_half`].
pub fn unwrap_server_half(master: &MasterSecret, wrapped_hex: &str) -> SealdropResult<KeyHalf> {
    let data = hex::decode(wrapped_hex)
        .map_err(|e| SealdropError::Crypto(format!("wrapped server key is not valid hex: {e}")))?;
    if data.len() != NONCE_SIZE + TAG_SIZE + HALF_KEY_SIZE {
        return Err(SealdropError::Crypto(format!(
            "wrapped server key has wrong size: {} bytes (expected {})",
            data.len(),
            NONCE_SIZE + TAG_SIZE + HALF_KEY_SIZE
        )));
    }

    let (iv, rest) = data.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let wrapping_key = master.wrapping_key();
    let cipher = Aes256Gcm::new((&*wrapping_key).into());
    let mut buf = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut *buf, Tag::from_slice(tag))
        .map_err(|_| {
            SealdropError::Crypto("server key unwrap failed: wrong master secret or corrupted data".into())
        })?;

    let mut bytes = [0u8; HALF_KEY_SIZE];
    bytes.copy_from_slice(&buf);
    Ok(KeyHalf::from_bytes(bytes))
}
