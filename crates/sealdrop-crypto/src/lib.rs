//! sealdrop-crypto: per-chunk authenticated encryption for shared files
//!
//! Every file gets a fresh 256-bit key and a random 96-bit base nonce. Each
//! chunk is sealed independently with AES-256-GCM under a nonce derived from
//! the base nonce and the chunk index:
//!
//! ```text
//! chunk_nonce[0..8]  = base_nonce[0..8]
//! chunk_nonce[8..12] = le32(base_nonce[8..12]) ^ chunk_index   (little-endian)
//! stored chunk       = ciphertext || 16-byte tag
//! ```
//!
//! Hybrid mode splits the key into a 16-byte server half (wrapped at rest
//! under a master secret) and a 16-byte client half carried in the link.

pub mod chunk;
pub mod hybrid;
pub mod keys;
pub mod nonce;

pub use chunk::{decrypt_chunk, encrypt_chunk, open_stored_chunk, seal_chunk, SealedChunk};
pub use hybrid::{combine_halves, split_key, unwrap_server_half, wrap_server_half, KeyHalf, MasterSecret};
pub use keys::{generate_base_nonce, generate_key, BaseNonce, EncryptionKey};
pub use nonce::{derive_chunk_nonce, ChunkNonce};

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size (96-bit)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size
pub const TAG_SIZE: usize = 16;

/// Size of each hybrid key half
pub const HALF_KEY_SIZE: usize = KEY_SIZE / 2;
