//! sealdrop-pipeline: parallel chunk encryption and streaming transfer
//!
//! # Overview
//! - `pool`: fixed-size worker pool with FIFO queueing and terminal shutdown
//! - `job`: the encrypt/decrypt jobs the pool runs
//! - `keyring`: per-file key material for zero-knowledge and hybrid shares
//! - `upload`: chunk, encrypt and upload (small object or multipart)
//! - `download`: ranged reads, decryption and in-order delivery to a sink
//! - `sink`: in-memory and file plaintext destinations
//! - `progress`: per-chunk progress callback

pub mod download;
pub mod job;
pub mod keyring;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod sink;
pub mod upload;

pub use download::DownloadOutcome;
pub use job::{CipherJob, CipherOutput, CipherPool, DecryptChunk, EncryptChunk};
pub use keyring::{resolve_cipher, ChunkCipher, KeyMode, UploadKeys};
pub use pipeline::SharePipeline;
pub use pool::{PoolJob, WorkerPool};
pub use progress::{percent, ProgressFn};
pub use sink::{FileSink, MemorySink, PlaintextSink};
pub use upload::{ShareRequest, UploadOutcome};
