//! Chunk size selection
//!
//! | file size        | chunk size |
//! |------------------|------------|
//! | < 100 MiB        | 5 MiB      |
//! | 100 MiB – 1 GiB  | 50 MiB     |
//! | >= 1 GiB         | 100 MiB    |
//!
//! 5 MiB is the smallest part size S3-compatible multipart backends accept
//! for every part but the last.

use sealdrop_core::types::MIB;
use sealdrop_core::{SealdropError, SealdropResult};

pub const MIN_CHUNK_SIZE: u64 = 5 * MIB;
const MEDIUM_CHUNK_SIZE: u64 = 50 * MIB;
const LARGE_CHUNK_SIZE: u64 = 100 * MIB;

const MEDIUM_FILE: u64 = 100 * MIB;
const LARGE_FILE: u64 = 1024 * MIB;

/// Part-count ceiling of S3-compatible multipart uploads.
pub const MAX_CHUNKS: u32 = 10_000;

/// Chunk size for a file of `file_size` bytes. Computed once, before
/// chunking begins, and used identically for encryption and range math.
pub fn optimal_chunk_size(file_size: u64) -> u64 {
    if file_size < MEDIUM_FILE {
        MIN_CHUNK_SIZE
    } else if file_size < LARGE_FILE {
        MEDIUM_CHUNK_SIZE
    } else {
        LARGE_CHUNK_SIZE
    }
}

/// Number of chunks covering `file_size` bytes. An empty file has none.
///
/// Layouts needing more than [`MAX_CHUNKS`] parts are rejected.
pub fn chunk_count(file_size: u64, chunk_size: u64) -> SealdropResult<u32> {
    if chunk_size == 0 {
        return Err(SealdropError::Configuration("chunk size must be non-zero".into()));
    }
    let chunks = file_size.div_ceil(chunk_size);
    u32::try_from(chunks)
        .ok()
        .filter(|n| *n <= MAX_CHUNKS)
        .ok_or_else(|| {
            SealdropError::Configuration(format!(
                "{file_size} bytes in {chunk_size}-byte chunks needs {chunks} parts (limit {MAX_CHUNKS})"
            ))
        })
}
