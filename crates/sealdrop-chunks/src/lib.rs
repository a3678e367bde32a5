//! sealdrop-chunks: fixed-size chunking of shared files
//!
//! # Overview
//! - `policy`: chunk size as a pure function of file size
//! - `source`: lazy, forward-only chunk reader over any `AsyncRead`
//! - `layout`: stored (ciphertext + tag) byte ranges for ranged downloads

pub mod layout;
pub mod policy;
pub mod source;

pub use layout::{ChunkLayout, ReadPlan};
pub use policy::{chunk_count, optimal_chunk_size, MAX_CHUNKS, MIN_CHUNK_SIZE};
pub use source::{ChunkDescriptor, ChunkSource};
