//! Fixed-size chunk source
//!
//! Splits a byte source of known length into consecutive chunks covering
//! `[0, total_size)` with no gaps or overlaps. Chunks are read on demand, so
//! only the chunk being handed out is resident. The source owns its reader
//! and cannot be rewound; iterating twice needs a fresh source.

use futures::stream::{self, Stream};
use sealdrop_core::{SealdropError, SealdropResult};
use std::io::Cursor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// One chunk of plaintext with its position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub offset: u64,
    pub data: Vec<u8>,
    pub is_last: bool,
}

impl ChunkDescriptor {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub struct ChunkSource<R> {
    reader: R,
    total_size: u64,
    chunk_size: u64,
    total_chunks: u32,
    next_index: u32,
    offset: u64,
}

impl<R: AsyncRead + Unpin> ChunkSource<R> {
    /// Fails with `Configuration` for a zero chunk size or a layout over
    /// the multipart part limit.
    pub fn new(reader: R, total_size: u64, chunk_size: u64) -> SealdropResult<Self> {
        let total_chunks = crate::policy::chunk_count(total_size, chunk_size)?;
        Ok(Self {
            reader,
            total_size,
            chunk_size,
            total_chunks,
            next_index: 0,
            offset: 0,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks this source yields in total.
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Read the next chunk, or `None` once `total_size` bytes were produced.
    ///
    /// A reader that ends before `total_size` is an I/O error.
    pub async fn next_chunk(&mut self) -> SealdropResult<Option<ChunkDescriptor>> {
        if self.offset >= self.total_size {
            return Ok(None);
        }

        let len = self.chunk_size.min(self.total_size - self.offset);
        let mut data = vec![0u8; len as usize];
        self.reader.read_exact(&mut data).await?;

        let chunk = ChunkDescriptor {
            index: self.next_index,
            offset: self.offset,
            data,
            is_last: self.offset + len == self.total_size,
        };
        debug!(chunk = chunk.index, offset = chunk.offset, bytes = len, "read chunk");

        self.offset += len;
        self.next_index += 1;
        Ok(Some(chunk))
    }

    /// Consume the source as a lazy stream of chunks.
    pub fn into_stream(self) -> impl Stream<Item = SealdropResult<ChunkDescriptor>> {
        stream::try_unfold(self, |mut source| async move {
            let next = source.next_chunk().await?;
            Ok::<_, SealdropError>(next.map(|chunk| (chunk, source)))
        })
    }
}

impl ChunkSource<tokio::fs::File> {
    /// Open a file on disk; its current length is the total size.
    pub async fn open(path: &Path, chunk_size: u64) -> SealdropResult<Self> {
        let file = tokio::fs::File::open(path).await?;
        let total_size = file.metadata().await?.len();
        Self::new(file, total_size, chunk_size)
    }
}

impl ChunkSource<Cursor<Vec<u8>>> {
    /// Chunk an in-memory buffer.
    pub fn from_vec(data: Vec<u8>, chunk_size: u64) -> SealdropResult<Self> {
        let total_size = data.len() as u64;
        Self::new(Cursor::new(data), total_size, chunk_size)
    }
}
