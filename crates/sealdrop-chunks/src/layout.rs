//! Stored byte-range layout of an uploaded object.
//!
//! Chunk `i` of a multi-chunk object occupies the half-open range
//! `[sum(sizes[..i]), sum(sizes[..=i]))` of the stored object, where each
//! size is ciphertext length plus the 16-byte tag.

use std::ops::Range;

use sealdrop_core::{SealdropError, SealdropResult};

/// How a downloader fetches the stored chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// Single-chunk object, fetched and decrypted in one step.
    Whole,
    /// One ranged read per chunk, in chunk order.
    Ranged(ChunkLayout),
}

impl ReadPlan {
    /// Build the plan from manifest fields.
    ///
    /// A multi-chunk object without per-chunk sizes is a configuration
    /// defect: there is no way to locate the chunk boundaries.
    pub fn from_manifest(chunk_count: u32, chunk_sizes: Option<&[u64]>) -> SealdropResult<Self> {
        match (chunk_count, chunk_sizes) {
            (0 | 1, None) => Ok(ReadPlan::Whole),
            (_, Some(sizes)) => {
                if sizes.len() != chunk_count as usize {
                    return Err(SealdropError::Configuration(format!(
                        "manifest lists {} chunk sizes for {chunk_count} chunks",
                        sizes.len()
                    )));
                }
                Ok(ReadPlan::Ranged(ChunkLayout::new(sizes)))
            }
            (n, None) => Err(SealdropError::Configuration(format!(
                "chunk sizes missing for {n}-chunk object; cannot compute byte ranges"
            ))),
        }
    }

    pub fn chunk_count(&self) -> u32 {
        match self {
            ReadPlan::Whole => 1,
            ReadPlan::Ranged(layout) => layout.len() as u32,
        }
    }
}

/// Cumulative offsets over stored chunk sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    /// `offsets[i]` is the start of chunk `i`; the final entry is the total.
    offsets: Vec<u64>,
}

impl ChunkLayout {
    pub fn new(sizes: &[u64]) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        let mut acc = 0u64;
        offsets.push(acc);
        for size in sizes {
            acc += size;
            offsets.push(acc);
        }
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn range(&self, index: usize) -> Option<Range<u64>> {
        let start = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        Some(start..end)
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.offsets.windows(2).map(|w| w[0]..w[1])
    }
}
