//! Destinations for decrypted plaintext.
//!
//! The download pipeline writes chunks in ascending order and then calls
//! exactly one of `finalize` (every chunk verified) or `discard` (any
//! failure). A sink must not expose partial output before `finalize`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sealdrop_core::SealdropResult;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use zeroize::{Zeroize, Zeroizing};

#[async_trait]
pub trait PlaintextSink: Send {
    /// Append the next chunk of plaintext.
    async fn write(&mut self, data: Vec<u8>) -> SealdropResult<()>;

    /// Make the output visible at its destination.
    async fn finalize(&mut self) -> SealdropResult<()>;

    /// Drop everything written so far. Must be safe to call after a
    /// failed `write`.
    async fn discard(&mut self) -> SealdropResult<()>;
}

/// Accumulates plaintext segments and joins them on `finalize`.
///
/// Holds the whole file in memory; use it only when the output cannot be
/// written incrementally. Segments are wiped as they are joined or
/// discarded.
#[derive(Default)]
pub struct MemorySink {
    segments: Vec<Zeroizing<Vec<u8>>>,
    assembled: Option<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assembled plaintext, if the sink was finalized.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.assembled
    }
}

#[async_trait]
impl PlaintextSink for MemorySink {
    async fn write(&mut self, data: Vec<u8>) -> SealdropResult<()> {
        self.segments.push(Zeroizing::new(data));
        Ok(())
    }

    async fn finalize(&mut self) -> SealdropResult<()> {
        // sized up front so no un-wiped reallocation is left behind
        let total = self.segments.iter().map(|s| s.len()).sum();
        let mut assembled = Vec::with_capacity(total);
        for segment in self.segments.drain(..) {
            assembled.extend_from_slice(&segment);
        }
        self.assembled = Some(assembled);
        Ok(())
    }

    async fn discard(&mut self) -> SealdropResult<()> {
        self.segments.clear();
        if let Some(mut assembled) = self.assembled.take() {
            assembled.zeroize();
        }
        Ok(())
    }
}

/// Streams plaintext into `<dest>.sealdrop_tmp` and renames it to `dest`
/// on `finalize`. `discard` removes the temporary file, so a failed
/// download never leaves anything at `dest`.
pub struct FileSink {
    dest: PathBuf,
    tmp: PathBuf,
    file: Option<tokio::fs::File>,
    written: u64,
}

impl FileSink {
    pub async fn create(dest: impl Into<PathBuf>) -> SealdropResult<Self> {
        let dest = dest.into();
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(&dest);
        let file = tokio::fs::File::create(&tmp).await?;
        debug!(tmp = %tmp.display(), "opened download sink");
        Ok(Self {
            dest,
            tmp,
            file: Some(file),
            written: 0,
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".sealdrop_tmp");
    dest.with_file_name(name)
}

fn closed() -> std::io::Error {
    std::io::Error::other("file sink already finalized or discarded")
}

#[async_trait]
impl PlaintextSink for FileSink {
    async fn write(&mut self, data: Vec<u8>) -> SealdropResult<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(&data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    async fn finalize(&mut self) -> SealdropResult<()> {
        let mut file = self.file.take().ok_or_else(closed)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&self.tmp, &self.dest).await?;
        debug!(dest = %self.dest.display(), bytes = self.written, "download sink finalized");
        Ok(())
    }

    async fn discard(&mut self) -> SealdropResult<()> {
        self.file.take();
        match tokio::fs::remove_file(&self.tmp).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(tmp = %self.tmp.display(), error = %e, "failed to remove partial download");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_assembles_in_order() {
        let mut sink = MemorySink::new();
        sink.write(b"hello ".to_vec()).await.unwrap();
        sink.write(b"world".to_vec()).await.unwrap();
        sink.finalize().await.unwrap();
        assert_eq!(sink.into_bytes().unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_memory_sink_finalize_releases_segments() {
        let mut sink = MemorySink::new();
        sink.write(vec![7; 100]).await.unwrap();
        sink.write(vec![8; 28]).await.unwrap();
        let _: &[Zeroizing<Vec<u8>>] = &sink.segments;

        sink.finalize().await.unwrap();
        assert!(sink.segments.is_empty());
        let assembled = sink.assembled.as_ref().unwrap();
        assert_eq!(assembled.len(), 128);
        assert_eq!(assembled.capacity(), 128);
    }

    #[tokio::test]
    async fn test_memory_sink_discard() {
        let mut sink = MemorySink::new();
        sink.write(b"partial".to_vec()).await.unwrap();
        sink.discard().await.unwrap();
        assert!(sink.into_bytes().is_none());
    }

    #[tokio::test]
    async fn test_file_sink_renames_on_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out").join("report.pdf");

        let mut sink = FileSink::create(&dest).await.unwrap();
        sink.write(vec![1, 2, 3]).await.unwrap();
        assert!(!dest.exists());
        assert!(tmp_path(&dest).exists());

        sink.finalize().await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), vec![1, 2, 3]);
        assert!(!tmp_path(&dest).exists());
        assert_eq!(sink.bytes_written(), 3);
        assert!(sink.write(vec![4]).await.is_err());
    }

    #[tokio::test]
    async fn test_file_sink_discard_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mkv");

        let mut sink = FileSink::create(&dest).await.unwrap();
        sink.write(vec![0; 1024]).await.unwrap();
        sink.discard().await.unwrap();
        sink.discard().await.unwrap();

        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_tmp_path_keeps_extension() {
        assert_eq!(
            tmp_path(Path::new("/tmp/a.tar.gz")),
            PathBuf::from("/tmp/a.tar.gz.sealdrop_tmp")
        );
    }
}
