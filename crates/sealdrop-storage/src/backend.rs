//! Multipart session contract shared by every storage backend.

use std::ops::Range;

use async_trait::async_trait;
use sealdrop_core::types::{CompletedPart, UploadSession};
use sealdrop_core::SealdropResult;

/// Object key under which a shared file's ciphertext is stored.
pub fn object_key_for(file_id: &str) -> String {
    format!("files/{file_id}.enc")
}

/// Storage operations the upload and download pipelines depend on.
///
/// ## Contract
///
/// - Implementations do not retry internally; a failed call surfaces as
///   `SealdropError::Transport` and the caller decides.
/// - `upload_part` must return the backend's integrity tag for the part. A
///   backend that cannot produce one reports `SealdropError::Configuration`.
/// - `complete` receives parts already sorted by part number.
/// - `abort` is best-effort and must be safe to call on a session that was
///   already aborted.
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Open a multipart session for `file_id`.
    async fn initiate(&self, file_id: &str) -> SealdropResult<UploadSession>;

    /// Upload one part (1-based `part_number`).
    async fn upload_part(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> SealdropResult<CompletedPart>;

    /// Assemble the uploaded parts into the final object.
    async fn complete(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> SealdropResult<()>;

    /// Discard a session and every part uploaded to it.
    async fn abort(&self, object_key: &str, upload_id: &str) -> SealdropResult<()>;

    /// Store a small object in one request. Returns its object key.
    async fn put_small(&self, file_id: &str, body: Vec<u8>) -> SealdropResult<String>;

    /// Read a stored object, or the half-open byte `range` of it.
    async fn read_range(&self, object_key: &str, range: Option<Range<u64>>) -> SealdropResult<Vec<u8>>;
}
