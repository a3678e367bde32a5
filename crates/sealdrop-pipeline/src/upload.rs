//! Streaming encrypt-upload pipeline.
//!
//! ```text
//! Idle -> KeyGenerated -> SmallObjectUpload -------------> Completed
//!                      \-> MultipartSession -> parts ----/
//!                                  \-> Aborted (any failure)
//! ```
//!
//! Chunks are read lazily, encrypted on the cipher pool in source order and
//! uploaded as parts with bounded concurrency. At most `workers` chunks are
//! being encrypted and `upload_concurrency` parts are in flight, so resident
//! chunk buffers stay bounded regardless of file size.

use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use sealdrop_chunks::{optimal_chunk_size, ChunkSource};
use sealdrop_core::link::ShareLink;
use sealdrop_core::types::{
    check_file_size, unix_now, ChunkRecord, CompletedPart, Expiry, FileManifest, UploadSession,
    SMALL_OBJECT_THRESHOLD,
};
use sealdrop_core::{SealdropError, SealdropResult};
use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::job::CipherJob;
use crate::keyring::{ChunkCipher, KeyMode, UploadKeys};
use crate::pipeline::SharePipeline;
use crate::progress::{ProgressFn, Reporter};

/// What to share and how long for.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub original_name: String,
    pub content_type: Option<String>,
    pub expiry: Expiry,
    /// Origin the share link points at
    pub origin: String,
}

pub struct UploadOutcome {
    pub file_id: String,
    pub object_key: String,
    pub key_hex: Zeroizing<String>,
    pub iv_hex: Zeroizing<String>,
    pub total_chunks: u32,
    /// Stored size of each chunk; `None` for single-chunk objects
    pub chunk_sizes: Option<Vec<u64>>,
    pub manifest: FileManifest,
    pub link: ShareLink,
}

impl std::fmt::Debug for UploadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOutcome")
            .field("file_id", &self.file_id)
            .field("object_key", &self.object_key)
            .field("key_hex", &"[REDACTED]")
            .field("iv_hex", &"[REDACTED]")
            .field("total_chunks", &self.total_chunks)
            .field("chunk_sizes", &self.chunk_sizes)
            .field("link", &self.link)
            .finish()
    }
}

struct StoredObject {
    object_key: String,
    chunk_sizes: Option<Vec<u64>>,
}

impl SharePipeline {
    /// Encrypt `total_size` bytes from `reader` and store them, then save
    /// the manifest and return the share link.
    ///
    /// On failure an open multipart session is aborted before the error is
    /// returned.
    pub async fn encrypt_and_upload<R>(
        &self,
        reader: R,
        total_size: u64,
        request: &ShareRequest,
        mode: &KeyMode,
        progress: Option<&ProgressFn>,
    ) -> SealdropResult<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        check_file_size(total_size)?;

        let chunk_size = self
            .config
            .chunk_size_override
            .filter(|cs| *cs > 0)
            .unwrap_or_else(|| optimal_chunk_size(total_size));
        let source = ChunkSource::new(reader, total_size, chunk_size)?;
        // an empty file is still one (empty) chunk
        let total_chunks = source.total_chunks().max(1);

        let UploadKeys {
            cipher,
            link_secret,
            wrapped_server_key,
        } = mode.generate()?;
        let cipher = Arc::new(cipher);
        let file_id = uuid::Uuid::new_v4().to_string();

        info!(
            file_id = %file_id,
            bytes = total_size,
            chunk_size,
            chunks = total_chunks,
            hybrid = mode.is_hybrid(),
            "upload started"
        );

        let reporter = Reporter::new(progress, total_chunks);
        reporter.report("initiating", 0);

        let stored = if total_chunks == 1 && total_size < SMALL_OBJECT_THRESHOLD {
            self.upload_small(&file_id, source, &cipher, &reporter).await?
        } else {
            self.upload_multipart(&file_id, source, total_chunks, &cipher, &reporter)
                .await?
        };

        let manifest = FileManifest {
            file_id: file_id.clone(),
            original_name: request.original_name.clone(),
            original_size: total_size,
            content_type: request.content_type.clone(),
            chunk_count: total_chunks,
            chunk_sizes: stored.chunk_sizes.clone(),
            object_key: stored.object_key.clone(),
            expires_at: request.expiry.expires_at(unix_now()),
            wrapped_server_key,
            download_count: 0,
        };
        if let Err(e) = self.manifests.save_manifest(&manifest).await {
            error!(file_id = %file_id, object_key = %stored.object_key, error = %e, "manifest save failed; object is unreachable");
            return Err(e);
        }

        reporter.report("complete", total_chunks);
        info!(file_id = %file_id, object_key = %stored.object_key, chunks = total_chunks, "upload complete");

        Ok(UploadOutcome {
            link: ShareLink::new(request.origin.as_str(), file_id.as_str(), link_secret),
            file_id,
            object_key: stored.object_key,
            key_hex: cipher.key_hex(),
            iv_hex: cipher.iv_hex(),
            total_chunks,
            chunk_sizes: stored.chunk_sizes,
            manifest,
        })
    }

    /// Upload a file from disk, taking its length from the filesystem.
    pub async fn share_file(
        &self,
        path: &Path,
        request: &ShareRequest,
        mode: &KeyMode,
        progress: Option<&ProgressFn>,
    ) -> SealdropResult<UploadOutcome> {
        let file = tokio::fs::File::open(path).await?;
        let total_size = file.metadata().await?.len();
        self.encrypt_and_upload(file, total_size, request, mode, progress)
            .await
    }

    async fn upload_small<R>(
        &self,
        file_id: &str,
        mut source: ChunkSource<R>,
        cipher: &Arc<ChunkCipher>,
        reporter: &Reporter<'_>,
    ) -> SealdropResult<StoredObject>
    where
        R: AsyncRead + Unpin + Send,
    {
        let plaintext = source
            .next_chunk()
            .await?
            .map(|chunk| chunk.data)
            .unwrap_or_default();

        let (_, sealed) = self
            .pool
            .submit(CipherJob::encrypt(cipher, 0, plaintext))
            .await?
            .into_sealed()?;

        reporter.report("uploading", 0);
        let bytes = sealed.stored_len();
        let object_key = self.backend.put_small(file_id, sealed.into_stored()).await?;
        debug!(file_id, bytes, "small object stored");
        reporter.report("uploading", 1);

        Ok(StoredObject {
            object_key,
            chunk_sizes: None,
        })
    }

    async fn upload_multipart<R>(
        &self,
        file_id: &str,
        source: ChunkSource<R>,
        total_chunks: u32,
        cipher: &Arc<ChunkCipher>,
        reporter: &Reporter<'_>,
    ) -> SealdropResult<StoredObject>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut session = self.backend.initiate(file_id).await?;
        let object_key = session.object_key.clone();
        let upload_id = session.upload_id.clone();
        debug!(file_id, upload_id = %upload_id, "multipart session opened");

        let mut records = match self.upload_parts(&session, source, cipher, reporter).await {
            Ok(uploaded) => {
                let mut records = Vec::with_capacity(uploaded.len());
                for (part, record) in uploaded {
                    session.record(part);
                    records.push(record);
                }
                records
            }
            Err(e) => {
                warn!(file_id, upload_id = %upload_id, error = %e, "upload failed; aborting session");
                self.abort_session(&object_key, &upload_id).await;
                return Err(e);
            }
        };

        if session.part_count() != total_chunks as usize {
            self.abort_session(&object_key, &upload_id).await;
            return Err(SealdropError::Other(anyhow::anyhow!(
                "uploaded {} parts for {total_chunks} chunks",
                session.part_count()
            )));
        }

        reporter.report("finalizing", total_chunks);
        let parts = session.into_sorted_parts();
        if let Err(e) = self.backend.complete(&object_key, &upload_id, &parts).await {
            warn!(file_id, upload_id = %upload_id, error = %e, "complete failed; aborting session");
            self.abort_session(&object_key, &upload_id).await;
            return Err(e);
        }

        records.sort_by_key(|r| r.index);
        let chunk_sizes = (total_chunks > 1).then(|| records.iter().map(|r| r.stored_len).collect());
        Ok(StoredObject {
            object_key,
            chunk_sizes,
        })
    }

    /// Encrypt and upload every chunk. Parts complete in any order.
    async fn upload_parts<R>(
        &self,
        session: &UploadSession,
        source: ChunkSource<R>,
        cipher: &Arc<ChunkCipher>,
        reporter: &Reporter<'_>,
    ) -> SealdropResult<Vec<(CompletedPart, ChunkRecord)>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let pool = &self.pool;
        let backend = &*self.backend;
        let object_key = session.object_key.as_str();
        let upload_id = session.upload_id.as_str();

        let uploads = source
            .into_stream()
            .map_ok(|chunk| pool.submit(CipherJob::encrypt(cipher, chunk.index, chunk.data)))
            .try_buffered(self.cipher_depth())
            .map_ok(|output| async move {
                let (index, sealed) = output.into_sealed()?;
                let stored_len = sealed.stored_len();
                let part_number = index + 1;
                let part = backend
                    .upload_part(object_key, upload_id, part_number, sealed.into_stored())
                    .await?;
                debug!(part = part_number, bytes = stored_len, "part uploaded");
                Ok::<_, SealdropError>((part, ChunkRecord { index, stored_len }))
            })
            .try_buffer_unordered(self.upload_depth());
        let mut uploads = pin!(uploads);

        let mut done = Vec::new();
        while let Some(uploaded) = uploads.next().await {
            done.push(uploaded?);
            reporter.report("uploading", done.len() as u32);
        }
        Ok(done)
    }

    async fn abort_session(&self, object_key: &str, upload_id: &str) {
        match self.backend.abort(object_key, upload_id).await {
            Ok(()) => info!(upload_id, "multipart session aborted"),
            Err(e) => {
                let e = SealdropError::SessionAbort(e.to_string());
                warn!(upload_id, error = %e, "left for stale-session cleanup");
            }
        }
    }
}
