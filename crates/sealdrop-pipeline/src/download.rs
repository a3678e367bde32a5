//! Streaming download-decrypt pipeline.
//!
//! Multi-chunk objects are fetched with one ranged read per chunk, at
//! offsets rebuilt from the manifest's stored chunk sizes. Reads run up to
//! `download_concurrency` ahead and decryption up to `workers` ahead, but
//! plaintext reaches the sink strictly in chunk order. Nothing is
//! finalized unless every chunk verified.

use std::pin::pin;
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use sealdrop_chunks::ReadPlan;
use sealdrop_core::link::ShareLink;
use sealdrop_core::types::{unix_now, FileManifest};
use sealdrop_core::{SealdropError, SealdropResult};
use sealdrop_crypto::MasterSecret;
use sealdrop_storage::fetch_manifest;
use tracing::{debug, info, warn};

use crate::job::CipherJob;
use crate::keyring::{resolve_cipher, ChunkCipher};
use crate::pipeline::SharePipeline;
use crate::progress::{ProgressFn, Reporter};
use crate::sink::PlaintextSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub file_id: String,
    pub original_name: String,
    pub bytes: u64,
    pub chunks: u32,
}

impl SharePipeline {
    /// The manifest of a live share.
    pub async fn lookup(&self, file_id: &str) -> SealdropResult<FileManifest> {
        fetch_manifest(&*self.manifests, file_id, unix_now()).await
    }

    /// Resolve a share link to its manifest and key, then download.
    ///
    /// Expired and missing files are both `SealdropError::NotFound`.
    pub async fn fetch_link(
        &self,
        link: &ShareLink,
        master: Option<&MasterSecret>,
        sink: &mut dyn PlaintextSink,
        progress: Option<&ProgressFn>,
    ) -> SealdropResult<DownloadOutcome> {
        let manifest = self.lookup(&link.file_id).await?;
        let cipher = resolve_cipher(&link.secret, &manifest, master)?;
        self.download_and_decrypt(&manifest, cipher, sink, progress)
            .await
    }

    /// Download and decrypt the object described by `manifest` into `sink`.
    ///
    /// On any failure the sink is discarded and the first error returned.
    pub async fn download_and_decrypt(
        &self,
        manifest: &FileManifest,
        cipher: ChunkCipher,
        sink: &mut dyn PlaintextSink,
        progress: Option<&ProgressFn>,
    ) -> SealdropResult<DownloadOutcome> {
        let plan = ReadPlan::from_manifest(manifest.chunk_count, manifest.chunk_sizes.as_deref())?;
        let cipher = Arc::new(cipher);
        let chunks = plan.chunk_count();
        let reporter = Reporter::new(progress, chunks);

        info!(file_id = %manifest.file_id, chunks, "download started");
        reporter.report("downloading", 0);

        let written = match self
            .write_plaintext(&manifest.object_key, &plan, &cipher, sink, &reporter)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                warn!(file_id = %manifest.file_id, error = %e, "download failed; discarding output");
                discard(sink).await;
                return Err(e);
            }
        };

        if written != manifest.original_size {
            warn!(
                file_id = %manifest.file_id,
                expected = manifest.original_size,
                written,
                "decrypted size differs from manifest"
            );
        }

        if let Err(e) = sink.finalize().await {
            discard(sink).await;
            return Err(e);
        }
        reporter.report("decrypted", chunks);

        if let Err(e) = self.manifests.record_download(&manifest.file_id).await {
            warn!(file_id = %manifest.file_id, error = %e, "failed to record download");
        }
        info!(file_id = %manifest.file_id, bytes = written, "download complete");

        Ok(DownloadOutcome {
            file_id: manifest.file_id.clone(),
            original_name: manifest.original_name.clone(),
            bytes: written,
            chunks,
        })
    }

    async fn write_plaintext(
        &self,
        object_key: &str,
        plan: &ReadPlan,
        cipher: &Arc<ChunkCipher>,
        sink: &mut dyn PlaintextSink,
        reporter: &Reporter<'_>,
    ) -> SealdropResult<u64> {
        let layout = match plan {
            ReadPlan::Whole => {
                let stored = self.backend.read_range(object_key, None).await?;
                let (_, plaintext) = self
                    .pool
                    .submit(CipherJob::decrypt(cipher, 0, stored))
                    .await?
                    .into_plaintext()?;
                let written = plaintext.len() as u64;
                sink.write(plaintext).await?;
                reporter.report("downloading", 1);
                return Ok(written);
            }
            ReadPlan::Ranged(layout) => layout,
        };

        let backend = &*self.backend;
        let pool = &self.pool;
        let chunks = stream::iter(layout.ranges().enumerate())
            .map(|(i, range)| async move {
                let index = i as u32;
                let stored = backend.read_range(object_key, Some(range.clone())).await?;
                debug!(chunk = index, start = range.start, bytes = stored.len(), "chunk fetched");
                Ok::<_, SealdropError>((index, stored))
            })
            .buffered(self.download_depth())
            .map_ok(|(index, stored)| pool.submit(CipherJob::decrypt(cipher, index, stored)))
            .try_buffered(self.cipher_depth());
        let mut chunks = pin!(chunks);

        let mut written = 0u64;
        let mut done = 0u32;
        while let Some(output) = chunks.next().await {
            let (index, plaintext) = output?.into_plaintext()?;
            if index != done {
                return Err(SealdropError::Other(anyhow::anyhow!(
                    "chunk {index} arrived while expecting chunk {done}"
                )));
            }
            written += plaintext.len() as u64;
            sink.write(plaintext).await?;
            done += 1;
            reporter.report("downloading", done);
        }
        Ok(written)
    }
}

async fn discard(sink: &mut dyn PlaintextSink) {
    if let Err(e) = sink.discard().await {
        warn!(error = %e, "failed to discard partial output");
    }
}
