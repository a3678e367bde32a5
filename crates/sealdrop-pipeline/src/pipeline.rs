use std::sync::Arc;

use sealdrop_core::config::PipelineConfig;
use sealdrop_storage::{ManifestStore, MultipartBackend};
use tracing::warn;

use crate::job::CipherPool;

/// Orchestrates uploads and downloads over one cipher pool, one storage
/// backend and one manifest store.
///
/// The pool is owned by the caller: construct it, hand a clone to the
/// pipeline, and call `CipherPool::shutdown` when the top-level operation
/// is done.
pub struct SharePipeline {
    pub(crate) pool: CipherPool,
    pub(crate) backend: Arc<dyn MultipartBackend>,
    pub(crate) manifests: Arc<dyn ManifestStore>,
    pub(crate) config: PipelineConfig,
}

impl SharePipeline {
    pub fn new(
        pool: CipherPool,
        backend: Arc<dyn MultipartBackend>,
        manifests: Arc<dyn ManifestStore>,
        config: PipelineConfig,
    ) -> Self {
        if pool.size() != config.workers.max(1) {
            warn!(
                pool = pool.size(),
                configured = config.workers,
                "cipher pool size differs from pipeline.workers"
            );
        }
        Self {
            pool,
            backend,
            manifests,
            config,
        }
    }

    pub fn pool(&self) -> &CipherPool {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn cipher_depth(&self) -> usize {
        self.config.workers.max(1)
    }

    pub(crate) fn upload_depth(&self) -> usize {
        self.config.upload_concurrency.max(1)
    }

    pub(crate) fn download_depth(&self) -> usize {
        self.config.download_concurrency.max(1)
    }
}
