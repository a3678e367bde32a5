//! Shared fixtures: an in-memory object store behind a backend wrapper that
//! counts calls and can inject failures or hold parts back.

#![allow(dead_code)]

use std::io::Cursor;
use std::ops::Range;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use sealdrop_core::config::PipelineConfig;
use sealdrop_core::types::{CompletedPart, Expiry, UploadSession};
use sealdrop_core::{SealdropError, SealdropResult};
use sealdrop_pipeline::{CipherPool, SharePipeline, ShareRequest};
use sealdrop_storage::{build_memory_operator, MultipartBackend, OperatorBackend, OperatorManifestStore};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Network failure on the given part
    Transport(u32),
    /// Storage accepted the given part but exposed no ETag
    MissingEtag(u32),
    /// The completion call fails
    Complete,
}

pub struct TestBackend {
    pub inner: OperatorBackend,
    pub failure: Option<Failure>,
    /// When set, every part upload waits for a permit
    pub gate: Option<Semaphore>,
    pub first_part: Notify,
    pub aborts: AtomicUsize,
    pub completes: AtomicUsize,
    pub parts_done: AtomicUsize,
    /// Bytes read from the source, sampled when each part upload starts
    pub read_counter: Option<Arc<AtomicU64>>,
    pub samples: Mutex<Vec<(u64, usize)>>,
}

impl TestBackend {
    pub fn new(inner: OperatorBackend) -> Self {
        Self {
            inner,
            failure: None,
            gate: None,
            first_part: Notify::new(),
            aborts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            parts_done: AtomicUsize::new(0),
            read_counter: None,
            samples: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn sampling(mut self, counter: Arc<AtomicU64>) -> Self {
        self.read_counter = Some(counter);
        self
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn completes(&self) -> usize {
        self.completes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MultipartBackend for TestBackend {
    async fn initiate(&self, file_id: &str) -> SealdropResult<UploadSession> {
        self.inner.initiate(file_id).await
    }

    async fn upload_part(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> SealdropResult<CompletedPart> {
        if let Some(counter) = &self.read_counter {
            self.samples.lock().unwrap().push((
                counter.load(Ordering::SeqCst),
                self.parts_done.load(Ordering::SeqCst),
            ));
        }
        self.first_part.notify_one();
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        match self.failure {
            Some(Failure::Transport(n)) if n == part_number => {
                return Err(SealdropError::Transport(format!("part {n}: connection reset")));
            }
            Some(Failure::MissingEtag(n)) if n == part_number => {
                self.inner.upload_part(object_key, upload_id, part_number, body).await?;
                return Err(SealdropError::Configuration(format!(
                    "upload part {n}: storage response has no readable ETag header"
                )));
            }
            _ => {}
        }

        let part = self.inner.upload_part(object_key, upload_id, part_number, body).await?;
        self.parts_done.fetch_add(1, Ordering::SeqCst);
        Ok(part)
    }

    async fn complete(&self, object_key: &str, upload_id: &str, parts: &[CompletedPart]) -> SealdropResult<()> {
        self.completes.fetch_add(1, Ordering::SeqCst);
        if self.failure == Some(Failure::Complete) {
            return Err(SealdropError::Transport("complete: 503".into()));
        }
        self.inner.complete(object_key, upload_id, parts).await
    }

    async fn abort(&self, object_key: &str, upload_id: &str) -> SealdropResult<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort(object_key, upload_id).await
    }

    async fn put_small(&self, file_id: &str, body: Vec<u8>) -> SealdropResult<String> {
        self.inner.put_small(file_id, body).await
    }

    async fn read_range(&self, object_key: &str, range: Option<Range<u64>>) -> SealdropResult<Vec<u8>> {
        self.inner.read_range(object_key, range).await
    }
}

pub struct Fixture {
    pub backend: Arc<TestBackend>,
    pub store: Arc<OperatorManifestStore>,
    pub pool: CipherPool,
    pub pipeline: SharePipeline,
}

impl Fixture {
    pub fn new(chunk_size: Option<u64>) -> Self {
        Self::with_backend(chunk_size, |b| b)
    }

    pub fn with_backend(chunk_size: Option<u64>, configure: impl FnOnce(TestBackend) -> TestBackend) -> Self {
        let op = build_memory_operator().unwrap();
        let backend = Arc::new(configure(TestBackend::new(OperatorBackend::new(op.clone()))));
        let store = Arc::new(OperatorManifestStore::new(op));
        let config = PipelineConfig {
            workers: 2,
            upload_concurrency: 3,
            download_concurrency: 3,
            chunk_size_override: chunk_size,
        };
        let pool = CipherPool::new(config.workers);
        let pipeline = SharePipeline::new(pool.clone(), backend.clone(), store.clone(), config);
        Self {
            backend,
            store,
            pool,
            pipeline,
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

pub fn request(name: &str) -> ShareRequest {
    ShareRequest {
        original_name: name.to_string(),
        content_type: None,
        expiry: Expiry::OneDay,
        origin: "https://share.example".to_string(),
    }
}

/// Deterministic, non-repeating-looking test content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}

/// Reader that counts the bytes pulled from it.
pub struct CountingReader {
    inner: Cursor<Vec<u8>>,
    read: Arc<AtomicU64>,
}

impl CountingReader {
    pub fn new(data: Vec<u8>, read: Arc<AtomicU64>) -> Self {
        Self {
            inner: Cursor::new(data),
            read,
        }
    }
}

impl AsyncRead for CountingReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        this.read
            .fetch_add((buf.filled().len() - before) as u64, Ordering::SeqCst);
        result
    }
}
