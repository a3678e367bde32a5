//! Fixed-size worker pool for CPU-bound jobs.
//!
//! Jobs run on a dedicated rayon pool so AES work never stalls the async
//! runtime. Submission is FIFO (`spawn_fifo`); each job gets a monotonically
//! increasing request id, and its result travels back over a oneshot channel
//! looked up by that id, so completions arriving out of order are matched to
//! the right caller.
//!
//! Each worker tracks the single request id it is currently running. A
//! completion is only delivered if it matches that slot, which rules out
//! double delivery.
//!
//! Lifecycle: threads are spawned on the first `submit`. `shutdown` is
//! terminal for the pool: every outstanding future resolves to
//! `SealdropError::PoolTerminated`, jobs still queued are skipped when a
//! worker reaches them, and later submissions fail immediately.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};
use sealdrop_core::{SealdropError, SealdropResult};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// A unit of work the pool can run.
pub trait PoolJob: Send + 'static {
    type Output: Send + 'static;

    fn run(self) -> SealdropResult<Self::Output>;
}

type Reply<T> = oneshot::Sender<SealdropResult<T>>;

struct PoolState<T> {
    threads: Option<Arc<ThreadPool>>,
    pending: HashMap<u64, Reply<T>>,
    next_id: u64,
    terminated: bool,
}

struct Shared<T> {
    size: usize,
    state: Mutex<PoolState<T>>,
    /// One slot per worker thread: the request id it is running, if any
    active: Vec<Mutex<Option<u64>>>,
}

pub struct WorkerPool<J: PoolJob> {
    shared: Arc<Shared<J::Output>>,
}

impl<J: PoolJob> Clone for WorkerPool<J> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<J: PoolJob> std::fmt::Debug for WorkerPool<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.shared.size)
            .field("pending", &self.pending_jobs())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl<J: PoolJob> WorkerPool<J> {
    /// Create a pool of `size` workers (at least one). No threads are
    /// started until the first job is submitted.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            shared: Arc::new(Shared {
                size,
                state: Mutex::new(PoolState {
                    threads: None,
                    pending: HashMap::new(),
                    next_id: 0,
                    terminated: false,
                }),
                active: (0..size).map(|_| Mutex::new(None)).collect(),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Whether worker threads have been spawned.
    pub fn is_started(&self) -> bool {
        lock(&self.shared.state).threads.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.shared.state).terminated
    }

    /// Jobs submitted whose result has not been delivered yet.
    pub fn pending_jobs(&self) -> usize {
        lock(&self.shared.state).pending.len()
    }

    /// Queue a job and return a future for its result.
    ///
    /// The job is queued immediately, not when the future is first polled.
    pub fn submit(&self, job: J) -> impl Future<Output = SealdropResult<J::Output>> + Send + 'static {
        let queued = self.enqueue(job);
        async move {
            match queued {
                // A dropped sender means the pool let go of the job
                Ok(rx) => rx.await.unwrap_or(Err(SealdropError::PoolTerminated)),
                Err(e) => Err(e),
            }
        }
    }

    fn enqueue(&self, job: J) -> SealdropResult<oneshot::Receiver<SealdropResult<J::Output>>> {
        let (tx, rx) = oneshot::channel();
        let (id, threads) = {
            let mut state = lock(&self.shared.state);
            if state.terminated {
                return Err(SealdropError::PoolTerminated);
            }
            let threads = match &state.threads {
                Some(threads) => Arc::clone(threads),
                None => {
                    let threads = Arc::new(build_threads(self.shared.size)?);
                    debug!(workers = self.shared.size, "worker pool started");
                    state.threads = Some(Arc::clone(&threads));
                    threads
                }
            };
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(id, tx);
            (id, threads)
        };

        let shared = Arc::clone(&self.shared);
        threads.spawn_fifo(move || shared.execute(id, job));
        Ok(rx)
    }

    /// Reject every outstanding job with `PoolTerminated` and release the
    /// worker threads. Idempotent.
    ///
    /// A job already running cannot be interrupted; it finishes on its
    /// thread and its result is discarded.
    pub fn shutdown(&self) {
        let (pending, threads) = {
            let mut state = lock(&self.shared.state);
            if state.terminated {
                return;
            }
            state.terminated = true;
            (std::mem::take(&mut state.pending), state.threads.take())
        };

        let rejected = pending.len();
        for (_, reply) in pending {
            let _ = reply.send(Err(SealdropError::PoolTerminated));
        }
        // Threads exit once they drain their queues; skipped jobs return at once
        drop(threads);
        info!(rejected, "worker pool shut down");
    }
}

impl<T: Send + 'static> Shared<T> {
    fn execute<J: PoolJob<Output = T>>(&self, id: u64, job: J) {
        let worker = rayon::current_thread_index()
            .filter(|w| *w < self.active.len())
            .unwrap_or(0);

        if !lock(&self.state).pending.contains_key(&id) {
            debug!(worker, id, "skipping job rejected by shutdown");
            return;
        }

        if let Some(stale) = lock(&self.active[worker]).replace(id) {
            error!(worker, stale, id, "worker started a job while another was active");
        }

        let result = match catch_unwind(AssertUnwindSafe(|| job.run())) {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(worker, id, %reason, "job panicked");
                Err(SealdropError::Worker { worker, reason })
            }
        };

        self.deliver(worker, id, result);
    }

    fn deliver(&self, worker: usize, id: u64, result: SealdropResult<T>) {
        let finished = lock(&self.active[worker]).take();
        if finished != Some(id) {
            error!(worker, id, ?finished, "dropping mismatched completion");
            return;
        }

        match lock(&self.state).pending.remove(&id) {
            Some(reply) => {
                // The caller may have stopped waiting
                let _ = reply.send(result);
            }
            None => debug!(worker, id, "discarding result of rejected job"),
        }
    }
}

fn build_threads(size: usize) -> SealdropResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(size)
        .thread_name(|i| format!("sealdrop-cipher-{i}"))
        .build()
        .map_err(|e| SealdropError::Configuration(format!("starting worker threads: {e}")))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    enum TestJob {
        Double(u64),
        Fail,
        Panic,
        /// Block the worker until the sender side is dropped or signals
        Gate(Arc<Mutex<mpsc::Receiver<()>>>),
    }

    impl PoolJob for TestJob {
        type Output = u64;

        fn run(self) -> SealdropResult<u64> {
            match self {
                TestJob::Double(n) => Ok(n * 2),
                TestJob::Fail => Err(SealdropError::ChunkIntegrity { index: 7 }),
                TestJob::Panic => panic!("boom"),
                TestJob::Gate(rx) => {
                    let _ = lock(&rx).recv_timeout(Duration::from_secs(10));
                    Ok(0)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_lazy_start() {
        let pool = WorkerPool::<TestJob>::new(2);
        assert!(!pool.is_started());
        assert_eq!(pool.submit(TestJob::Double(21)).await.unwrap(), 42);
        assert!(pool.is_started());
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_results_match_requests() {
        let pool = WorkerPool::<TestJob>::new(4);
        let futures: Vec<_> = (0..64).map(|n| pool.submit(TestJob::Double(n))).collect();
        let results = futures::future::join_all(futures).await;
        for (n, r) in results.into_iter().enumerate() {
            assert_eq!(r.unwrap(), n as u64 * 2);
        }
        assert_eq!(pool.pending_jobs(), 0);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_job_error_passes_through() {
        let pool = WorkerPool::<TestJob>::new(1);
        assert!(matches!(
            pool.submit(TestJob::Fail).await,
            Err(SealdropError::ChunkIntegrity { index: 7 })
        ));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let pool = WorkerPool::<TestJob>::new(2);
        let bad = pool.submit(TestJob::Panic);
        let good = pool.submit(TestJob::Double(5));

        match bad.await {
            Err(SealdropError::Worker { reason, .. }) => assert_eq!(reason, "boom"),
            other => panic!("expected worker error, got {other:?}"),
        }
        assert_eq!(good.await.unwrap(), 10);
        // pool keeps serving after a panic
        assert_eq!(pool.submit(TestJob::Double(1)).await.unwrap(), 2);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_rejects_outstanding() {
        let pool = WorkerPool::<TestJob>::new(1);
        let (tx, rx) = mpsc::channel();
        let gate = Arc::new(Mutex::new(rx));

        // occupies the only worker, so the rest stay queued
        let running = pool.submit(TestJob::Gate(Arc::clone(&gate)));
        let queued: Vec<_> = (0..3).map(|n| pool.submit(TestJob::Double(n))).collect();

        pool.shutdown();
        drop(tx);

        assert!(matches!(running.await, Err(SealdropError::PoolTerminated)));
        for f in queued {
            assert!(matches!(f.await, Err(SealdropError::PoolTerminated)));
        }
        assert_eq!(pool.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::<TestJob>::new(1);
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_terminated());
        assert!(matches!(
            pool.submit(TestJob::Double(1)).await,
            Err(SealdropError::PoolTerminated)
        ));
    }

    #[tokio::test]
    async fn test_clones_share_lifecycle() {
        let pool = WorkerPool::<TestJob>::new(1);
        let handle = pool.clone();
        assert_eq!(handle.submit(TestJob::Double(3)).await.unwrap(), 6);
        pool.shutdown();
        assert!(handle.is_terminated());
    }
}
