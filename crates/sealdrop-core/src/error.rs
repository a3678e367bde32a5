use thiserror::Error;

pub type SealdropResult<T> = Result<T, SealdropError>;

#[derive(Debug, Error)]
pub enum SealdropError {
    /// Tag verification failed: wrong key or corrupted data. Never retried.
    #[error("decryption failed for chunk {index}: wrong key or corrupted data")]
    ChunkIntegrity { index: u32 },

    /// A network or storage call failed; the caller may retry the operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// Deployment or setup defect (missing chunk layout, missing ETag header, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The job was queued or running when its worker pool shut down.
    #[error("worker pool terminated")]
    PoolTerminated,

    /// Aborting a multipart session failed; stale-session cleanup reclaims it.
    #[error("multipart session abort failed: {0}")]
    SessionAbort(String),

    /// A single job failed inside a worker; the rest of the pool is unaffected.
    #[error("worker {worker} failed: {reason}")]
    Worker { worker: usize, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("file too large: {size} bytes (maximum {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("invalid share link: {0}")]
    InvalidLink(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SealdropError {
    /// Only transport failures are worth retrying, and only by the caller at
    /// whole-operation granularity.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SealdropError::Transport(_))
    }

    /// Cancellations are reported to users differently from data errors.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SealdropError::PoolTerminated)
    }
}
