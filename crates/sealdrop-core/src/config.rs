use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::Expiry;

/// Top-level client configuration (loaded from sealdrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealdropConfig {
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub share: ShareConfig,
    pub hybrid: HybridConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cipher worker threads (default: 4)
    pub workers: usize,
    /// Concurrent part uploads (default: 3)
    pub upload_concurrency: usize,
    /// Concurrent ranged reads during download (default: 3)
    pub download_concurrency: usize,
    /// Fixed chunk size in bytes, bypassing the size policy. Tuning and tests only.
    pub chunk_size_override: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            upload_concurrency: 3,
            download_concurrency: 3,
            chunk_size_override: None,
        }
    }
}

/// Which transport carries encrypted bytes to object storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Server API issues presigned URLs; the client never holds bucket credentials.
    Presigned,
    S3,
    Fs,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Base URL of the share server API (presigned backend and HTTP metadata store)
    pub api_base: String,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// Enforce HTTPS for remote endpoints (warn/error on plain HTTP)
    pub enforce_tls: bool,
    pub request_timeout_secs: u64,
    /// Multipart sessions older than this are swept (default: 1 hour)
    pub stale_session_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Presigned,
            api_base: "http://localhost:3000".into(),
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "sealdrop".into(),
            root: PathBuf::from("~/.local/share/sealdrop/objects"),
            enforce_tls: false,
            request_timeout_secs: 60,
            stale_session_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Origin used when building share links
    pub origin: String,
    pub default_expiry: Expiry,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".into(),
            default_expiry: Expiry::OneDay,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub enabled: bool,
    /// Environment variable holding the application master secret
    pub master_key_env: String,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            master_key_env: "SEALDROP_MASTER_KEY".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
