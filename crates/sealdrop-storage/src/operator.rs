//! OpenDAL Operator factory for sealdrop storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use sealdrop_core::config::{BackendKind, StorageConfig};

/// S3 access credentials, loaded from the environment by the CLI.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an OpenDAL Operator for an S3-compatible endpoint (R2, MinIO, AWS).
///
/// Uses path-style addressing, the opendal 0.55 default.
pub fn build_operator(storage: &StorageConfig, creds: &S3Credentials) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(&creds.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Operator rooted at a local directory.
pub fn build_fs_operator(root: &str) -> Result<Operator> {
    let builder = opendal::services::Fs::default().root(root);
    Ok(Operator::new(builder)
        .context("creating OpenDAL fs operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish())
}

/// Process-local in-memory operator. Contents vanish with the process.
pub fn build_memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish())
}

/// Build the operator selected by `storage.backend`.
///
/// If `enforce_tls` is true and an S3 endpoint uses HTTP, this returns an
/// error. Otherwise, a warning is logged for non-HTTPS endpoints. The
/// presigned backend needs no operator and is rejected here.
pub fn build_from_config(storage: &StorageConfig, creds: Option<&S3Credentials>) -> Result<Operator> {
    match storage.backend {
        BackendKind::S3 => {
            check_endpoint_tls(&storage.endpoint, storage.enforce_tls)?;
            let creds = creds.context("S3 backend selected but no credentials were provided")?;
            build_operator(storage, creds)
        }
        BackendKind::Fs => {
            let root = storage.root.to_string_lossy();
            build_fs_operator(&root)
        }
        BackendKind::Memory => build_memory_operator(),
        BackendKind::Presigned => {
            anyhow::bail!("presigned backend talks to the share server API, not an operator")
        }
    }
}

/// Refuse or warn about plaintext endpoints.
pub fn check_endpoint_tls(endpoint: &str, enforce_tls: bool) -> Result<()> {
    if endpoint.starts_with("http://") {
        if enforce_tls {
            anyhow::bail!(
                "endpoint uses plaintext HTTP ({endpoint}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development."
            );
        }
        tracing::warn!(
            endpoint = %endpoint,
            "endpoint uses plaintext HTTP. Set storage.enforce_tls = true and use HTTPS in production."
        );
    }
    Ok(())
}
