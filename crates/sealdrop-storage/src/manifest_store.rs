//! File manifest persistence.
//!
//! Two stores: JSON documents in an OpenDAL operator under
//! `manifests/{file_id}.json`, or the share server's metadata API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use opendal::{ErrorKind, Operator};
use sealdrop_core::config::StorageConfig;
use sealdrop_core::types::FileManifest;
use sealdrop_core::{SealdropError, SealdropResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::http::ApiClient;

#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn save_manifest(&self, manifest: &FileManifest) -> SealdropResult<()>;

    /// Fetch a manifest. Missing manifests are `SealdropError::NotFound`.
    async fn get_manifest(&self, file_id: &str) -> SealdropResult<FileManifest>;

    /// Count one completed download.
    async fn record_download(&self, file_id: &str) -> SealdropResult<()>;
}

/// Fetch a manifest that is still valid at `now`.
///
/// An expired manifest is indistinguishable from a missing one.
pub async fn fetch_manifest(
    store: &dyn ManifestStore,
    file_id: &str,
    now: u64,
) -> SealdropResult<FileManifest> {
    let manifest = store.get_manifest(file_id).await?;
    if manifest.is_expired(now) {
        debug!(file_id, expires_at = manifest.expires_at, "manifest expired");
        return Err(SealdropError::NotFound(format!("file {file_id}")));
    }
    Ok(manifest)
}

pub struct OperatorManifestStore {
    op: Operator,
}

impl OperatorManifestStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    fn key(file_id: &str) -> String {
        format!("manifests/{file_id}.json")
    }

    /// Delete every manifest expired at `now`, returning the removed
    /// manifests so their objects can be deleted too.
    pub async fn purge_expired(&self, now: u64) -> SealdropResult<Vec<FileManifest>> {
        let entries = match self.op.list("manifests/").await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SealdropError::Transport(format!("listing manifests: {e}"))),
        };

        let mut purged = Vec::new();
        for entry in entries.into_iter().filter(|e| e.metadata().is_file()) {
            let data = match self.op.read(entry.path()).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %entry.path(), error = %e, "skipping unreadable manifest");
                    continue;
                }
            };
            let manifest = match FileManifest::from_bytes(&data.to_vec()) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %entry.path(), error = %e, "skipping corrupt manifest");
                    continue;
                }
            };
            if manifest.is_expired(now) {
                self.op
                    .delete(entry.path())
                    .await
                    .map_err(|e| SealdropError::Transport(format!("deleting manifest: {e}")))?;
                info!(file_id = %manifest.file_id, "purged expired manifest");
                purged.push(manifest);
            }
        }
        Ok(purged)
    }
}

#[async_trait]
impl ManifestStore for OperatorManifestStore {
    async fn save_manifest(&self, manifest: &FileManifest) -> SealdropResult<()> {
        let bytes = manifest.to_bytes()?;
        self.op
            .write(&Self::key(&manifest.file_id), bytes)
            .await
            .map_err(|e| SealdropError::Transport(format!("writing manifest: {e}")))?;
        Ok(())
    }

    async fn get_manifest(&self, file_id: &str) -> SealdropResult<FileManifest> {
        let data = self.op.read(&Self::key(file_id)).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SealdropError::NotFound(format!("file {file_id}")),
            _ => SealdropError::Transport(format!("reading manifest: {e}")),
        })?;
        Ok(FileManifest::from_bytes(&data.to_vec())?)
    }

    // Read-modify-write: concurrent downloads of one file may undercount.
    async fn record_download(&self, file_id: &str) -> SealdropResult<()> {
        let mut manifest = self.get_manifest(file_id).await?;
        manifest.download_count += 1;
        self.save_manifest(&manifest).await
    }
}

/// Manifest store backed by the share server's `/api/files` endpoints.
pub struct HttpManifestStore {
    api: ApiClient,
}

impl HttpManifestStore {
    pub fn new(api_base: &str, timeout: Duration) -> SealdropResult<Self> {
        Ok(Self {
            api: ApiClient::new(api_base, timeout)?,
        })
    }

    pub fn from_config(storage: &StorageConfig) -> SealdropResult<Self> {
        Self::new(&storage.api_base, Duration::from_secs(storage.request_timeout_secs))
    }
}

/// Body of `POST /api/files/metadata`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataUpload<'a> {
    file_id: &'a str,
    original_name: &'a str,
    file_type: Option<&'a str>,
    file_size: u64,
    storage_path: &'a str,
    storage_backend: &'static str,
    chunk_count: u32,
    chunk_sizes: Option<&'a [u64]>,
    expires_at: String,
    encryption_mode: &'static str,
    server_key: Option<&'a str>,
}

impl<'a> MetadataUpload<'a> {
    fn from_manifest(manifest: &'a FileManifest) -> SealdropResult<Self> {
        Ok(Self {
            file_id: &manifest.file_id,
            original_name: &manifest.original_name,
            file_type: manifest.content_type.as_deref(),
            file_size: manifest.original_size,
            storage_path: &manifest.object_key,
            storage_backend: "r2",
            chunk_count: manifest.chunk_count,
            chunk_sizes: manifest.chunk_sizes.as_deref(),
            expires_at: to_rfc3339(manifest.expires_at)?,
            encryption_mode: if manifest.wrapped_server_key.is_some() {
                "hybrid"
            } else {
                "zero-knowledge"
            },
            server_key: manifest.wrapped_server_key.as_deref(),
        })
    }
}

/// Row returned by `GET /api/files/{file_id}`.
#[derive(Debug, Deserialize)]
struct MetadataRow {
    file_id: String,
    original_name: String,
    #[serde(default)]
    file_type: Option<String>,
    file_size: u64,
    storage_path: String,
    #[serde(default)]
    chunk_count: Option<u32>,
    #[serde(default)]
    chunk_sizes: Option<Vec<u64>>,
    expires_at: String,
    #[serde(default)]
    download_count: Option<u64>,
    #[serde(default)]
    server_key: Option<String>,
}

impl TryFrom<MetadataRow> for FileManifest {
    type Error = SealdropError;

    fn try_from(row: MetadataRow) -> SealdropResult<Self> {
        Ok(FileManifest {
            expires_at: parse_rfc3339(&row.expires_at)?,
            file_id: row.file_id,
            original_name: row.original_name,
            original_size: row.file_size,
            content_type: row.file_type,
            // rows written before chunking existed carry no count
            chunk_count: row.chunk_count.unwrap_or(1),
            chunk_sizes: row.chunk_sizes,
            object_key: row.storage_path,
            wrapped_server_key: row.server_key,
            download_count: row.download_count.unwrap_or(0),
        })
    }
}

fn to_rfc3339(secs: u64) -> SealdropResult<String> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| SealdropError::Configuration(format!("expiry {secs} is out of range")))
}

fn parse_rfc3339(value: &str) -> SealdropResult<u64> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|e| SealdropError::Transport(format!("file metadata has bad expires_at {value:?}: {e}")))?;
    u64::try_from(parsed.timestamp())
        .map_err(|_| SealdropError::Transport(format!("file metadata expires_at {value:?} predates the epoch")))
}

#[async_trait]
impl ManifestStore for HttpManifestStore {
    async fn save_manifest(&self, manifest: &FileManifest) -> SealdropResult<()> {
        let body = MetadataUpload::from_manifest(manifest)?;
        self.api
            .post_unit("/api/files/metadata", &body, "save file metadata")
            .await
    }

    async fn get_manifest(&self, file_id: &str) -> SealdropResult<FileManifest> {
        let row: MetadataRow = self
            .api
            .get_json(&format!("/api/files/{file_id}"), "get file metadata")
            .await?;
        FileManifest::try_from(row)
    }

    async fn record_download(&self, file_id: &str) -> SealdropResult<()> {
        self.api
            .post_unit(
                &format!("/api/files/{file_id}/downloaded"),
                &serde_json::json!({}),
                "record download",
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::build_memory_operator;
    use crate::test_support::{canned_server, http_response, recording_server, request_parts};

    fn manifest(file_id: &str, expires_at: u64) -> FileManifest {
        FileManifest {
            file_id: file_id.into(),
            original_name: "report.pdf".into(),
            original_size: 2048,
            content_type: Some("application/pdf".into()),
            chunk_count: 1,
            chunk_sizes: None,
            object_key: format!("files/{file_id}.enc"),
            expires_at,
            wrapped_server_key: None,
            download_count: 0,
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = OperatorManifestStore::new(build_memory_operator().unwrap());
        let m = manifest("a", 100);
        store.save_manifest(&m).await.unwrap();
        assert_eq!(store.get_manifest("a").await.unwrap(), m);
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let store = OperatorManifestStore::new(build_memory_operator().unwrap());
        assert!(matches!(
            store.get_manifest("nope").await,
            Err(SealdropError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_treats_expired_as_not_found() {
        let store = OperatorManifestStore::new(build_memory_operator().unwrap());
        store.save_manifest(&manifest("a", 100)).await.unwrap();

        assert!(fetch_manifest(&store, "a", 99).await.is_ok());
        assert!(matches!(
            fetch_manifest(&store, "a", 100).await,
            Err(SealdropError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_download_increments() {
        let store = OperatorManifestStore::new(build_memory_operator().unwrap());
        store.save_manifest(&manifest("a", 100)).await.unwrap();
        store.record_download("a").await.unwrap();
        store.record_download("a").await.unwrap();
        assert_eq!(store.get_manifest("a").await.unwrap().download_count, 2);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = OperatorManifestStore::new(build_memory_operator().unwrap());
        store.save_manifest(&manifest("old", 10)).await.unwrap();
        store.save_manifest(&manifest("new", 1_000)).await.unwrap();

        let purged = store.purge_expired(500).await.unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].file_id, "old");
        assert!(store.get_manifest("old").await.is_err());
        assert!(store.get_manifest("new").await.is_ok());
    }

    // 2026-10-20T00:00:00Z
    const OCT_20_2026: u64 = 1_792_454_400;

    fn http_store(base: &str) -> HttpManifestStore {
        HttpManifestStore::new(base, Duration::from_secs(5)).unwrap()
    }

    fn json_ok(body: &str) -> String {
        http_response("200 OK", &[("Content-Type", "application/json")], body)
    }

    #[test]
    fn test_rfc3339_conversion() {
        assert_eq!(to_rfc3339(OCT_20_2026).unwrap(), "2026-10-20T00:00:00.000Z");
        assert_eq!(parse_rfc3339("2026-10-20T00:00:00.000Z").unwrap(), OCT_20_2026);
        assert_eq!(parse_rfc3339("2026-10-20T02:00:00+02:00").unwrap(), OCT_20_2026);
        assert!(matches!(parse_rfc3339("tomorrow"), Err(SealdropError::Transport(_))));
        assert!(parse_rfc3339("1969-12-31T23:59:59Z").is_err());
        assert!(matches!(to_rfc3339(u64::MAX), Err(SealdropError::Configuration(_))));
    }

    #[test]
    fn test_metadata_upload_encryption_mode() {
        let mut m = manifest("a", OCT_20_2026);
        assert_eq!(MetadataUpload::from_manifest(&m).unwrap().encryption_mode, "zero-knowledge");
        m.wrapped_server_key = Some("c2VydmVy".into());
        let body = MetadataUpload::from_manifest(&m).unwrap();
        assert_eq!(body.encryption_mode, "hybrid");
        assert_eq!(body.server_key, Some("c2VydmVy"));
    }

    #[tokio::test]
    async fn test_http_save_sends_metadata_body() {
        let (base, mut requests) = recording_server(vec![json_ok(r#"{"success":true}"#)]).await;
        let mut m = manifest("f1", OCT_20_2026);
        m.chunk_count = 2;
        m.chunk_sizes = Some(vec![1040, 1024]);
        http_store(&base).save_manifest(&m).await.unwrap();

        let request = requests.recv().await.unwrap();
        let (line, body) = request_parts(&request);
        assert!(line.starts_with("POST /api/files/metadata "), "{line}");
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["fileId"], "f1");
        assert_eq!(body["originalName"], "report.pdf");
        assert_eq!(body["fileType"], "application/pdf");
        assert_eq!(body["fileSize"], 2048);
        assert_eq!(body["storagePath"], "files/f1.enc");
        assert_eq!(body["storageBackend"], "r2");
        assert_eq!(body["chunkCount"], 2);
        assert_eq!(body["chunkSizes"], serde_json::json!([1040, 1024]));
        assert_eq!(body["expiresAt"], "2026-10-20T00:00:00.000Z");
        assert_eq!(body["encryptionMode"], "zero-knowledge");
        assert!(body.get("objectKey").is_none());
        assert!(body.get("originalSize").is_none());
    }

    #[tokio::test]
    async fn test_http_get_decodes_row() {
        let base = canned_server(vec![json_ok(
            r#"{"file_id":"f1","original_name":"report.pdf","file_type":"application/pdf",
                "file_size":2048,"storage_path":"files/f1.enc","storage_backend":"r2",
                "chunk_count":2,"chunk_sizes":[1040,1024],"expires_at":"2026-10-20T00:00:00Z",
                "download_count":3,"server_key":null,"encryption_mode":"zero-knowledge"}"#,
        )])
        .await;
        let got = http_store(&base).get_manifest("f1").await.unwrap();

        let mut want = manifest("f1", OCT_20_2026);
        want.chunk_count = 2;
        want.chunk_sizes = Some(vec![1040, 1024]);
        want.download_count = 3;
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn test_http_get_sparse_row_defaults() {
        let base = canned_server(vec![json_ok(
            r#"{"file_id":"f2","original_name":"a.txt","file_size":5,
                "storage_path":"files/f2.enc","expires_at":"2026-10-20T00:00:00.000Z"}"#,
        )])
        .await;
        let got = http_store(&base).get_manifest("f2").await.unwrap();
        assert_eq!(got.chunk_count, 1);
        assert_eq!(got.download_count, 0);
        assert_eq!(got.content_type, None);
        assert_eq!(got.chunk_sizes, None);
    }

    #[tokio::test]
    async fn test_http_get_missing_and_expired_are_not_found() {
        let base = canned_server(vec![
            http_response("404 Not Found", &[], r#"{"message":"File not found"}"#),
            http_response("410 Gone", &[], r#"{"message":"File has expired"}"#),
        ])
        .await;
        let store = http_store(&base);
        for _ in 0..2 {
            let result = store.get_manifest("f1").await;
            assert!(matches!(result, Err(SealdropError::NotFound(_))), "got {result:?}");
        }
    }

    #[tokio::test]
    async fn test_http_record_download_hits_endpoint() {
        let (base, mut requests) = recording_server(vec![json_ok(r#"{"success":true}"#)]).await;
        http_store(&base).record_download("f1").await.unwrap();

        let request = requests.recv().await.unwrap();
        let (line, _) = request_parts(&request);
        assert!(line.starts_with("POST /api/files/f1/downloaded "), "{line}");
    }
}
