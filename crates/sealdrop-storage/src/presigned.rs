//! Presigned-URL backend.
//!
//! The share server holds the bucket credentials and hands out short-lived
//! presigned URLs; encrypted bytes go straight from this client to object
//! storage. Endpoints used:
//!
//! ```text
//! POST /api/r2/initiate       {fileId}                           -> {uploadId, objectKey}
//! POST /api/r2/presign-part   {objectKey, uploadId, partNumber}  -> {presignedUrl}
//! POST /api/r2/complete       {objectKey, uploadId, parts}
//! POST /api/r2/abort          {objectKey, uploadId}
//! POST /api/r2/simple-upload  {fileId}                           -> {presignedUrl, objectKey}
//! GET  /api/r2/download/<objectKey>                              -> {presignedUrl}
//! ```

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG, RANGE};
use reqwest::StatusCode;
use sealdrop_core::config::StorageConfig;
use sealdrop_core::types::{CompletedPart, UploadSession};
use sealdrop_core::{SealdropError, SealdropResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::MultipartBackend;
use crate::http::{ensure_success, host_of, transport, ApiClient};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileIdBody<'a> {
    file_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody<'a> {
    object_key: &'a str,
    upload_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignPartBody<'a> {
    object_key: &'a str,
    upload_id: &'a str,
    part_number: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody<'a> {
    object_key: &'a str,
    upload_id: &'a str,
    parts: &'a [CompletedPart],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateReply {
    upload_id: String,
    object_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignedReply {
    presigned_url: String,
    #[serde(default)]
    object_key: Option<String>,
}

pub struct PresignedBackend {
    api: ApiClient,
}

impl PresignedBackend {
    pub fn new(api_base: &str, timeout: Duration) -> SealdropResult<Self> {
        Ok(Self {
            api: ApiClient::new(api_base, timeout)?,
        })
    }

    pub fn from_config(storage: &StorageConfig) -> SealdropResult<Self> {
        Self::new(&storage.api_base, Duration::from_secs(storage.request_timeout_secs))
    }

    async fn put_presigned(&self, url: &str, body: Vec<u8>, what: &str) -> SealdropResult<reqwest::Response> {
        debug!(host = %host_of(url), bytes = body.len(), "PUT presigned");
        let resp = self
            .api
            .http()
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| transport(what, e))?;
        ensure_success(resp, what).await
    }
}

/// `Range` header value for a half-open byte range (HTTP ranges are inclusive).
pub(crate) fn range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

#[async_trait]
impl MultipartBackend for PresignedBackend {
    async fn initiate(&self, file_id: &str) -> SealdropResult<UploadSession> {
        let reply: InitiateReply = self
            .api
            .post_json("/api/r2/initiate", &FileIdBody { file_id }, "initiate multipart upload")
            .await?;
        Ok(UploadSession::new(reply.object_key, reply.upload_id))
    }

    async fn upload_part(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> SealdropResult<CompletedPart> {
        let what = format!("upload part {part_number}");
        let presigned: PresignedReply = self
            .api
            .post_json(
                "/api/r2/presign-part",
                &PresignPartBody {
                    object_key,
                    upload_id,
                    part_number,
                },
                &format!("presign part {part_number}"),
            )
            .await?;

        let resp = self.put_presigned(&presigned.presigned_url, body, &what).await?;
        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SealdropError::Configuration(format!(
                    "{what}: storage response has no readable ETag header \
                     (bucket CORS must expose ETag)"
                ))
            })?;

        Ok(CompletedPart {
            part_number,
            etag: etag.to_string(),
        })
    }

    async fn complete(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> SealdropResult<()> {
        self.api
            .post_unit(
                "/api/r2/complete",
                &CompleteBody {
                    object_key,
                    upload_id,
                    parts,
                },
                "complete multipart upload",
            )
            .await
    }

    async fn abort(&self, object_key: &str, upload_id: &str) -> SealdropResult<()> {
        self.api
            .post_unit(
                "/api/r2/abort",
                &SessionBody {
                    object_key,
                    upload_id,
                },
                "abort multipart upload",
            )
            .await
    }

    async fn put_small(&self, file_id: &str, body: Vec<u8>) -> SealdropResult<String> {
        let presigned: PresignedReply = self
            .api
            .post_json("/api/r2/simple-upload", &FileIdBody { file_id }, "presign simple upload")
            .await?;
        let object_key = presigned.object_key.ok_or_else(|| {
            SealdropError::Configuration("simple-upload reply is missing objectKey".into())
        })?;
        self.put_presigned(&presigned.presigned_url, body, "simple upload")
            .await?;
        Ok(object_key)
    }

    async fn read_range(&self, object_key: &str, range: Option<Range<u64>>) -> SealdropResult<Vec<u8>> {
        let presigned: PresignedReply = self
            .api
            .get_json(&format!("/api/r2/download/{object_key}"), "presign download")
            .await?;

        let mut req = self.api.http().get(&presigned.presigned_url);
        if let Some(r) = &range {
            req = req.header(RANGE, range_header(r));
        }
        let resp = req.send().await.map_err(|e| transport("ranged read", e))?;
        let status = resp.status();
        let resp = ensure_success(resp, "ranged read").await?;
        let bytes = resp.bytes().await.map_err(|e| transport("ranged read", e))?;

        match range {
            // Origin ignored the Range header and sent the whole object
            Some(r) if status == StatusCode::OK => {
                warn!(object_key, "storage ignored Range header; slicing full object");
                let start = r.start as usize;
                let end = (r.end as usize).min(bytes.len());
                if start > end {
                    return Err(SealdropError::Transport(format!(
                        "ranged read: object is {} bytes, range starts at {start}",
                        bytes.len()
                    )));
                }
                Ok(bytes[start..end].to_vec())
            }
            _ => Ok(bytes.to_vec()),
        }
    }
}
