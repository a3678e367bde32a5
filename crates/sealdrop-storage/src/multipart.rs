//! Multipart sessions on top of a plain OpenDAL operator.
//!
//! OpenDAL exposes whole-object writes, not the S3 multipart protocol, so
//! sessions are staged as ordinary objects:
//!
//! ```text
//! .multipart/{upload_id}/session.json   {objectKey, createdAt}
//! .multipart/{upload_id}/part-00001     ciphertext || tag of chunk 0
//! .multipart/{upload_id}/part-00002     ...
//! ```
//!
//! `complete` checks every part against its ETag (SHA-256 of the part body),
//! writes the parts in order to the final key and deletes the staging
//! prefix. Sessions whose marker is older than the stale threshold are
//! reclaimed by [`OperatorBackend::sweep_stale_sessions`].

use std::ops::Range;

use async_trait::async_trait;
use opendal::{Buffer, ErrorKind, Operator};
use sealdrop_core::types::{unix_now, CompletedPart, UploadSession};
use sealdrop_core::{SealdropError, SealdropResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::backend::{object_key_for, MultipartBackend};

const STAGING_PREFIX: &str = ".multipart/";
const SESSION_MARKER: &str = "session.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMarker {
    object_key: String,
    created_at: u64,
}

/// Outcome of a stale-session sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub aborted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct OperatorBackend {
    op: Operator,
}

impl OperatorBackend {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn session_dir(upload_id: &str) -> String {
        format!("{STAGING_PREFIX}{upload_id}/")
    }

    fn part_key(upload_id: &str, part_number: u32) -> String {
        format!("{STAGING_PREFIX}{upload_id}/part-{part_number:05}")
    }

    fn marker_key(upload_id: &str) -> String {
        format!("{STAGING_PREFIX}{upload_id}/{SESSION_MARKER}")
    }

    async fn read_marker(&self, upload_id: &str) -> SealdropResult<SessionMarker> {
        let data = self
            .op
            .read(&Self::marker_key(upload_id))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SealdropError::NotFound(format!("multipart session {upload_id}")),
                _ => storage_err("reading session marker", e),
            })?;
        serde_json::from_slice(&data.to_vec())
            .map_err(|e| SealdropError::Transport(format!("corrupt session marker for {upload_id}: {e}")))
    }

    async fn assemble(&self, object_key: &str, upload_id: &str, parts: &[CompletedPart]) -> SealdropResult<u64> {
        let can_stream = self.op.info().full_capability().write_can_multi;
        let mut total = 0u64;

        if can_stream {
            let mut writer = self
                .op
                .writer(object_key)
                .await
                .map_err(|e| storage_err("opening object writer", e))?;
            for part in parts {
                let data = self.verified_part(upload_id, part).await?;
                total += data.len() as u64;
                if let Err(e) = writer.write(data).await {
                    let _ = writer.abort().await;
                    return Err(storage_err("writing object", e));
                }
            }
            writer
                .close()
                .await
                .map_err(|e| storage_err("closing object writer", e))?;
        } else {
            // Backends without multi-write get one non-contiguous buffer; parts are not copied
            let mut chunks = Vec::with_capacity(parts.len());
            for part in parts {
                let data = self.verified_part(upload_id, part).await?;
                total += data.len() as u64;
                chunks.extend(data);
            }
            self.op
                .write(object_key, Buffer::from(chunks))
                .await
                .map_err(|e| storage_err("writing object", e))?;
        }
        Ok(total)
    }

    async fn verified_part(&self, upload_id: &str, part: &CompletedPart) -> SealdropResult<Buffer> {
        let data = self
            .op
            .read(&Self::part_key(upload_id, part.part_number))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SealdropError::Configuration(format!(
                    "part {} of session {upload_id} was never uploaded",
                    part.part_number
                )),
                _ => storage_err("reading staged part", e),
            })?;
        let actual = etag_of_buffer(&data);
        if actual != part.etag {
            return Err(SealdropError::Configuration(format!(
                "part {} ETag mismatch (listed {}, stored {actual})",
                part.part_number, part.etag
            )));
        }
        Ok(data)
    }

    async fn delete_session(&self, upload_id: &str) -> SealdropResult<()> {
        let entries = match self
            .op
            .list_with(&Self::session_dir(upload_id))
            .recursive(true)
            .await
        {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(storage_err("listing session", e)),
        };
        for entry in entries {
            if entry.metadata().is_file() {
                self.op
                    .delete(entry.path())
                    .await
                    .map_err(|e| storage_err("deleting staged object", e))?;
            }
        }
        Ok(())
    }

    /// Upload ids of every staged session.
    pub async fn list_sessions(&self) -> SealdropResult<Vec<String>> {
        let entries = match self.op.list(STAGING_PREFIX).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err("listing sessions", e)),
        };
        Ok(entries
            .into_iter()
            .filter(|e| e.metadata().is_dir() && e.path() != STAGING_PREFIX)
            .map(|e| e.name().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Abort every session created at least `max_age_secs` before `now`.
    ///
    /// Sessions whose marker is missing or unreadable are treated as stale.
    pub async fn sweep_stale_sessions(&self, now: u64, max_age_secs: u64) -> SealdropResult<SweepReport> {
        let mut report = SweepReport::default();
        for upload_id in self.list_sessions().await? {
            report.examined += 1;
            let stale = match self.read_marker(&upload_id).await {
                Ok(marker) => now.saturating_sub(marker.created_at) >= max_age_secs,
                Err(e) => {
                    debug!(upload_id = %upload_id, error = %e, "session marker unreadable");
                    true
                }
            };
            if !stale {
                continue;
            }
            match self.delete_session(&upload_id).await {
                Ok(()) => {
                    info!(upload_id = %upload_id, "aborted stale multipart session");
                    report.aborted += 1;
                }
                Err(e) => {
                    warn!(upload_id = %upload_id, error = %e, "failed to abort stale session");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Delete a completed object.
    pub async fn delete_object(&self, object_key: &str) -> SealdropResult<()> {
        self.op
            .delete(object_key)
            .await
            .map_err(|e| storage_err("deleting object", e))
    }
}

/// ETag for a part body: hex SHA-256.
pub fn etag_of(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn etag_of_buffer(data: &Buffer) -> String {
    let mut hasher = Sha256::new();
    for chunk in data.clone() {
        hasher.update(&chunk);
    }
    hex::encode(hasher.finalize())
}

fn storage_err(what: &str, e: opendal::Error) -> SealdropError {
    match e.kind() {
        ErrorKind::NotFound => SealdropError::NotFound(format!("{what}: {e}")),
        _ => SealdropError::Transport(format!("{what}: {e}")),
    }
}

#[async_trait]
impl MultipartBackend for OperatorBackend {
    async fn initiate(&self, file_id: &str) -> SealdropResult<UploadSession> {
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        let object_key = object_key_for(file_id);
        let marker = SessionMarker {
            object_key: object_key.clone(),
            created_at: unix_now(),
        };
        let bytes = serde_json::to_vec(&marker)
            .map_err(|e| SealdropError::Other(anyhow::anyhow!("serializing session marker: {e}")))?;
        self.op
            .write(&Self::marker_key(&upload_id), bytes)
            .await
            .map_err(|e| storage_err("writing session marker", e))?;

        debug!(upload_id = %upload_id, object_key = %object_key, "initiated multipart session");
        Ok(UploadSession::new(object_key, upload_id))
    }

    async fn upload_part(
        &self,
        _object_key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> SealdropResult<CompletedPart> {
        if part_number == 0 {
            return Err(SealdropError::Configuration("part numbers start at 1".into()));
        }
        // uploading into an aborted or unknown session is an error, as on S3
        self.read_marker(upload_id).await?;

        let etag = etag_of(&body);
        let len = body.len();
        self.op
            .write(&Self::part_key(upload_id, part_number), body)
            .await
            .map_err(|e| storage_err("writing part", e))?;

        debug!(upload_id = %upload_id, part = part_number, bytes = len, "staged part");
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> SealdropResult<()> {
        let marker = self.read_marker(upload_id).await?;
        if marker.object_key != object_key {
            return Err(SealdropError::Configuration(format!(
                "session {upload_id} belongs to {}, not {object_key}",
                marker.object_key
            )));
        }
        if parts.is_empty() {
            return Err(SealdropError::Configuration("cannot complete a session with no parts".into()));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(SealdropError::Configuration(
                "parts must be sorted by part number without duplicates".into(),
            ));
        }

        let total = self.assemble(object_key, upload_id, parts).await?;
        self.delete_session(upload_id).await?;

        info!(object_key = %object_key, parts = parts.len(), bytes = total, "completed multipart upload");
        Ok(())
    }

    async fn abort(&self, object_key: &str, upload_id: &str) -> SealdropResult<()> {
        self.delete_session(upload_id)
            .await
            .map_err(|e| SealdropError::SessionAbort(format!("{object_key} ({upload_id}): {e}")))?;
        debug!(upload_id = %upload_id, "aborted multipart session");
        Ok(())
    }

    async fn put_small(&self, file_id: &str, body: Vec<u8>) -> SealdropResult<String> {
        let object_key = object_key_for(file_id);
        self.op
            .write(&object_key, body)
            .await
            .map_err(|e| storage_err("writing small object", e))?;
        Ok(object_key)
    }

    async fn read_range(&self, object_key: &str, range: Option<Range<u64>>) -> SealdropResult<Vec<u8>> {
        let data = match range {
            Some(r) => self.op.read_with(object_key).range(r).await,
            None => self.op.read(object_key).await,
        }
        .map_err(|e| storage_err("reading object", e))?;
        Ok(data.to_vec())
    }
}
