//! Data model shared by the pipelines, storage adapters and the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SealdropError, SealdropResult};

pub const MIB: u64 = 1024 * 1024;

/// Largest file accepted for sharing (5 GiB).
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * MIB;

/// Single-chunk files below this size skip the multipart session.
pub const SMALL_OBJECT_THRESHOLD: u64 = 5 * MIB;

/// How long a share link stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expiry {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl Expiry {
    pub const ALL: [Expiry; 3] = [Expiry::OneHour, Expiry::OneDay, Expiry::SevenDays];

    pub fn as_secs(self) -> u64 {
        match self {
            Expiry::OneHour => 60 * 60,
            Expiry::OneDay => 24 * 60 * 60,
            Expiry::SevenDays => 7 * 24 * 60 * 60,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Expiry::OneHour => "1h",
            Expiry::OneDay => "24h",
            Expiry::SevenDays => "7d",
        }
    }

    /// Unix timestamp at which a share created at `now` stops resolving.
    pub fn expires_at(self, now: u64) -> u64 {
        now.saturating_add(self.as_secs())
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Expiry {
    type Err = SealdropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expiry::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| {
                SealdropError::Configuration(format!("unknown expiry '{s}' (expected 1h, 24h or 7d)"))
            })
    }
}

/// Persisted description of one shared file.
///
/// `chunk_sizes` holds the stored (ciphertext + tag) length of every chunk and
/// is present exactly when the object was uploaded in more than one chunk.
/// Key material never appears here, with the exception of the wrapped server
/// half in hybrid mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileManifest {
    pub file_id: String,
    pub original_name: String,
    pub original_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub chunk_count: u32,
    #[serde(default)]
    pub chunk_sizes: Option<Vec<u64>>,
    pub object_key: String,
    /// Unix seconds
    pub expires_at: u64,
    /// Hex `iv ‖ tag ‖ ciphertext` of the server key half (hybrid mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_server_key: Option<String>,
    #[serde(default)]
    pub download_count: u64,
}

impl FileManifest {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn is_hybrid(&self) -> bool {
        self.wrapped_server_key.is_some()
    }

    /// Total bytes held in object storage for this file.
    pub fn stored_size(&self) -> Option<u64> {
        self.chunk_sizes.as_ref().map(|sizes| sizes.iter().sum())
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("parsing file manifest: {e}"))
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| anyhow::anyhow!("serializing file manifest: {e}"))
    }
}

/// One uploaded part of a multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// 1-based; equals chunk index + 1
    pub part_number: u32,
    /// Integrity tag returned by the storage backend (ETag)
    pub etag: String,
}

/// Stored footprint of one encrypted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    pub index: u32,
    /// Ciphertext length plus the 16-byte tag
    pub stored_len: u64,
}

/// An open multipart upload.
///
/// Parts may be recorded in any order; `into_sorted_parts` consumes the
/// session and yields them ascending by part number for the completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub object_key: String,
    pub upload_id: String,
    parts: Vec<CompletedPart>,
}

impl UploadSession {
    pub fn new(object_key: impl Into<String>, upload_id: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            upload_id: upload_id.into(),
            parts: Vec::new(),
        }
    }

    pub fn record(&mut self, part: CompletedPart) {
        self.parts.push(part);
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn into_sorted_parts(mut self) -> Vec<CompletedPart> {
        self.parts.sort_by_key(|p| p.part_number);
        self.parts
    }
}

/// Reject files the service refuses to store.
pub fn check_file_size(size: u64) -> SealdropResult<()> {
    if size > MAX_FILE_SIZE {
        return Err(SealdropError::FileTooLarge {
            size,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> FileManifest {
        FileManifest {
            file_id: "6f1c".into(),
            original_name: "movie.mkv".into(),
            original_size: 120 * MIB,
            content_type: Some("video/x-matroska".into()),
            chunk_count: 3,
            chunk_sizes: Some(vec![50 * MIB + 16, 50 * MIB + 16, 20 * MIB + 16]),
            object_key: "uploads/6f1c".into(),
            expires_at: 1_000,
            wrapped_server_key: None,
            download_count: 0,
        }
    }

    #[test]
    fn test_expiry_parse_and_display() {
        for e in Expiry::ALL {
            assert_eq!(e.as_str().parse::<Expiry>().unwrap(), e);
        }
        assert!("30m".parse::<Expiry>().is_err());
        assert_eq!(Expiry::OneHour.expires_at(100), 3_700);
        assert_eq!(Expiry::SevenDays.as_secs(), 604_800);
    }

    #[test]
    fn test_manifest_json_roundtrip() {
        let m = manifest();
        let bytes = m.to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"chunkSizes\""));
        assert!(!text.contains("wrappedServerKey"));
        assert_eq!(FileManifest::from_bytes(&bytes).unwrap(), m);
    }

    #[test]
    fn test_manifest_single_chunk_has_null_sizes() {
        let json = br#"{"fileId":"a","originalName":"n.txt","originalSize":2048,
            "chunkCount":1,"chunkSizes":null,"objectKey":"uploads/a","expiresAt":5}"#;
        let m = FileManifest::from_bytes(json).unwrap();
        assert_eq!(m.chunk_sizes, None);
        assert_eq!(m.download_count, 0);
        assert!(!m.is_hybrid());
    }

    #[test]
    fn test_manifest_expiry_boundary() {
        let m = manifest();
        assert!(!m.is_expired(999));
        assert!(m.is_expired(1_000));
        assert_eq!(m.stored_size(), Some(120 * MIB + 48));
    }

    #[test]
    fn test_session_sorts_parts() {
        let mut s = UploadSession::new("uploads/x", "up-1");
        for n in [3, 1, 2] {
            s.record(CompletedPart {
                part_number: n,
                etag: format!("\"e{n}\""),
            });
        }
        assert_eq!(s.part_count(), 3);
        let numbers: Vec<u32> = s.into_sorted_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_file_size_limit() {
        assert!(check_file_size(MAX_FILE_SIZE).is_ok());
        match check_file_size(MAX_FILE_SIZE + 1) {
            Err(SealdropError::FileTooLarge { size, max }) => {
                assert_eq!(size, MAX_FILE_SIZE + 1);
                assert_eq!(max, MAX_FILE_SIZE);
            }
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }
}
