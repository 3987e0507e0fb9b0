//! Media Inventory Model and Source Contracts
//!
//! Both remote systems are reduced to the same shape: an [`Inventory`] of
//! [`MediaRecord`]s. The connectors in `provider-onedrive` and
//! `provider-immich` do the normalization; the reconciliation engine only ever
//! sees these types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{BridgeError, Result};

/// Byte stream returned by a download
pub type ByteStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Which system an inventory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryOrigin {
    OneDrive,
    Immich,
}

impl fmt::Display for InventoryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryOrigin::OneDrive => write!(f, "OneDrive"),
            InventoryOrigin::Immich => write!(f, "Immich"),
        }
    }
}

/// Opaque handle only the originating fetcher knows how to resolve
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadRef(String);

impl DownloadRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DownloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a SHA-1 hex digest to lowercase.
///
/// Returns `None` unless the input is exactly 40 hex digits.
pub fn normalize_sha1_hex(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() == 40 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(trimmed.to_ascii_lowercase())
    } else {
        None
    }
}

/// One photo or video known to a source system
///
/// Fields are private; a record is assembled with the `with_*` constructors
/// and never mutated afterwards.
///
/// ```
/// use bridge_traits::media::MediaRecord;
///
/// let record = MediaRecord::new("01ABC", "IMG_0001.jpg").with_size(2048);
/// assert_eq!(record.size_bytes(), Some(2048));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    source_id: String,
    filename: String,
    #[serde(default)]
    size_bytes: Option<u64>,
    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
    /// Lowercase hex SHA-1
    #[serde(default)]
    content_hash: Option<String>,
    #[serde(default)]
    download_ref: Option<DownloadRef>,
}

impl MediaRecord {
    pub fn new(source_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            filename: filename.into(),
            size_bytes: None,
            captured_at: None,
            content_hash: None,
            download_ref: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Attach a SHA-1 content hash. Values that are not a valid hex digest
    /// are dropped rather than stored, so a malformed hash can never produce
    /// a false match.
    pub fn with_content_hash(mut self, sha1_hex: impl AsRef<str>) -> Self {
        self.content_hash = normalize_sha1_hex(sha1_hex.as_ref());
        self
    }

    pub fn with_download_ref(mut self, download_ref: DownloadRef) -> Self {
        self.download_ref = Some(download_ref);
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn download_ref(&self) -> Option<&DownloadRef> {
        self.download_ref.as_ref()
    }
}

#[derive(Deserialize)]
struct InventoryRepr {
    origin: InventoryOrigin,
    fetched_at: DateTime<Utc>,
    records: Vec<MediaRecord>,
}

/// Ordered listing of media records from one system
///
/// `source_id` is unique within an inventory; both [`Inventory::new`] and
/// deserialization reject duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "InventoryRepr")]
pub struct Inventory {
    origin: InventoryOrigin,
    fetched_at: DateTime<Utc>,
    records: Vec<MediaRecord>,
}

impl TryFrom<InventoryRepr> for Inventory {
    type Error = BridgeError;

    fn try_from(repr: InventoryRepr) -> Result<Self> {
        Inventory::new(repr.origin, repr.fetched_at, repr.records)
    }
}

impl Inventory {
    pub fn new(
        origin: InventoryOrigin,
        fetched_at: DateTime<Utc>,
        records: Vec<MediaRecord>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.source_id()) {
                return Err(BridgeError::InvalidInventory(format!(
                    "duplicate source id {} in {} inventory",
                    record.source_id(),
                    origin
                )));
            }
        }

        Ok(Self {
            origin,
            fetched_at,
            records,
        })
    }

    pub fn origin(&self) -> InventoryOrigin {
        self.origin
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn records(&self) -> &[MediaRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// OneDrive camera-roll fetcher
#[async_trait]
pub trait OneDriveSource: Send + Sync {
    /// List every file (folders excluded) in the camera roll
    async fn list_camera_roll(&self) -> Result<Inventory>;

    /// Open a byte stream for a record's content
    async fn download(&self, download_ref: &DownloadRef) -> Result<ByteStream>;
}

/// Immich library fetcher
#[async_trait]
pub trait ImmichSource: Send + Sync {
    /// List every asset in the library
    async fn list_library(&self) -> Result<Inventory>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fetched() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_content_hash_is_normalized() {
        let record = MediaRecord::new("1", "a.jpg")
            .with_content_hash("A94A8FE5CCB19BA61C4C0873D391E987982FBBD3");
        assert_eq!(
            record.content_hash(),
            Some("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3")
        );
    }

    #[test]
    fn test_malformed_content_hash_is_dropped() {
        let record = MediaRecord::new("1", "a.jpg").with_content_hash("not-a-hash");
        assert_eq!(record.content_hash(), None);
    }

    #[test]
    fn test_inventory_rejects_duplicate_ids() {
        let records = vec![
            MediaRecord::new("1", "a.jpg"),
            MediaRecord::new("1", "b.jpg"),
        ];
        let result = Inventory::new(InventoryOrigin::OneDrive, fetched(), records);
        assert!(matches!(result, Err(BridgeError::InvalidInventory(_))));
    }

    #[test]
    fn test_inventory_deserialize_ignores_unknown_fields() {
        let json = r#"{
            "origin": "one_drive",
            "fetched_at": "2024-01-01T00:00:00Z",
            "records": [
                {"source_id": "1", "filename": "a.jpg", "size_bytes": 10, "future_field": true}
            ],
            "another_future_field": 3
        }"#;

        let inventory: Inventory = serde_json::from_str(json).unwrap();
        assert_eq!(inventory.origin(), InventoryOrigin::OneDrive);
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.records()[0].size_bytes(), Some(10));
        assert_eq!(inventory.records()[0].content_hash(), None);
    }

    #[test]
    fn test_inventory_deserialize_rejects_duplicates() {
        let json = r#"{
            "origin": "immich",
            "fetched_at": "2024-01-01T00:00:00Z",
            "records": [
                {"source_id": "x", "filename": "a.jpg"},
                {"source_id": "x", "filename": "b.jpg"}
            ]
        }"#;

        assert!(serde_json::from_str::<Inventory>(json).is_err());
    }
}
