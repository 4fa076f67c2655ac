//! Remote record payloads and write shapes.

use crate::error::PayloadError;
use crate::id::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reading-log entry as the remote service serves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Record identity.
    pub id: RecordId,
    /// Server-assigned optimistic-lock version.
    pub version: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Book title.
    pub title: String,
    /// Author name.
    #[serde(default)]
    pub author: Option<String>,
    /// ISBN or other identifier.
    #[serde(default)]
    pub isbn: Option<String>,
    /// Rating on a 0-10 scale.
    #[serde(default)]
    pub rating: Option<u8>,
    /// Free-text review.
    #[serde(default)]
    pub review: Option<String>,
    /// Date reading started.
    #[serde(default)]
    pub started_on: Option<NaiveDate>,
    /// Date reading finished.
    #[serde(default)]
    pub finished_on: Option<NaiveDate>,
    /// Reference to the cover asset.
    #[serde(default)]
    pub cover_asset_id: Option<RecordId>,
    /// Content locale.
    #[serde(default)]
    pub locale: Option<String>,
}

/// A cover asset as the remote service serves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAsset {
    /// Record identity.
    pub id: RecordId,
    /// Server-assigned optimistic-lock version.
    pub version: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Durable content URL, present once remote processing finished.
    #[serde(default)]
    pub url: Option<String>,
    /// Original file name.
    pub file_name: String,
    /// MIME content type.
    pub content_type: String,
    /// Size of the binary in bytes.
    #[serde(default)]
    pub size_bytes: u64,
    /// Pixel width, resolved by remote processing.
    #[serde(default)]
    pub width: Option<u32>,
    /// Pixel height, resolved by remote processing.
    #[serde(default)]
    pub height: Option<u32>,
}

/// Any record the delta feed can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteRecord {
    /// A reading-log entry.
    Entry(RemoteEntry),
    /// A cover asset.
    Asset(RemoteAsset),
}

impl RemoteRecord {
    /// Decodes one raw feed item.
    ///
    /// Decoding is per item so a single malformed payload can be skipped
    /// without discarding the rest of the batch.
    pub fn decode(value: &Value) -> Result<Self, PayloadError> {
        let kind = value.get("kind").and_then(Value::as_str);
        match kind {
            Some("entry") | Some("asset") => serde_json::from_value(value.clone())
                .map_err(|e| PayloadError::malformed(e.to_string())),
            Some(other) => Err(PayloadError::UnknownKind {
                kind: other.to_string(),
            }),
            None => Err(PayloadError::malformed("missing kind tag")),
        }
    }

    /// The record's identity.
    pub fn id(&self) -> &RecordId {
        match self {
            RemoteRecord::Entry(entry) => &entry.id,
            RemoteRecord::Asset(asset) => &asset.id,
        }
    }

    /// The record's last modification timestamp.
    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            RemoteRecord::Entry(entry) => entry.updated_at,
            RemoteRecord::Asset(asset) => asset.updated_at,
        }
    }

    /// The server-assigned version.
    pub fn version(&self) -> u32 {
        match self {
            RemoteRecord::Entry(entry) => entry.version,
            RemoteRecord::Asset(asset) => asset.version,
        }
    }
}

/// The entry fields a push sends to the remote write API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPayload {
    /// Record identity.
    pub id: RecordId,
    /// Local modification timestamp, offered for last-writer-wins ordering.
    pub updated_at: DateTime<Utc>,
    /// Book title.
    pub title: String,
    /// Author name.
    pub author: Option<String>,
    /// ISBN or other identifier.
    pub isbn: Option<String>,
    /// Rating on a 0-10 scale.
    pub rating: Option<u8>,
    /// Free-text review.
    pub review: Option<String>,
    /// Date reading started.
    pub started_on: Option<NaiveDate>,
    /// Date reading finished.
    pub finished_on: Option<NaiveDate>,
    /// Reference to the cover asset.
    pub cover_asset_id: Option<RecordId>,
    /// Content locale.
    pub locale: String,
}

/// The asset fields a push sends to the remote write API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPayload {
    /// Record identity.
    pub id: RecordId,
    /// Local modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Durable content URL, if already resolved.
    pub url: Option<String>,
    /// Original file name.
    pub file_name: String,
    /// MIME content type.
    pub content_type: String,
    /// Size of the binary in bytes.
    pub size_bytes: u64,
    /// Pixel width, if known.
    pub width: Option<u32>,
    /// Pixel height, if known.
    pub height: Option<u32>,
}

/// Server acknowledgement of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    /// The new optimistic-lock version.
    pub version: u32,
    /// The server's modification timestamp for the record.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn decodes_entry_item() {
        let value = json!({
            "kind": "entry",
            "id": "e1",
            "version": 3,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "title": "The Dispossessed",
            "author": "Ursula K. Le Guin",
            "rating": 9
        });

        let record = RemoteRecord::decode(&value).unwrap();
        assert_eq!(record.id(), &RecordId::new("e1"));
        assert_eq!(record.version(), 3);
        match record {
            RemoteRecord::Entry(entry) => {
                assert_eq!(entry.title, "The Dispossessed");
                assert_eq!(entry.rating, Some(9));
                assert_eq!(entry.isbn, None);
            }
            RemoteRecord::Asset(_) => panic!("decoded as asset"),
        }
    }

    #[test]
    fn decodes_asset_item() {
        let value = json!({
            "kind": "asset",
            "id": "a1",
            "version": 1,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "url": "https://cdn.example.com/a1.jpg",
            "file_name": "cover.jpg",
            "content_type": "image/jpeg",
            "size_bytes": 2048,
            "width": 600,
            "height": 900
        });

        let record = RemoteRecord::decode(&value).unwrap();
        match record {
            RemoteRecord::Asset(asset) => {
                assert_eq!(asset.url.as_deref(), Some("https://cdn.example.com/a1.jpg"));
                assert_eq!(asset.width, Some(600));
            }
            RemoteRecord::Entry(_) => panic!("decoded as entry"),
        }
    }

    #[test]
    fn rejects_missing_kind() {
        let value = json!({ "id": "e1" });
        let err = RemoteRecord::decode(&value).unwrap_err();
        assert!(matches!(err, PayloadError::Malformed { .. }));
    }

    #[test]
    fn rejects_unknown_kind() {
        let value = json!({ "kind": "playlist", "id": "p1" });
        let err = RemoteRecord::decode(&value).unwrap_err();
        assert!(matches!(err, PayloadError::UnknownKind { kind } if kind == "playlist"));
    }

    #[test]
    fn rejects_malformed_entry() {
        // title is required
        let value = json!({
            "kind": "entry",
            "id": "e1",
            "version": 1,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        assert!(RemoteRecord::decode(&value).is_err());
    }

    #[test]
    fn record_accessors() {
        let entry = RemoteEntry {
            id: RecordId::new("e1"),
            version: 7,
            created_at: ts(1),
            updated_at: ts(2),
            title: "t".into(),
            author: None,
            isbn: None,
            rating: None,
            review: None,
            started_on: None,
            finished_on: None,
            cover_asset_id: None,
            locale: None,
        };
        let record = RemoteRecord::Entry(entry);
        assert_eq!(record.updated_at(), ts(2));
        assert_eq!(record.version(), 7);
    }
}
