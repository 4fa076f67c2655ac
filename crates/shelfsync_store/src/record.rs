//! Local record types.

use chrono::{DateTime, NaiveDate, Utc};
use shelfsync_protocol::{
    AssetPayload, EntryPayload, RecordId, RemoteAsset, RemoteEntry, WriteAck,
};

/// Behavior shared by every locally-stored, syncable record.
///
/// The dirty tracker operates through this trait so that the before/after
/// comparison stays restricted to each type's declared syncable fields;
/// sync-control fields (`is_dirty`, `remote_version`, timestamps, locale)
/// never participate in change detection.
pub trait SyncRecord {
    /// The record's stable identity.
    fn id(&self) -> &RecordId;

    /// Last local modification timestamp.
    fn updated_at(&self) -> DateTime<Utc>;

    /// Advances the modification timestamp.
    fn set_updated_at(&mut self, at: DateTime<Utc>);

    /// Whether the record has unacknowledged local edits.
    fn is_dirty(&self) -> bool;

    /// Sets the dirty flag.
    fn set_dirty(&mut self, dirty: bool);

    /// Compares only the declared syncable fields of two snapshots.
    fn content_eq(&self, other: &Self) -> bool;
}

/// A reading-log entry in the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Stable identity, locally generated and adopted by the server.
    pub id: RecordId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp; the sole conflict-ordering signal.
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
    /// Optimistic-lock version last observed from the server. `None`
    /// until the record has been seen by the remote service.
    pub remote_version: Option<u32>,
    /// True while local edits await acknowledgement.
    pub is_dirty: bool,
    /// Local soft delete, pushed as a remote deletion.
    pub is_deleted: bool,
}

impl Entry {
    /// Creates a new local entry. The record becomes dirty when first
    /// saved through a local transaction scope.
    pub fn new(title: impl Into<String>, locale: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            created_at: now,
            updated_at: now,
            title: title.into(),
            author: None,
            isbn: None,
            rating: None,
            review: None,
            started_on: None,
            finished_on: None,
            cover_asset_id: None,
            locale: locale.into(),
            remote_version: None,
            is_dirty: false,
            is_deleted: false,
        }
    }

    /// Builds a clean local record from a pulled remote payload.
    pub fn from_remote(remote: &RemoteEntry, default_locale: &str) -> Self {
        Self {
            id: remote.id.clone(),
            created_at: remote.created_at,
            updated_at: remote.updated_at,
            title: remote.title.clone(),
            author: remote.author.clone(),
            isbn: remote.isbn.clone(),
            rating: remote.rating,
            review: remote.review.clone(),
            started_on: remote.started_on,
            finished_on: remote.finished_on,
            cover_asset_id: remote.cover_asset_id.clone(),
            locale: remote
                .locale
                .clone()
                .unwrap_or_else(|| default_locale.to_string()),
            remote_version: Some(remote.version),
            is_dirty: false,
            is_deleted: false,
        }
    }

    /// Serializes the domain fields into the remote write shape.
    pub fn payload(&self) -> EntryPayload {
        EntryPayload {
            id: self.id.clone(),
            updated_at: self.updated_at,
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            rating: self.rating,
            review: self.review.clone(),
            started_on: self.started_on,
            finished_on: self.finished_on,
            cover_asset_id: self.cover_asset_id.clone(),
            locale: self.locale.clone(),
        }
    }

    /// Applies a successful push acknowledgement.
    pub fn acknowledge(&mut self, ack: WriteAck) {
        self.remote_version = Some(ack.version);
        self.updated_at = ack.updated_at;
        self.is_dirty = false;
    }
}

impl SyncRecord for Entry {
    fn id(&self) -> &RecordId {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    fn content_eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.author == other.author
            && self.isbn == other.isbn
            && self.rating == other.rating
            && self.review == other.review
            && self.started_on == other.started_on
            && self.finished_on == other.finished_on
            && self.cover_asset_id == other.cover_asset_id
            && self.is_deleted == other.is_deleted
    }
}

/// A cover asset's metadata in the local store.
///
/// The binary bytes themselves live outside the store; only metadata and
/// the resolved remote URL are tracked here.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Stable identity.
    pub id: RecordId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Durable content URL once remote processing resolved it.
    pub url: Option<String>,
    /// Original file name.
    pub file_name: String,
    /// MIME content type.
    pub content_type: String,
    /// Size of the binary in bytes.
    pub size_bytes: u64,
    /// Pixel width, resolved by remote processing.
    pub width: Option<u32>,
    /// Pixel height, resolved by remote processing.
    pub height: Option<u32>,
    /// Optimistic-lock version last observed from the server.
    pub remote_version: Option<u32>,
    /// True while local edits await acknowledgement.
    pub is_dirty: bool,
    /// Local soft delete, pushed as a remote deletion.
    pub is_deleted: bool,
}

impl Asset {
    /// Creates a new local asset for a binary that has not been uploaded.
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            created_at: now,
            updated_at: now,
            url: None,
            file_name: file_name.into(),
            content_type: content_type.into(),
            size_bytes,
            width: None,
            height: None,
            remote_version: None,
            is_dirty: false,
            is_deleted: false,
        }
    }

    /// Builds a clean local record from a pulled remote payload.
    pub fn from_remote(remote: &RemoteAsset) -> Self {
        Self {
            id: remote.id.clone(),
            created_at: remote.created_at,
            updated_at: remote.updated_at,
            url: remote.url.clone(),
            file_name: remote.file_name.clone(),
            content_type: remote.content_type.clone(),
            size_bytes: remote.size_bytes,
            width: remote.width,
            height: remote.height,
            remote_version: Some(remote.version),
            is_dirty: false,
            is_deleted: false,
        }
    }

    /// Serializes the asset fields into the remote write shape.
    pub fn payload(&self) -> AssetPayload {
        AssetPayload {
            id: self.id.clone(),
            updated_at: self.updated_at,
            url: self.url.clone(),
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes,
            width: self.width,
            height: self.height,
        }
    }

    /// Applies a successful push acknowledgement.
    pub fn acknowledge(&mut self, ack: WriteAck) {
        self.remote_version = Some(ack.version);
        self.updated_at = ack.updated_at;
        self.is_dirty = false;
    }

    /// True when the binary still needs the remote upload workflow.
    pub fn needs_upload(&self) -> bool {
        self.url.is_none() && !self.is_deleted
    }
}

impl SyncRecord for Asset {
    fn id(&self) -> &RecordId {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    fn content_eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.file_name == other.file_name
            && self.content_type == other.content_type
            && self.size_bytes == other.size_bytes
            && self.width == other.width
            && self.height == other.height
            && self.is_deleted == other.is_deleted
    }
}
