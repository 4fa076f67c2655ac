//! Delta-fetch messages and the sync cursor.

use crate::id::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version the cursor was written under.
///
/// Bumped whenever the locally-persisted merge shape changes incompatibly;
/// a cursor from an older schema forces a full resync instead of a delta.
pub const CURSOR_SCHEMA_VERSION: u32 = 2;

/// Marks the last point successfully pulled from the remote change stream.
///
/// The token is opaque to the client. An absent token means no pull has
/// completed yet and the next pull is a full initial fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Opaque continuation token issued by the server.
    pub token: Option<String>,
    /// Schema version guard.
    pub schema_version: u32,
}

impl SyncCursor {
    /// A cursor that has never pulled.
    pub fn empty() -> Self {
        Self {
            token: None,
            schema_version: CURSOR_SCHEMA_VERSION,
        }
    }

    /// A cursor positioned at a server-issued token.
    pub fn at(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            schema_version: CURSOR_SCHEMA_VERSION,
        }
    }

    /// True when the next pull must be a full initial fetch, either because
    /// no pull has completed or because the cursor predates the current
    /// schema.
    pub fn is_initial(&self) -> bool {
        self.token.is_none() || self.schema_version != CURSOR_SCHEMA_VERSION
    }

    /// The token to send with the next pull, if any.
    pub fn request_token(&self) -> Option<&str> {
        if self.schema_version == CURSOR_SCHEMA_VERSION {
            self.token.as_deref()
        } else {
            None
        }
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::empty()
    }
}

/// A delta-fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Continuation token from the last successful pull, absent for a full
    /// initial fetch.
    pub token: Option<String>,
    /// Maximum number of items per page.
    pub limit: u32,
}

impl PullRequest {
    /// Builds the request for the next page after `cursor`.
    pub fn from_cursor(cursor: &SyncCursor, limit: u32) -> Self {
        Self {
            token: cursor.request_token().map(str::to_string),
            limit,
        }
    }
}

/// One page of the remote change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Changed records as raw JSON, decoded individually by the pull
    /// engine so one malformed item cannot poison the page.
    pub items: Vec<Value>,
    /// Ids of records deleted remotely since the cursor.
    pub deleted: Vec<RecordId>,
    /// Token marking the position after this page.
    pub next_token: String,
    /// Whether more pages are available immediately.
    pub has_more: bool,
}

impl PullResponse {
    /// Creates a response page.
    pub fn new(
        items: Vec<Value>,
        deleted: Vec<RecordId>,
        next_token: impl Into<String>,
        has_more: bool,
    ) -> Self {
        Self {
            items,
            deleted,
            next_token: next_token.into(),
            has_more,
        }
    }

    /// An empty page that only advances the cursor.
    pub fn empty(next_token: impl Into<String>) -> Self {
        Self::new(Vec::new(), Vec::new(), next_token, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cursor_is_initial() {
        let cursor = SyncCursor::empty();
        assert!(cursor.is_initial());
        assert_eq!(cursor.request_token(), None);
    }

    #[test]
    fn positioned_cursor_is_delta() {
        let cursor = SyncCursor::at("tok-1");
        assert!(!cursor.is_initial());
        assert_eq!(cursor.request_token(), Some("tok-1"));
    }

    #[test]
    fn stale_schema_forces_initial_fetch() {
        let cursor = SyncCursor {
            token: Some("tok-1".into()),
            schema_version: CURSOR_SCHEMA_VERSION - 1,
        };
        assert!(cursor.is_initial());
        assert_eq!(cursor.request_token(), None);
    }

    #[test]
    fn pull_request_carries_cursor_token() {
        let request = PullRequest::from_cursor(&SyncCursor::at("tok-9"), 50);
        assert_eq!(request.token.as_deref(), Some("tok-9"));
        assert_eq!(request.limit, 50);

        let initial = PullRequest::from_cursor(&SyncCursor::empty(), 50);
        assert_eq!(initial.token, None);
    }

    #[test]
    fn empty_page_has_no_items() {
        let page = PullResponse::empty("tok-2");
        assert!(page.items.is_empty());
        assert!(page.deleted.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.next_token, "tok-2");
    }
}
