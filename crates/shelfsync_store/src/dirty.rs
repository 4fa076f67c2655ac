//! Dirty tracking for locally-originated saves.

use crate::record::SyncRecord;
use chrono::{DateTime, Duration, Utc};

/// Stamps a locally-edited record before it is written.
///
/// Compares the declared syncable fields of `after` against the stored
/// `before` image. When they differ, `updated_at` is advanced monotonically
/// and the dirty flag is raised; when they are identical, `after` inherits
/// the stored sync-control values unchanged and the caller must skip the
/// write entirely, so saving the same content twice produces exactly one
/// physical write.
///
/// Returns `true` when the record changed and must be written.
pub fn stamp_local_edit<R: SyncRecord>(
    before: Option<&R>,
    after: &mut R,
    now: DateTime<Utc>,
) -> bool {
    match before {
        None => {
            after.set_updated_at(now);
            after.set_dirty(true);
            true
        }
        Some(before) => {
            if before.content_eq(after) {
                after.set_updated_at(before.updated_at());
                after.set_dirty(before.is_dirty());
                false
            } else {
                // updated_at never decreases, even against a skewed clock
                let floor = before.updated_at() + Duration::milliseconds(1);
                after.set_updated_at(now.max(floor));
                after.set_dirty(true);
                true
            }
        }
    }
}
