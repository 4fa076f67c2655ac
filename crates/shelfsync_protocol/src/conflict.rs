//! Conflict resolution and merge decisions.
//!
//! Both functions here are pure: they take the facts of a conflict and
//! return an instruction for the engines to execute. No I/O happens in
//! this module, which is what makes the policies testable over the whole
//! input space.

use chrono::{DateTime, Utc};

/// Instruction produced by the conflict resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictVerdict {
    /// Local fields win. Retry the push carrying the remote's version so
    /// the optimistic-lock check passes.
    KeepLocal {
        /// The version observed on the remote copy.
        retry_version: u32,
    },
    /// Remote fields win. Overwrite local state, clear the dirty flag, no
    /// retry needed.
    AcceptRemote,
}

/// Latest-wins resolution by modification timestamp.
///
/// Ties favor remote so that a retried push can never conflict forever on
/// an equal timestamp.
pub fn resolve_latest_wins(
    local_updated_at: DateTime<Utc>,
    remote_updated_at: DateTime<Utc>,
    remote_version: u32,
) -> ConflictVerdict {
    if local_updated_at > remote_updated_at {
        ConflictVerdict::KeepLocal {
            retry_version: remote_version,
        }
    } else {
        ConflictVerdict::AcceptRemote
    }
}

/// Decides whether a pulled remote record may overwrite local state.
///
/// `local_is_dirty` is `None` when no local record with that id exists.
/// Dirty records are owned by the push engine until pushed; the pull
/// engine must leave them untouched.
pub fn should_overwrite_on_pull(local_is_dirty: Option<bool>) -> bool {
    !local_is_dirty.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn newer_local_keeps_local_with_remote_version() {
        let verdict = resolve_latest_wins(ts(30), ts(5), 3);
        assert_eq!(verdict, ConflictVerdict::KeepLocal { retry_version: 3 });
    }

    #[test]
    fn newer_remote_wins() {
        let verdict = resolve_latest_wins(ts(10), ts(20), 8);
        assert_eq!(verdict, ConflictVerdict::AcceptRemote);
    }

    #[test]
    fn ties_favor_remote() {
        let verdict = resolve_latest_wins(ts(42), ts(42), 1);
        assert_eq!(verdict, ConflictVerdict::AcceptRemote);
    }

    #[test]
    fn pull_overwrites_clean_and_absent_records_only() {
        assert!(should_overwrite_on_pull(None));
        assert!(should_overwrite_on_pull(Some(false)));
        assert!(!should_overwrite_on_pull(Some(true)));
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic(local in 0i64..4_000_000_000, remote in 0i64..4_000_000_000, version in 0u32..1000) {
            let verdict = resolve_latest_wins(ts(local), ts(remote), version);
            if local > remote {
                prop_assert_eq!(verdict, ConflictVerdict::KeepLocal { retry_version: version });
            } else {
                prop_assert_eq!(verdict, ConflictVerdict::AcceptRemote);
            }
        }
    }
}
