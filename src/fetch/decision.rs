//! Pure decision table for a fetch call.
//!
//! Reconciles the destination file's modification time with the local
//! partial-download record, with no I/O, so the branching logic is testable
//! without a network or filesystem.

use std::time::SystemTime;

use super::metadata::PartialMetadata;

/// The single action a fetch call takes after inspecting local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Unconditional GET; stream the full body into a fresh temporary file.
    Fresh,
    /// Continue the existing record (ranged request, or promote if complete).
    Resume,
    /// Conditional GET with `If-Modified-Since` set to the destination mtime.
    Refresh {
        /// The destination's current modification time.
        since: SystemTime,
    },
    /// The record cannot be trusted: delete it, then refresh the destination.
    DiscardThenRefresh {
        /// The destination's current modification time.
        since: SystemTime,
    },
}

/// Maps local state to the action to take, per the decision table:
///
/// | destination | record                      | action               |
/// |-------------|-----------------------------|----------------------|
/// | absent      | absent                      | `Fresh`              |
/// | absent      | present, has last-modified  | `Resume`             |
/// | absent      | present, no last-modified   | `Fresh` (overwrite)  |
/// | present     | absent                      | `Refresh`            |
/// | present     | last-modified newer than destination | `Resume`    |
/// | present     | otherwise                   | `DiscardThenRefresh` |
#[must_use]
pub fn plan(dest_mtime: Option<SystemTime>, record: Option<&PartialMetadata>) -> Action {
    match (dest_mtime, record) {
        (None, None) => Action::Fresh,
        (None, Some(md)) => {
            if md.last_modified.is_some() {
                Action::Resume
            } else {
                Action::Fresh
            }
        }
        (Some(since), None) => Action::Refresh { since },
        (Some(since), Some(md)) => match md.last_modified {
            Some(last_modified) if last_modified > since => Action::Resume,
            _ => Action::DiscardThenRefresh { since },
        },
    }
}
