//! Step and plan status.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a step. Phase and plan statuses are derived from
/// their children with [`Status::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet worked on.
    Pending,
    /// Eligible and primed for work.
    Prepared,
    /// An operation is in flight with the master.
    Starting,
    /// Done. Terminal; a complete step never regresses.
    Complete,
    /// The last attempt failed; retried on the next offer cycle.
    Error,
    /// Parked; not currently eligible for work.
    Waiting,
}

impl Status {
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Derives an aggregate status from child statuses.
    ///
    /// No children (or all complete) is complete. Otherwise the most
    /// in-progress non-complete child wins, with errors surfacing above
    /// everything else.
    #[must_use]
    pub fn aggregate(children: impl IntoIterator<Item = Status>) -> Status {
        let mut saw_starting = false;
        let mut saw_prepared = false;
        let mut saw_pending = false;
        let mut saw_waiting = false;
        let mut any = false;

        for child in children {
            any = true;
            match child {
                Self::Error => return Self::Error,
                Self::Starting => saw_starting = true,
                Self::Prepared => saw_prepared = true,
                Self::Pending => saw_pending = true,
                Self::Waiting => saw_waiting = true,
                Self::Complete => {}
            }
        }

        if !any || !(saw_starting || saw_prepared || saw_pending || saw_waiting) {
            Self::Complete
        } else if saw_starting {
            Self::Starting
        } else if saw_prepared {
            Self::Prepared
        } else if saw_pending {
            Self::Pending
        } else {
            Self::Waiting
        }
    }
}
