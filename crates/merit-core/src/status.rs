//! # Status Machine
//!
//! The closed set of workflow states and the one transition table that
//! governs them.
//!
//! ```text
//!            submit              verify
//!   Draft ───────────► Submitted ───────► Verified
//!     │                  │    ▲
//!     │ delete    reject │    │ submit
//!     ▼                  ▼    │
//!   Deleted ◄──────── Rejected ◄─┐
//!             delete        │    │ edit
//!                           └────┘
//! ```
//!
//! `next` is the single point where a transition is decided. Callers never
//! compare status strings or reimplement the table; they ask for the next
//! state and get `None` when the edge does not exist.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// STATUS
// =============================================================================

/// Workflow status of an achievement reference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created, private to the owning student.
    #[default]
    Draft,
    /// Awaiting the advisor's decision.
    Submitted,
    /// Accepted by the advisor. Terminal.
    Verified,
    /// Sent back by the advisor with a note; editable and re-submittable.
    Rejected,
    /// Soft-deleted by the student. Terminal.
    Deleted,
}

impl Status {
    /// All states, in declaration order.
    pub const ALL: [Status; 5] = [
        Status::Draft,
        Status::Submitted,
        Status::Verified,
        Status::Rejected,
        Status::Deleted,
    ];

    /// Stable lowercase name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Deleted)
    }

    /// Content edits are accepted only in these states.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ACTION
// =============================================================================

/// An operation that may move a reference along an edge of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Submit,
    Verify,
    Reject,
    Delete,
    Edit,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Action; 5] = [
        Action::Submit,
        Action::Verify,
        Action::Reject,
        Action::Delete,
        Action::Edit,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Verify => "verify",
            Self::Reject => "reject",
            Self::Delete => "delete",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TRANSITION TABLE
// =============================================================================

/// Every edge of the machine as `(from, action, to)`.
pub const TRANSITIONS: [(Status, Action, Status); 8] = [
    (Status::Draft, Action::Submit, Status::Submitted),
    (Status::Rejected, Action::Submit, Status::Submitted),
    (Status::Submitted, Action::Verify, Status::Verified),
    (Status::Submitted, Action::Reject, Status::Rejected),
    (Status::Draft, Action::Delete, Status::Deleted),
    (Status::Rejected, Action::Delete, Status::Deleted),
    (Status::Draft, Action::Edit, Status::Draft),
    (Status::Rejected, Action::Edit, Status::Rejected),
];

/// Look up the state reached by applying `action` in state `from`.
///
/// Returns `None` when the edge does not exist.
#[must_use]
pub fn next(from: Status, action: Action) -> Option<Status> {
    TRANSITIONS
        .iter()
        .find(|(source, edge, _)| *source == from && *edge == action)
        .map(|(_, _, target)| *target)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_submits() {
        assert_eq!(next(Status::Draft, Action::Submit), Some(Status::Submitted));
    }

    #[test]
    fn rejected_resubmits() {
        assert_eq!(
            next(Status::Rejected, Action::Submit),
            Some(Status::Submitted)
        );
    }

    #[test]
    fn submitted_is_not_deletable() {
        assert_eq!(next(Status::Submitted, Action::Delete), None);
        assert_eq!(next(Status::Submitted, Action::Edit), None);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for status in Status::ALL.into_iter().filter(|s| s.is_terminal()) {
            for action in Action::ALL {
                assert_eq!(next(status, action), None, "{status} --{action}-->");
            }
        }
    }

    #[test]
    fn edit_is_a_self_loop_on_editable_states() {
        for status in Status::ALL {
            match next(status, Action::Edit) {
                Some(target) => {
                    assert!(status.is_editable());
                    assert_eq!(target, status);
                }
                None => assert!(!status.is_editable()),
            }
        }
    }

    #[test]
    fn table_is_deterministic() {
        for (i, (from, action, _)) in TRANSITIONS.iter().enumerate() {
            let duplicates = TRANSITIONS
                .iter()
                .skip(i + 1)
                .filter(|(f, a, _)| f == from && a == action)
                .count();
            assert_eq!(duplicates, 0, "duplicate edge {from} --{action}-->");
        }
    }
}
