//! # merit-core
//!
//! The split-record lifecycle engine for student achievements - THE LOGIC.
//!
//! An achievement lives in two stores at once: a workflow `Reference` that
//! owns status and ownership, and a content `Detail` document. This crate
//! implements the status machine, the role-scoped visibility rules, the
//! create saga with its compensating delete, and the merge that joins both
//! halves back into one view.
//!
//! ## Architectural Constraints
//!
//! - Synchronous and transport-agnostic: NO async, NO network dependencies
//! - Caller identity is always passed explicitly; there is no ambient state
//! - Status transitions are decided in exactly one place (`status::next`)
//! - No cross-store transaction exists; consistency is procedural

// =============================================================================
// MODULES
// =============================================================================

pub mod attachments;
pub mod consistency;
pub mod detail;
pub mod directory;
pub mod identity;
pub mod merge;
pub mod primitives;
pub mod reference;
pub mod report;
pub mod status;
pub mod storage;
pub mod types;
pub mod visibility;
pub mod workflow;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Achievement, AchievementContent, Attachment, AttachmentMeta, Detail, DetailId, LecturerId,
    MeritError, NewDetail, Outcome, Reference, ReferenceId, StatusChange, StudentId, UserId,
};

// =============================================================================
// RE-EXPORTS: Lifecycle Engine
// =============================================================================

pub use attachments::AttachmentManager;
pub use consistency::{ConsistencyChecker, ConsistencyReport};
pub use detail::{DetailStore, MemoryDetailStore};
pub use directory::{Directory, DirectorySeed, MemoryDirectory};
pub use identity::{Identity, Permission, Role};
pub use merge::MergeEngine;
pub use reference::{Guard, MemoryReferenceStore, QueryConstraint, ReferenceStore, StudentScope};
pub use report::{Statistics, StudentReport};
pub use status::{Action, Status};
pub use storage::{RedbDetailStore, RedbReferenceStore, open_data_dir};
pub use visibility::{VisibilityPolicy, VisibilityResolver, policy_for};
pub use workflow::{AchievementWorkflow, HistoryEntry, Milestone};
