//! # Achievement Workflow
//!
//! The lifecycle engine. Every operation takes the caller's `Identity`
//! explicitly, resolves it through the directory, checks ownership or
//! advisor scope, and then drives the two stores.
//!
//! ## Create Saga
//!
//! 1. Write the detail document (the store assigns its id).
//! 2. Write the Draft reference pointing at it.
//! 3. If step 2 fails, hard-delete the document. Compensation is
//!    best-effort: a failure is logged and leaves an orphan for the
//!    consistency check. Create is therefore NOT idempotent on retry.
//!
//! ## Status Changes
//!
//! Submit, verify, reject and delete consult `status::next` for the target
//! state, then issue one compare-and-set guarded by the status that was
//! observed. A CAS that does not apply is re-read: a vanished row is
//! `NotFound`, anything else is a lost race and reports `InvalidState`.

use crate::attachments::AttachmentManager;
use crate::detail::DetailStore;
use crate::directory::Directory;
use crate::identity::{Identity, Role};
use crate::merge::MergeEngine;
use crate::reference::{Guard, ReferenceStore};
use crate::status::{self, Action, Status};
use crate::types::{
    Achievement, AchievementContent, AttachmentMeta, DetailId, LecturerId, NewDetail, Reference,
    ReferenceId, StatusChange, StudentId, validate_note,
};
use crate::visibility::VisibilityResolver;
use crate::MeritError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// =============================================================================
// HISTORY
// =============================================================================

/// A point on an achievement's status timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Created,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub milestone: Milestone,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Derive the timeline from a reference's timestamps.
///
/// A re-submission clears the previous decision, so only the latest review
/// cycle is visible.
#[must_use]
pub fn history_of(reference: &Reference) -> Vec<HistoryEntry> {
    let mut entries = vec![HistoryEntry {
        milestone: Milestone::Created,
        at: reference.created_at,
        actor: Some(reference.student_id.to_string()),
        note: None,
    }];

    if let Some(at) = reference.submitted_at {
        entries.push(HistoryEntry {
            milestone: Milestone::Submitted,
            at,
            actor: Some(reference.student_id.to_string()),
            note: None,
        });
    }

    if let Some(at) = reference.verified_at {
        let milestone = if reference.rejection_note.is_some() {
            Milestone::Rejected
        } else {
            Milestone::Verified
        };
        entries.push(HistoryEntry {
            milestone,
            at,
            actor: reference.verified_by.as_ref().map(ToString::to_string),
            note: reference.rejection_note.clone(),
        });
    }

    if reference.status == Status::Deleted {
        entries.push(HistoryEntry {
            milestone: Milestone::Deleted,
            at: reference.updated_at,
            actor: Some(reference.student_id.to_string()),
            note: None,
        });
    }

    entries
}

// =============================================================================
// WORKFLOW
// =============================================================================

#[derive(Clone)]
pub struct AchievementWorkflow {
    references: Arc<dyn ReferenceStore>,
    details: Arc<dyn DetailStore>,
    visibility: VisibilityResolver,
    merge: MergeEngine,
    attachments: AttachmentManager,
}

impl std::fmt::Debug for AchievementWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchievementWorkflow").finish_non_exhaustive()
    }
}

impl AchievementWorkflow {
    #[must_use]
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        details: Arc<dyn DetailStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        let visibility = VisibilityResolver::new(directory);
        let merge = MergeEngine::new(Arc::clone(&details));
        let attachments = AttachmentManager::new(
            Arc::clone(&references),
            Arc::clone(&details),
            visibility.clone(),
        );
        Self {
            references,
            details,
            visibility,
            merge,
            attachments,
        }
    }

    #[must_use]
    pub fn references(&self) -> &dyn ReferenceStore {
        self.references.as_ref()
    }

    #[must_use]
    pub fn details(&self) -> &dyn DetailStore {
        self.details.as_ref()
    }

    #[must_use]
    pub fn visibility(&self) -> &VisibilityResolver {
        &self.visibility
    }

    #[must_use]
    pub fn merge_engine(&self) -> &MergeEngine {
        &self.merge
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Create a Draft achievement owned by the calling student.
    pub fn create(
        &self,
        identity: &Identity,
        content: AchievementContent,
    ) -> Result<Achievement, MeritError> {
        let content = content.validate()?;
        identity.require_role(&Role::Student)?;
        let student = self.visibility.student_of(identity)?;
        let now = Utc::now();

        let detail = self.details.insert(NewDetail {
            student_id: student.clone(),
            content,
            created_at: now,
        })?;

        let reference = Reference::draft(student, detail.id, now);
        match self.references.insert(reference.clone()) {
            Ok(()) => {
                info!(reference = %reference.id, detail = %detail.id, student = %reference.student_id, "achievement created");
                Ok(Achievement { reference, detail })
            }
            Err(e) => {
                warn!(detail = %detail.id, error = %e, "reference write failed; compensating");
                match self.details.remove(detail.id) {
                    Ok(true) => debug!(detail = %detail.id, "compensating delete applied"),
                    Ok(false) => {
                        error!(detail = %detail.id, "compensating delete found no document");
                    }
                    Err(ce) => {
                        error!(detail = %detail.id, error = %ce, "compensating delete failed; detail orphaned");
                    }
                }
                Err(e)
            }
        }
    }

    /// Draft or Rejected -> Submitted, by the owning student.
    pub fn submit(&self, identity: &Identity, id: ReferenceId) -> Result<Reference, MeritError> {
        identity.require_role(&Role::Student)?;
        let student = self.visibility.student_of(identity)?;
        let current = self.load_owned(id, &student)?;
        self.transition(&current, Action::Submit, Some(student), None, None)
    }

    /// Submitted -> Verified, by an advisor of the owning student.
    pub fn verify(&self, identity: &Identity, id: ReferenceId) -> Result<Reference, MeritError> {
        let (lecturer, current) = self.load_advised(identity, id)?;
        self.transition(&current, Action::Verify, None, Some(lecturer), None)
    }

    /// Submitted -> Rejected with a mandatory note, by an advisor of the
    /// owning student.
    pub fn reject(
        &self,
        identity: &Identity,
        id: ReferenceId,
        note: &str,
    ) -> Result<Reference, MeritError> {
        let note = validate_note(note)?;
        let (lecturer, current) = self.load_advised(identity, id)?;
        self.transition(&current, Action::Reject, None, Some(lecturer), Some(note))
    }

    /// Draft or Rejected -> Deleted, by the owning student, cascading a
    /// soft-delete marker onto the detail.
    ///
    /// A failed cascade does not undo the delete; it is logged and left for
    /// the consistency check.
    pub fn delete(&self, identity: &Identity, id: ReferenceId) -> Result<Reference, MeritError> {
        identity.require_role(&Role::Student)?;
        let student = self.visibility.student_of(identity)?;
        let current = self.load_owned(id, &student)?;
        let deleted = self.transition(&current, Action::Delete, Some(student), None, None)?;

        match deleted.detail_id() {
            Ok(detail) => match self.details.soft_delete(detail, deleted.updated_at) {
                Ok(true) => debug!(reference = %deleted.id, detail = %detail, "detail soft-deleted"),
                Ok(false) => {
                    error!(reference = %deleted.id, detail = %detail, "delete cascade found no detail");
                }
                Err(e) => {
                    error!(reference = %deleted.id, detail = %detail, error = %e, "delete cascade failed");
                }
            },
            Err(e) => {
                error!(reference = %deleted.id, error = %e, "delete cascade skipped: corrupt detail ref");
            }
        }
        Ok(deleted)
    }

    /// Overwrite content while the status is Draft or Rejected. The
    /// reference is not touched.
    pub fn edit(
        &self,
        identity: &Identity,
        id: ReferenceId,
        content: AchievementContent,
    ) -> Result<Achievement, MeritError> {
        let content = content.validate()?;
        identity.require_role(&Role::Student)?;
        let student = self.visibility.student_of(identity)?;
        let reference = self.load_owned(id, &student)?;

        if !reference.status.is_editable() {
            return Err(MeritError::InvalidState {
                status: reference.status,
                action: Action::Edit,
            });
        }

        let detail_id = self.parse_detail_ref(&reference)?;
        let detail = self
            .details
            .update_content(detail_id, &content, Utc::now())?
            .ok_or_else(|| MeritError::NotFound(format!("detail {}", detail_id)))?;

        debug!(reference = %reference.id, detail = %detail_id, "content edited");
        Ok(Achievement { reference, detail })
    }

    /// Append attachment metadata; see [`AttachmentManager::add`].
    pub fn add_attachment(
        &self,
        identity: &Identity,
        id: ReferenceId,
        meta: AttachmentMeta,
    ) -> Result<Achievement, MeritError> {
        self.attachments.add(identity, id, meta)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Every achievement visible to the caller, in `(created_at, id)` order.
    pub fn list(&self, identity: &Identity) -> Result<Vec<Achievement>, MeritError> {
        let constraint = self.visibility.resolve(identity)?;
        let references = self.references.query(&constraint)?;
        self.merge.merge(references)
    }

    /// One visible achievement.
    pub fn get(&self, identity: &Identity, id: ReferenceId) -> Result<Achievement, MeritError> {
        let constraint = self.visibility.resolve(identity)?;
        let reference = self
            .references
            .get(id)?
            .filter(|r| constraint.matches(r))
            .ok_or_else(|| MeritError::NotFound(format!("achievement {}", id)))?;

        let detail_id = self.parse_detail_ref(&reference)?;
        let detail = self
            .details
            .get(detail_id)?
            .filter(|d| d.is_live())
            .ok_or_else(|| MeritError::NotFound(format!("detail {}", detail_id)))?;

        Ok(Achievement { reference, detail })
    }

    /// Status timeline of a visible achievement.
    ///
    /// Deleted achievements keep their history for whoever could see them
    /// before deletion.
    pub fn history(
        &self,
        identity: &Identity,
        id: ReferenceId,
    ) -> Result<Vec<HistoryEntry>, MeritError> {
        let mut constraint = self.visibility.resolve(identity)?;
        // a deleted draft stays hidden from callers who never saw drafts
        let hides_drafts = constraint.excluded.contains(&Status::Draft);
        constraint.excluded.remove(&Status::Deleted);
        let reference = self
            .references
            .get(id)?
            .filter(|r| constraint.matches(r))
            .filter(|r| {
                !(hides_drafts && r.status == Status::Deleted && r.submitted_at.is_none())
            })
            .ok_or_else(|| MeritError::NotFound(format!("achievement {}", id)))?;
        Ok(history_of(&reference))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn load(&self, id: ReferenceId) -> Result<Reference, MeritError> {
        self.references
            .get(id)?
            .ok_or_else(|| MeritError::NotFound(format!("achievement {}", id)))
    }

    fn load_owned(&self, id: ReferenceId, student: &StudentId) -> Result<Reference, MeritError> {
        let reference = self.load(id)?;
        if reference.student_id != *student {
            return Err(MeritError::NotOwner);
        }
        Ok(reference)
    }

    /// Load a reference the calling advisor is responsible for.
    fn load_advised(
        &self,
        identity: &Identity,
        id: ReferenceId,
    ) -> Result<(LecturerId, Reference), MeritError> {
        identity.require_role(&Role::Advisor)?;
        let lecturer = self.visibility.lecturer_of(identity)?;
        let reference = self.load(id)?;
        let advisees = self.visibility.directory().advisees(&lecturer)?;
        if !advisees.contains(&reference.student_id) {
            return Err(MeritError::Forbidden(format!(
                "student {} is not advised by {}",
                reference.student_id, lecturer
            )));
        }
        Ok((lecturer, reference))
    }

    fn parse_detail_ref(&self, reference: &Reference) -> Result<DetailId, MeritError> {
        reference.detail_id().inspect_err(|e| {
            error!(reference = %reference.id, error = %e, "corrupt detail ref");
        })
    }

    fn transition(
        &self,
        current: &Reference,
        action: Action,
        owner: Option<StudentId>,
        verifier: Option<LecturerId>,
        note: Option<String>,
    ) -> Result<Reference, MeritError> {
        let to = status::next(current.status, action).ok_or(MeritError::InvalidState {
            status: current.status,
            action,
        })?;

        let mut guard = Guard::status(current.status);
        if let Some(student) = owner {
            guard = guard.owned_by(student);
        }
        let change = StatusChange {
            action,
            to,
            at: Utc::now(),
            verifier,
            note,
        };

        match self.references.compare_and_set(current.id, &guard, &change)? {
            Some(updated) => {
                info!(reference = %updated.id, action = %change.action, from = %current.status, to = %updated.status, "status changed");
                Ok(updated)
            }
            None => match self.references.get(current.id)? {
                None => Err(MeritError::NotFound(format!("achievement {}", current.id))),
                Some(latest) => {
                    warn!(reference = %current.id, action = %action, observed = %current.status, now = %latest.status, "lost status race");
                    Err(MeritError::InvalidState {
                        status: latest.status,
                        action,
                    })
                }
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
