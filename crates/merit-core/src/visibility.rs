//! # Visibility
//!
//! Which references a caller may see. One policy per role, each producing a
//! `QueryConstraint` that is pushed down to the reference store.
//!
//! | Role    | Students         | Excluded statuses |
//! |---------|------------------|-------------------|
//! | Admin   | all              | Deleted           |
//! | Student | self             | Deleted           |
//! | Advisor | advisees         | Deleted, Draft    |
//! | other   | `Forbidden`      |                   |

use crate::directory::Directory;
use crate::identity::{Identity, Role};
use crate::reference::QueryConstraint;
use crate::status::Status;
use crate::types::{LecturerId, StudentId};
use crate::MeritError;
use std::sync::Arc;

/// Computes the read filter for one role.
pub trait VisibilityPolicy: Send + Sync {
    fn filter_for(
        &self,
        identity: &Identity,
        directory: &dyn Directory,
    ) -> Result<QueryConstraint, MeritError>;
}

#[derive(Debug, Clone, Copy)]
pub struct AdminVisibility;

#[derive(Debug, Clone, Copy)]
pub struct StudentVisibility;

/// Drafts stay private to the student until submitted.
#[derive(Debug, Clone, Copy)]
pub struct AdvisorVisibility;

impl VisibilityPolicy for AdminVisibility {
    fn filter_for(
        &self,
        _identity: &Identity,
        _directory: &dyn Directory,
    ) -> Result<QueryConstraint, MeritError> {
        Ok(QueryConstraint::everything().excluding([Status::Deleted]))
    }
}

impl VisibilityPolicy for StudentVisibility {
    fn filter_for(
        &self,
        identity: &Identity,
        directory: &dyn Directory,
    ) -> Result<QueryConstraint, MeritError> {
        let student = require_student(identity, directory)?;
        Ok(QueryConstraint::owned_by(student).excluding([Status::Deleted]))
    }
}

impl VisibilityPolicy for AdvisorVisibility {
    fn filter_for(
        &self,
        identity: &Identity,
        directory: &dyn Directory,
    ) -> Result<QueryConstraint, MeritError> {
        let lecturer = require_lecturer(identity, directory)?;
        let advisees = directory.advisees(&lecturer)?;
        Ok(QueryConstraint::any_of(advisees).excluding([Status::Deleted, Status::Draft]))
    }
}

/// Select the policy for a role. Unknown roles are `Forbidden`.
pub fn policy_for(role: &Role) -> Result<&'static dyn VisibilityPolicy, MeritError> {
    match role {
        Role::Admin => Ok(&AdminVisibility),
        Role::Student => Ok(&StudentVisibility),
        Role::Advisor => Ok(&AdvisorVisibility),
        Role::Other(name) => Err(MeritError::Forbidden(format!(
            "role '{}' may not access achievements",
            name
        ))),
    }
}

/// Student profile of the caller; `Forbidden` if there is none.
pub fn require_student(
    identity: &Identity,
    directory: &dyn Directory,
) -> Result<StudentId, MeritError> {
    directory
        .student_for_user(&identity.user_id)?
        .ok_or_else(|| {
            MeritError::Forbidden(format!("user {} has no student profile", identity.user_id))
        })
}

/// Lecturer profile of the caller; `Forbidden` if there is none.
pub fn require_lecturer(
    identity: &Identity,
    directory: &dyn Directory,
) -> Result<LecturerId, MeritError> {
    directory
        .lecturer_for_user(&identity.user_id)?
        .ok_or_else(|| {
            MeritError::Forbidden(format!("user {} has no lecturer profile", identity.user_id))
        })
}

/// Resolves identities into query constraints against a directory.
#[derive(Clone)]
pub struct VisibilityResolver {
    directory: Arc<dyn Directory>,
}

impl std::fmt::Debug for VisibilityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityResolver").finish_non_exhaustive()
    }
}

impl VisibilityResolver {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub fn resolve(&self, identity: &Identity) -> Result<QueryConstraint, MeritError> {
        policy_for(&identity.role)?.filter_for(identity, self.directory.as_ref())
    }

    pub fn student_of(&self, identity: &Identity) -> Result<StudentId, MeritError> {
        require_student(identity, self.directory.as_ref())
    }

    pub fn lecturer_of(&self, identity: &Identity) -> Result<LecturerId, MeritError> {
        require_lecturer(identity, self.directory.as_ref())
    }

    #[must_use]
    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }
}
