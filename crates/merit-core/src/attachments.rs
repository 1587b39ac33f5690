//! # Attachment Manager
//!
//! Appends attachment metadata to an achievement's detail document. The
//! physical file lives elsewhere; only the `{file_name, url, mime_type}`
//! triple is persisted, stamped with the upload time.
//!
//! Attachments never change workflow status and are accepted in any status
//! the owner can still see (a soft-deleted detail refuses them).

use crate::detail::DetailStore;
use crate::identity::{Identity, Role};
use crate::reference::ReferenceStore;
use crate::types::{Achievement, AttachmentMeta, ReferenceId};
use crate::visibility::VisibilityResolver;
use crate::MeritError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct AttachmentManager {
    references: Arc<dyn ReferenceStore>,
    details: Arc<dyn DetailStore>,
    visibility: VisibilityResolver,
}

impl std::fmt::Debug for AttachmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentManager").finish_non_exhaustive()
    }
}

impl AttachmentManager {
    #[must_use]
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        details: Arc<dyn DetailStore>,
        visibility: VisibilityResolver,
    ) -> Self {
        Self {
            references,
            details,
            visibility,
        }
    }

    /// Append `meta` to the detail behind reference `id`.
    ///
    /// - `NotOwner` if the caller is not the owning student
    /// - `NotFound` if the reference or a live detail cannot be resolved
    /// - `Corrupt` if the reference's detail pointer does not parse
    pub fn add(
        &self,
        identity: &Identity,
        id: ReferenceId,
        meta: AttachmentMeta,
    ) -> Result<Achievement, MeritError> {
        let attachment = meta.into_attachment(Utc::now())?;
        identity.require_role(&Role::Student)?;
        let student = self.visibility.student_of(identity)?;

        let reference = self
            .references
            .get(id)?
            .ok_or_else(|| MeritError::NotFound(format!("achievement {}", id)))?;
        if reference.student_id != student {
            return Err(MeritError::NotOwner);
        }

        let detail_id = reference.detail_id().inspect_err(|e| {
            error!(reference = %reference.id, error = %e, "corrupt detail ref");
        })?;
        let detail = self
            .details
            .push_attachment(detail_id, attachment)?
            .ok_or_else(|| MeritError::NotFound(format!("detail {}", detail_id)))?;

        debug!(reference = %reference.id, attachments = detail.attachments.len(), "attachment added");
        Ok(Achievement { reference, detail })
    }
}
