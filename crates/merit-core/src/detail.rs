//! # Detail Store
//!
//! The document half of an achievement: title, description, the
//! schema-less `details` object, tags, points and attachments.
//!
//! Details are addressed by `DetailId`, which the store assigns on insert.
//! Soft-deleted documents stay in the store (visible to `get` and `scan`)
//! but are excluded from the batched `get_many` used by listings.

use crate::MeritError;
use crate::types::{AchievementContent, Attachment, Detail, DetailId, NewDetail};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Persistence for detail documents.
pub trait DetailStore: Send + Sync {
    /// Store a new document under a freshly assigned identifier.
    fn insert(&self, new: NewDetail) -> Result<Detail, MeritError>;

    /// Fetch one document, soft-deleted or not.
    fn get(&self, id: DetailId) -> Result<Option<Detail>, MeritError>;

    /// Batched fetch of live documents. Missing ids are skipped; the result
    /// order is unspecified.
    fn get_many(&self, ids: &[DetailId]) -> Result<Vec<Detail>, MeritError>;

    /// Overwrite the mutable content fields of a live document.
    fn update_content(
        &self,
        id: DetailId,
        content: &AchievementContent,
        at: DateTime<Utc>,
    ) -> Result<Option<Detail>, MeritError>;

    /// Set the soft-delete marker. Returns `false` if the document is absent.
    fn soft_delete(&self, id: DetailId, at: DateTime<Utc>) -> Result<bool, MeritError>;

    /// Hard delete. Used only to compensate a failed create.
    fn remove(&self, id: DetailId) -> Result<bool, MeritError>;

    /// Append an attachment to a live document and bump `updated_at`.
    fn push_attachment(
        &self,
        id: DetailId,
        attachment: Attachment,
    ) -> Result<Option<Detail>, MeritError>;

    /// Every document, including soft-deleted ones.
    fn scan(&self) -> Result<Vec<Detail>, MeritError>;
}

/// A `DetailStore` held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDetailStore {
    documents: RwLock<BTreeMap<DetailId, Detail>>,
}

impl MemoryDetailStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DetailStore for MemoryDetailStore {
    fn insert(&self, new: NewDetail) -> Result<Detail, MeritError> {
        let mut documents = self.documents.write();
        let mut id = DetailId::generate();
        while documents.contains_key(&id) {
            id = DetailId::generate();
        }
        let detail = Detail::from_new(id, new);
        documents.insert(id, detail.clone());
        Ok(detail)
    }

    fn get(&self, id: DetailId) -> Result<Option<Detail>, MeritError> {
        Ok(self.documents.read().get(&id).cloned())
    }

    fn get_many(&self, ids: &[DetailId]) -> Result<Vec<Detail>, MeritError> {
        let documents = self.documents.read();
        Ok(ids
            .iter()
            .filter_map(|id| documents.get(id))
            .filter(|d| d.is_live())
            .cloned()
            .collect())
    }

    fn update_content(
        &self,
        id: DetailId,
        content: &AchievementContent,
        at: DateTime<Utc>,
    ) -> Result<Option<Detail>, MeritError> {
        let mut documents = self.documents.write();
        Ok(documents
            .get_mut(&id)
            .filter(|d| d.is_live())
            .map(|detail| {
                detail.overwrite(content, at);
                detail.clone()
            }))
    }

    fn soft_delete(&self, id: DetailId, at: DateTime<Utc>) -> Result<bool, MeritError> {
        let mut documents = self.documents.write();
        match documents.get_mut(&id) {
            Some(detail) => {
                detail.deleted_at = Some(at);
                detail.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, id: DetailId) -> Result<bool, MeritError> {
        Ok(self.documents.write().remove(&id).is_some())
    }

    fn push_attachment(
        &self,
        id: DetailId,
        attachment: Attachment,
    ) -> Result<Option<Detail>, MeritError> {
        let mut documents = self.documents.write();
        Ok(documents
            .get_mut(&id)
            .filter(|d| d.is_live())
            .map(|detail| {
                detail.updated_at = attachment.uploaded_at;
                detail.attachments.push(attachment);
                detail.clone()
            }))
    }

    fn scan(&self) -> Result<Vec<Detail>, MeritError> {
        Ok(self.documents.read().values().cloned().collect())
    }
}
