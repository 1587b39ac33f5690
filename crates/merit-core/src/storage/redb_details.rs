//! # redb-backed Detail Store
//!
//! Detail documents are stored as JSON text keyed by their hex identifier.
//! JSON rather than postcard because `details` is schema-less and needs a
//! self-describing encoding.

use crate::detail::DetailStore;
use crate::types::{AchievementContent, Attachment, Detail, DetailId, NewDetail};
use crate::MeritError;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table for details: hex DetailId -> JSON document
const DETAILS: TableDefinition<&str, &str> = TableDefinition::new("details");

pub struct RedbDetailStore {
    db: Database,
}

impl std::fmt::Debug for RedbDetailStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDetailStore").finish_non_exhaustive()
    }
}

fn encode(detail: &Detail) -> Result<String, MeritError> {
    serde_json::to_string(detail).map_err(MeritError::storage)
}

fn decode(json: &str) -> Result<Detail, MeritError> {
    serde_json::from_str(json)
        .map_err(|e| MeritError::Corrupt(format!("undecodable detail document: {}", e)))
}

impl RedbDetailStore {
    /// Open or create a detail database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MeritError> {
        let db = Database::create(path.as_ref()).map_err(MeritError::storage)?;
        {
            let write_txn = db.begin_write().map_err(MeritError::storage)?;
            let _ = write_txn.open_table(DETAILS).map_err(MeritError::storage)?;
            write_txn.commit().map_err(MeritError::storage)?;
        }
        Ok(Self { db })
    }

    /// Read-modify-write of one live document inside a single transaction.
    fn modify(
        &self,
        id: DetailId,
        mutate: impl FnOnce(&mut Detail),
    ) -> Result<Option<Detail>, MeritError> {
        let key = id.to_hex();
        let write_txn = self.db.begin_write().map_err(MeritError::storage)?;
        let updated = {
            let mut table = write_txn.open_table(DETAILS).map_err(MeritError::storage)?;
            let current = match table.get(key.as_str()).map_err(MeritError::storage)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            match current.filter(|d| d.is_live()) {
                Some(mut detail) => {
                    mutate(&mut detail);
                    let json = encode(&detail)?;
                    table
                        .insert(key.as_str(), json.as_str())
                        .map_err(MeritError::storage)?;
                    Some(detail)
                }
                None => None,
            }
        };

        if updated.is_some() {
            write_txn.commit().map_err(MeritError::storage)?;
        } else {
            write_txn.abort().map_err(MeritError::storage)?;
        }
        Ok(updated)
    }
}

impl DetailStore for RedbDetailStore {
    fn insert(&self, new: NewDetail) -> Result<Detail, MeritError> {
        let write_txn = self.db.begin_write().map_err(MeritError::storage)?;
        let detail = {
            let mut table = write_txn.open_table(DETAILS).map_err(MeritError::storage)?;
            let mut id = DetailId::generate();
            while table
                .get(id.to_hex().as_str())
                .map_err(MeritError::storage)?
                .is_some()
            {
                id = DetailId::generate();
            }
            let detail = Detail::from_new(id, new);
            let json = encode(&detail)?;
            table
                .insert(id.to_hex().as_str(), json.as_str())
                .map_err(MeritError::storage)?;
            detail
        };
        write_txn.commit().map_err(MeritError::storage)?;
        Ok(detail)
    }

    fn get(&self, id: DetailId) -> Result<Option<Detail>, MeritError> {
        let read_txn = self.db.begin_read().map_err(MeritError::storage)?;
        let table = read_txn.open_table(DETAILS).map_err(MeritError::storage)?;
        match table.get(id.to_hex().as_str()).map_err(MeritError::storage)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn get_many(&self, ids: &[DetailId]) -> Result<Vec<Detail>, MeritError> {
        let read_txn = self.db.begin_read().map_err(MeritError::storage)?;
        let table = read_txn.open_table(DETAILS).map_err(MeritError::storage)?;

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = table.get(id.to_hex().as_str()).map_err(MeritError::storage)? {
                let detail = decode(data.value())?;
                if detail.is_live() {
                    found.push(detail);
                }
            }
        }
        Ok(found)
    }

    fn update_content(
        &self,
        id: DetailId,
        content: &AchievementContent,
        at: DateTime<Utc>,
    ) -> Result<Option<Detail>, MeritError> {
        self.modify(id, |detail| detail.overwrite(content, at))
    }

    fn soft_delete(&self, id: DetailId, at: DateTime<Utc>) -> Result<bool, MeritError> {
        let marked = self.modify(id, |detail| {
            detail.deleted_at = Some(at);
            detail.updated_at = at;
        })?;
        if marked.is_some() {
            return Ok(true);
        }
        // Already soft-deleted documents count as marked.
        Ok(self.get(id)?.is_some())
    }

    fn remove(&self, id: DetailId) -> Result<bool, MeritError> {
        let write_txn = self.db.begin_write().map_err(MeritError::storage)?;
        let removed = {
            let mut table = write_txn.open_table(DETAILS).map_err(MeritError::storage)?;
            table
                .remove(id.to_hex().as_str())
                .map_err(MeritError::storage)?
                .is_some()
        };
        write_txn.commit().map_err(MeritError::storage)?;
        Ok(removed)
    }

    fn push_attachment(
        &self,
        id: DetailId,
        attachment: Attachment,
    ) -> Result<Option<Detail>, MeritError> {
        self.modify(id, |detail| {
            detail.updated_at = attachment.uploaded_at;
            detail.attachments.push(attachment);
        })
    }

    fn scan(&self) -> Result<Vec<Detail>, MeritError> {
        let read_txn = self.db.begin_read().map_err(MeritError::storage)?;
        let table = read_txn.open_table(DETAILS).map_err(MeritError::storage)?;

        let mut all = Vec::new();
        for entry in table.iter().map_err(MeritError::storage)? {
            let (_, data) = entry.map_err(MeritError::storage)?;
            all.push(decode(data.value())?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StudentId;
    use serde_json::json;

    fn new_detail() -> NewDetail {
        NewDetail {
            student_id: StudentId::new("S-01"),
            content: AchievementContent {
                achievement_type: "competition".to_string(),
                title: "Regional Debate".to_string(),
                description: "Finalist".to_string(),
                details: json!({"competitionLevel": "regional", "rank": 3}),
                tags: ["debate".to_string()].into(),
                points: 40,
            },
            created_at: Utc::now(),
        }
    }

    fn store() -> (tempfile::TempDir, RedbDetailStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbDetailStore::open(dir.path().join("details.redb")).expect("open");
        (dir, store)
    }

    #[test]
    fn schema_less_details_survive_storage() {
        let (_dir, store) = store();
        let detail = store.insert(new_detail()).expect("insert");
        let stored = store.get(detail.id).expect("get").expect("present");
        assert_eq!(stored.details["competitionLevel"], "regional");
        assert_eq!(stored, detail);
    }

    #[test]
    fn soft_deleted_documents_leave_batched_reads() {
        let (_dir, store) = store();
        let a = store.insert(new_detail()).expect("insert");
        let b = store.insert(new_detail()).expect("insert");
        assert!(store.soft_delete(a.id, Utc::now()).expect("soft delete"));
        assert!(store.soft_delete(a.id, Utc::now()).expect("idempotent"));

        let live = store.get_many(&[a.id, b.id]).expect("get_many");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, b.id);
        assert_eq!(store.scan().expect("scan").len(), 2);

        // soft-deleted documents no longer accept edits
        let content = new_detail().content;
        assert!(store
            .update_content(a.id, &content, Utc::now())
            .expect("update")
            .is_none());
    }

    #[test]
    fn missing_document_is_not_marked() {
        let (_dir, store) = store();
        assert!(!store.soft_delete(DetailId::generate(), Utc::now()).expect("soft delete"));
        assert!(!store.remove(DetailId::generate()).expect("remove"));
    }

    #[test]
    fn attachment_push_updates_timestamp() {
        let (_dir, store) = store();
        let detail = store.insert(new_detail()).expect("insert");
        let uploaded_at = detail.updated_at + chrono::Duration::seconds(5);
        let updated = store
            .push_attachment(
                detail.id,
                Attachment {
                    file_name: "certificate.pdf".to_string(),
                    url: "/uploads/certificate.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                    uploaded_at,
                },
            )
            .expect("push")
            .expect("live");
        assert_eq!(updated.attachments.len(), 1);
        assert_eq!(updated.updated_at, uploaded_at);
    }
}
