//! # redb-backed Reference Store
//!
//! Reference rows are postcard-encoded and keyed by the integer form of
//! their UUID. Two index tables keep student-scoped queries and the
//! detail-reference uniqueness check from scanning the whole table.
//!
//! redb serializes write transactions, so the read-check-write sequence in
//! `compare_and_set` is atomic with respect to every other writer.

use crate::reference::{Guard, QueryConstraint, ReferenceStore, StudentScope, sort_references};
use crate::types::{Reference, ReferenceId, StatusChange, StudentId};
use crate::MeritError;
use redb::{Database, ReadOnlyTable, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table for references: ReferenceId(u128) -> postcard-encoded Reference
const REFERENCES: TableDefinition<u128, &[u8]> = TableDefinition::new("references");

/// Student index: (student_id, reference id) -> ()
const BY_STUDENT: TableDefinition<(&str, u128), ()> = TableDefinition::new("by_student");

/// Detail index: detail_ref -> reference id
const BY_DETAIL: TableDefinition<&str, u128> = TableDefinition::new("by_detail");

pub struct RedbReferenceStore {
    db: Database,
}

impl std::fmt::Debug for RedbReferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbReferenceStore").finish_non_exhaustive()
    }
}

fn encode(reference: &Reference) -> Result<Vec<u8>, MeritError> {
    postcard::to_allocvec(reference).map_err(MeritError::storage)
}

fn decode(bytes: &[u8]) -> Result<Reference, MeritError> {
    postcard::from_bytes(bytes)
        .map_err(|e| MeritError::Corrupt(format!("undecodable reference row: {}", e)))
}

fn fetch(
    table: &ReadOnlyTable<u128, &'static [u8]>,
    id: u128,
) -> Result<Option<Reference>, MeritError> {
    match table.get(id).map_err(MeritError::storage)? {
        Some(data) => Ok(Some(decode(data.value())?)),
        None => Ok(None),
    }
}

impl RedbReferenceStore {
    /// Open or create a reference database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MeritError> {
        let db = Database::create(path.as_ref()).map_err(MeritError::storage)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(MeritError::storage)?;
            let _ = write_txn.open_table(REFERENCES).map_err(MeritError::storage)?;
            let _ = write_txn.open_table(BY_STUDENT).map_err(MeritError::storage)?;
            let _ = write_txn.open_table(BY_DETAIL).map_err(MeritError::storage)?;
            write_txn.commit().map_err(MeritError::storage)?;
        }

        Ok(Self { db })
    }

    fn student_ids(
        index: &ReadOnlyTable<(&'static str, u128), ()>,
        student: &StudentId,
        into: &mut Vec<u128>,
    ) -> Result<(), MeritError> {
        for entry in index
            .range((student.as_str(), 0u128)..=(student.as_str(), u128::MAX))
            .map_err(MeritError::storage)?
        {
            let (key, _) = entry.map_err(MeritError::storage)?;
            let (_student, id) = key.value();
            into.push(id);
        }
        Ok(())
    }
}

impl ReferenceStore for RedbReferenceStore {
    fn insert(&self, reference: Reference) -> Result<(), MeritError> {
        let bytes = encode(&reference)?;
        let id = reference.id.as_u128();

        let write_txn = self.db.begin_write().map_err(MeritError::storage)?;
        {
            let mut rows = write_txn.open_table(REFERENCES).map_err(MeritError::storage)?;
            let mut by_detail = write_txn.open_table(BY_DETAIL).map_err(MeritError::storage)?;
            let mut by_student = write_txn.open_table(BY_STUDENT).map_err(MeritError::storage)?;

            if rows.get(id).map_err(MeritError::storage)?.is_some() {
                return Err(MeritError::Conflict(format!(
                    "reference {} already exists",
                    reference.id
                )));
            }
            if by_detail
                .get(reference.detail_ref.as_str())
                .map_err(MeritError::storage)?
                .is_some()
            {
                return Err(MeritError::Conflict(format!(
                    "detail {} is already referenced",
                    reference.detail_ref
                )));
            }

            rows.insert(id, bytes.as_slice())
                .map_err(MeritError::storage)?;
            by_detail
                .insert(reference.detail_ref.as_str(), id)
                .map_err(MeritError::storage)?;
            by_student
                .insert((reference.student_id.as_str(), id), ())
                .map_err(MeritError::storage)?;
        }
        write_txn.commit().map_err(MeritError::storage)?;
        Ok(())
    }

    fn get(&self, id: ReferenceId) -> Result<Option<Reference>, MeritError> {
        let read_txn = self.db.begin_read().map_err(MeritError::storage)?;
        let rows = read_txn.open_table(REFERENCES).map_err(MeritError::storage)?;
        fetch(&rows, id.as_u128())
    }

    fn compare_and_set(
        &self,
        id: ReferenceId,
        guard: &Guard,
        change: &StatusChange,
    ) -> Result<Option<Reference>, MeritError> {
        let write_txn = self.db.begin_write().map_err(MeritError::storage)?;
        let updated = {
            let mut rows = write_txn.open_table(REFERENCES).map_err(MeritError::storage)?;
            let current = match rows.get(id.as_u128()).map_err(MeritError::storage)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            match current {
                Some(mut row) if guard.admits(&row) => {
                    row.apply(change);
                    let bytes = encode(&row)?;
                    rows.insert(id.as_u128(), bytes.as_slice())
                        .map_err(MeritError::storage)?;
                    Some(row)
                }
                _ => None,
            }
        };

        if updated.is_some() {
            write_txn.commit().map_err(MeritError::storage)?;
        } else {
            write_txn.abort().map_err(MeritError::storage)?;
        }
        Ok(updated)
    }

    fn query(&self, constraint: &QueryConstraint) -> Result<Vec<Reference>, MeritError> {
        if constraint.is_empty() {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read().map_err(MeritError::storage)?;
        let rows = read_txn.open_table(REFERENCES).map_err(MeritError::storage)?;

        let mut found = Vec::new();
        match &constraint.students {
            StudentScope::All => {
                for entry in rows.iter().map_err(MeritError::storage)? {
                    let (_, data) = entry.map_err(MeritError::storage)?;
                    let reference = decode(data.value())?;
                    if constraint.matches(&reference) {
                        found.push(reference);
                    }
                }
            }
            StudentScope::Only(student) => {
                let index = read_txn.open_table(BY_STUDENT).map_err(MeritError::storage)?;
                let mut ids = Vec::new();
                Self::student_ids(&index, student, &mut ids)?;
                collect_matching(&rows, &ids, constraint, &mut found)?;
            }
            StudentScope::AnyOf(students) => {
                let index = read_txn.open_table(BY_STUDENT).map_err(MeritError::storage)?;
                let mut ids = Vec::new();
                for student in students {
                    Self::student_ids(&index, student, &mut ids)?;
                }
                collect_matching(&rows, &ids, constraint, &mut found)?;
            }
        }

        sort_references(&mut found);
        Ok(found)
    }
}

fn collect_matching(
    rows: &ReadOnlyTable<u128, &'static [u8]>,
    ids: &[u128],
    constraint: &QueryConstraint,
    into: &mut Vec<Reference>,
) -> Result<(), MeritError> {
    for id in ids {
        if let Some(reference) = fetch(rows, *id)?.filter(|r| constraint.matches(r)) {
            into.push(reference);
        }
    }
    Ok(())
}
