//! # Reference Store
//!
//! The relational half of an achievement: the workflow row that owns the
//! status, the ownership link and the pointer to the detail document.
//!
//! ## Atomicity
//!
//! Every status change goes through `compare_and_set`, which checks a
//! `Guard` (expected status and, optionally, the owning student) and applies
//! the change as one atomic step. A guard that does not admit the current
//! row leaves the row untouched and reports `None`; the workflow then
//! re-reads to tell a lost race apart from a missing row.

use crate::MeritError;
use crate::status::Status;
use crate::types::{Reference, ReferenceId, StatusChange, StudentId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// QUERY CONSTRAINT
// =============================================================================

/// Which students' references a query may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentScope {
    All,
    Only(StudentId),
    AnyOf(BTreeSet<StudentId>),
}

/// Filter applied by `ReferenceStore::query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConstraint {
    pub students: StudentScope,
    pub excluded: BTreeSet<Status>,
}

impl QueryConstraint {
    #[must_use]
    pub fn everything() -> Self {
        Self {
            students: StudentScope::All,
            excluded: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn owned_by(student: StudentId) -> Self {
        Self {
            students: StudentScope::Only(student),
            excluded: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn any_of(students: BTreeSet<StudentId>) -> Self {
        Self {
            students: StudentScope::AnyOf(students),
            excluded: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn excluding(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.excluded.extend(statuses);
        self
    }

    /// True when no reference can match (an advisor with no advisees).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(&self.students, StudentScope::AnyOf(set) if set.is_empty())
    }

    #[must_use]
    pub fn matches(&self, reference: &Reference) -> bool {
        if self.excluded.contains(&reference.status) {
            return false;
        }
        match &self.students {
            StudentScope::All => true,
            StudentScope::Only(student) => reference.student_id == *student,
            StudentScope::AnyOf(students) => students.contains(&reference.student_id),
        }
    }
}

/// Order query results by `(created_at, id)`.
pub fn sort_references(references: &mut [Reference]) {
    references.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

// =============================================================================
// GUARD
// =============================================================================

/// Precondition checked atomically by `compare_and_set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub expected: Status,
    pub student: Option<StudentId>,
}

impl Guard {
    #[must_use]
    pub fn status(expected: Status) -> Self {
        Self {
            expected,
            student: None,
        }
    }

    #[must_use]
    pub fn owned_by(mut self, student: StudentId) -> Self {
        self.student = Some(student);
        self
    }

    #[must_use]
    pub fn admits(&self, reference: &Reference) -> bool {
        reference.status == self.expected
            && self
                .student
                .as_ref()
                .is_none_or(|student| reference.student_id == *student)
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Persistence for reference rows.
///
/// Implementations must be safe to share across threads; every method takes
/// `&self` and does its own locking.
pub trait ReferenceStore: Send + Sync {
    /// Insert a new row. `Conflict` if the id or the detail reference is
    /// already taken.
    fn insert(&self, reference: Reference) -> Result<(), MeritError>;

    fn get(&self, id: ReferenceId) -> Result<Option<Reference>, MeritError>;

    /// Apply `change` if `guard` admits the current row.
    ///
    /// Returns the updated row, or `None` when the row is missing or the
    /// guard rejected it.
    fn compare_and_set(
        &self,
        id: ReferenceId,
        guard: &Guard,
        change: &StatusChange,
    ) -> Result<Option<Reference>, MeritError>;

    /// Rows matching `constraint`, ordered by `(created_at, id)`.
    fn query(&self, constraint: &QueryConstraint) -> Result<Vec<Reference>, MeritError>;

    /// Every row, in query order.
    fn scan(&self) -> Result<Vec<Reference>, MeritError> {
        self.query(&QueryConstraint::everything())
    }
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

#[derive(Debug, Default)]
struct MemoryReferences {
    rows: BTreeMap<ReferenceId, Reference>,
    detail_refs: BTreeSet<String>,
}

/// A `ReferenceStore` held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryReferenceStore {
    inner: RwLock<MemoryReferences>,
}

impl MemoryReferenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReferenceStore for MemoryReferenceStore {
    fn insert(&self, reference: Reference) -> Result<(), MeritError> {
        let mut inner = self.inner.write();
        if inner.rows.contains_key(&reference.id) {
            return Err(MeritError::Conflict(format!(
                "reference {} already exists",
                reference.id
            )));
        }
        if inner.detail_refs.contains(&reference.detail_ref) {
            return Err(MeritError::Conflict(format!(
                "detail {} is already referenced",
                reference.detail_ref
            )));
        }
        inner.detail_refs.insert(reference.detail_ref.clone());
        inner.rows.insert(reference.id, reference);
        Ok(())
    }

    fn get(&self, id: ReferenceId) -> Result<Option<Reference>, MeritError> {
        Ok(self.inner.read().rows.get(&id).cloned())
    }

    fn compare_and_set(
        &self,
        id: ReferenceId,
        guard: &Guard,
        change: &StatusChange,
    ) -> Result<Option<Reference>, MeritError> {
        let mut inner = self.inner.write();
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if !guard.admits(row) {
            return Ok(None);
        }
        row.apply(change);
        Ok(Some(row.clone()))
    }

    fn query(&self, constraint: &QueryConstraint) -> Result<Vec<Reference>, MeritError> {
        if constraint.is_empty() {
            return Ok(Vec::new());
        }
        let mut found: Vec<Reference> = self
            .inner
            .read()
            .rows
            .values()
            .filter(|r| constraint.matches(r))
            .cloned()
            .collect();
        sort_references(&mut found);
        Ok(found)
    }
}

// =============================================================================
// TESTS
// =============================================================================
