//! # Consistency Check
//!
//! Read-only reconciliation across the two stores. Finds what the saga and
//! the delete cascade can leave behind:
//!
//! - orphaned details: live documents no non-Deleted reference points at
//! - corrupt references: non-Deleted references whose pointer does not parse
//!   or resolves to no live document
//! - ownership mismatches: detail `student_id` differs from its reference's
//!
//! Nothing is repaired.

use crate::detail::DetailStore;
use crate::reference::ReferenceStore;
use crate::status::Status;
use crate::types::{DetailId, ReferenceId, StudentId};
use crate::MeritError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info};

/// Why a reference was reported as corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionKind {
    UnparsableDetailRef,
    MissingDetail,
    DeletedDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptReference {
    pub reference: ReferenceId,
    pub detail_ref: String,
    pub kind: CorruptionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnershipMismatch {
    pub reference: ReferenceId,
    pub detail: DetailId,
    pub reference_student: StudentId,
    pub detail_student: StudentId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub references_scanned: usize,
    pub details_scanned: usize,
    pub orphaned_details: Vec<DetailId>,
    pub corrupt_references: Vec<CorruptReference>,
    pub ownership_mismatches: Vec<OwnershipMismatch>,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphaned_details.is_empty()
            && self.corrupt_references.is_empty()
            && self.ownership_mismatches.is_empty()
    }
}

pub struct ConsistencyChecker<'a> {
    references: &'a dyn ReferenceStore,
    details: &'a dyn DetailStore,
}

impl<'a> ConsistencyChecker<'a> {
    #[must_use]
    pub fn new(references: &'a dyn ReferenceStore, details: &'a dyn DetailStore) -> Self {
        Self {
            references,
            details,
        }
    }

    pub fn run(&self) -> Result<ConsistencyReport, MeritError> {
        let references = self.references.scan()?;
        let details: BTreeMap<DetailId, _> = self
            .details
            .scan()?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        let mut report = ConsistencyReport {
            references_scanned: references.len(),
            details_scanned: details.len(),
            ..ConsistencyReport::default()
        };
        let mut claimed = BTreeSet::new();

        for reference in references.iter().filter(|r| r.status != Status::Deleted) {
            let id = match reference.detail_id() {
                Ok(id) => id,
                Err(e) => {
                    error!(reference = %reference.id, error = %e, "corrupt detail ref");
                    report.corrupt_references.push(CorruptReference {
                        reference: reference.id,
                        detail_ref: reference.detail_ref.clone(),
                        kind: CorruptionKind::UnparsableDetailRef,
                    });
                    continue;
                }
            };
            claimed.insert(id);

            let kind = match details.get(&id) {
                None => CorruptionKind::MissingDetail,
                Some(detail) if !detail.is_live() => CorruptionKind::DeletedDetail,
                Some(detail) => {
                    if detail.student_id != reference.student_id {
                        report.ownership_mismatches.push(OwnershipMismatch {
                            reference: reference.id,
                            detail: id,
                            reference_student: reference.student_id.clone(),
                            detail_student: detail.student_id.clone(),
                        });
                    }
                    continue;
                }
            };
            report.corrupt_references.push(CorruptReference {
                reference: reference.id,
                detail_ref: reference.detail_ref.clone(),
                kind,
            });
        }

        report.orphaned_details = details
            .values()
            .filter(|d| d.is_live() && !claimed.contains(&d.id))
            .map(|d| d.id)
            .collect();

        info!(
            references = report.references_scanned,
            details = report.details_scanned,
            orphans = report.orphaned_details.len(),
            corrupt = report.corrupt_references.len(),
            mismatches = report.ownership_mismatches.len(),
            "consistency check complete"
        );
        Ok(report)
    }
}
