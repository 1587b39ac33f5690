//! # Merge Engine
//!
//! Joins an ordered list of references with their detail documents.
//!
//! One batched fetch, one map from detail id to document, then a single pass
//! over the references in their original order. References whose document is
//! missing (or soft-deleted) are dropped; references whose `detail_ref` does
//! not parse are logged as corrupt and dropped. Neither fails the listing.

use crate::detail::DetailStore;
use crate::types::{Achievement, Detail, DetailId, Reference};
use crate::MeritError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct MergeEngine {
    details: Arc<dyn DetailStore>,
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine").finish_non_exhaustive()
    }
}

impl MergeEngine {
    #[must_use]
    pub fn new(details: Arc<dyn DetailStore>) -> Self {
        Self { details }
    }

    /// Merge `references` with their details, preserving reference order.
    pub fn merge(&self, references: Vec<Reference>) -> Result<Vec<Achievement>, MeritError> {
        let resolved = resolve_detail_ids(references);
        let ids: Vec<DetailId> = resolved.iter().map(|(_, id)| *id).collect();
        let details = self.details.get_many(&ids)?;
        Ok(join(resolved, details))
    }
}

/// Pure join over already-fetched documents.
///
/// Output length never exceeds `references.len()` and follows reference
/// order regardless of the order of `details`.
#[must_use]
pub fn merge_records(references: Vec<Reference>, details: Vec<Detail>) -> Vec<Achievement> {
    join(resolve_detail_ids(references), details)
}

fn resolve_detail_ids(references: Vec<Reference>) -> Vec<(Reference, DetailId)> {
    let mut resolved = Vec::with_capacity(references.len());
    for reference in references {
        match reference.detail_id() {
            Ok(id) => resolved.push((reference, id)),
            Err(e) => {
                error!(reference = %reference.id, error = %e, "dropping reference with corrupt detail ref");
            }
        }
    }
    resolved
}

fn join(resolved: Vec<(Reference, DetailId)>, details: Vec<Detail>) -> Vec<Achievement> {
    let by_id: BTreeMap<DetailId, Detail> = details.into_iter().map(|d| (d.id, d)).collect();

    resolved
        .into_iter()
        .filter_map(|(reference, id)| match by_id.get(&id) {
            Some(detail) => Some(Achievement {
                reference,
                detail: detail.clone(),
            }),
            None => {
                warn!(reference = %reference.id, detail = %id, "reference has no live detail; omitted");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::MemoryDetailStore;
    use crate::types::{AchievementContent, NewDetail, StudentId};
    use chrono::{Duration, Utc};

    fn content(title: &str) -> AchievementContent {
        AchievementContent {
            achievement_type: "competition".to_string(),
            title: title.to_string(),
            description: String::new(),
            details: serde_json::json!({}),
            tags: Default::default(),
            points: 5,
        }
    }

    #[test]
    fn output_follows_reference_order_and_drops_orphans() {
        let store = Arc::new(MemoryDetailStore::new());
        let base = Utc::now();
        let mut references = Vec::new();
        for (i, title) in ["a", "b", "c"].into_iter().enumerate() {
            let detail = store
                .insert(NewDetail {
                    student_id: StudentId::new("S-01"),
                    content: content(title),
                    created_at: base,
                })
                .expect("insert");
            references.push(Reference::draft(
                StudentId::new("S-01"),
                detail.id,
                base + Duration::seconds(i as i64),
            ));
        }
        // orphan the middle one
        let middle = references[1].detail_id().expect("valid");
        store.remove(middle).expect("remove");

        let engine = MergeEngine::new(store);
        let merged = engine.merge(references.clone()).expect("merge");
        let titles: Vec<_> = merged.iter().map(|a| a.detail.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
        assert_eq!(merged[0].reference.id, references[0].id);
        assert_eq!(merged[1].reference.id, references[2].id);
    }

    #[test]
    fn corrupt_reference_is_dropped_not_fatal() {
        let store = Arc::new(MemoryDetailStore::new());
        let detail = store
            .insert(NewDetail {
                student_id: StudentId::new("S-01"),
                content: content("kept"),
                created_at: Utc::now(),
            })
            .expect("insert");
        let good = Reference::draft(StudentId::new("S-01"), detail.id, Utc::now());
        let mut bad = Reference::draft(StudentId::new("S-01"), detail.id, Utc::now());
        bad.detail_ref = "not-a-document-id".to_string();

        let merged = MergeEngine::new(store)
            .merge(vec![bad, good.clone()])
            .expect("merge");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].reference, good);
    }

    #[test]
    fn empty_input_merges_to_empty() {
        assert!(merge_records(Vec::new(), Vec::new()).is_empty());
    }
}
