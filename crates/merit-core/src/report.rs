//! # Reports
//!
//! Aggregates over the achievements a caller can see. Statistics reuse the
//! visibility policies, so an advisor's numbers never include drafts.

use crate::identity::Role;
use crate::primitives::{COMPETITION_LEVEL_KEY, UNSPECIFIED_LEVEL};
use crate::reference::QueryConstraint;
use crate::status::Status;
use crate::types::{Achievement, StudentId};
use crate::workflow::AchievementWorkflow;
use crate::{Identity, MeritError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts over a set of achievements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub total_points: u64,
    pub by_status: BTreeMap<Status, usize>,
    pub by_type: BTreeMap<String, usize>,
    /// achievement type -> competition level -> count
    pub by_type_and_level: BTreeMap<String, BTreeMap<String, usize>>,
}

impl Statistics {
    #[must_use]
    pub fn collect(achievements: &[Achievement]) -> Self {
        let mut stats = Self::default();
        for achievement in achievements {
            let detail = &achievement.detail;
            stats.total += 1;
            stats.total_points += u64::from(detail.points);
            *stats
                .by_status
                .entry(achievement.reference.status)
                .or_default() += 1;
            *stats
                .by_type
                .entry(detail.achievement_type.clone())
                .or_default() += 1;
            *stats
                .by_type_and_level
                .entry(detail.achievement_type.clone())
                .or_default()
                .entry(competition_level(&detail.details))
                .or_default() += 1;
        }
        stats
    }
}

/// The `competitionLevel` entry of a details object, if it is a
/// non-empty string.
fn competition_level(details: &serde_json::Value) -> String {
    details
        .get(COMPETITION_LEVEL_KEY)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(UNSPECIFIED_LEVEL)
        .to_string()
}

/// One student's achievements with their statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentReport {
    pub student_id: StudentId,
    pub statistics: Statistics,
    pub achievements: Vec<Achievement>,
}

impl AchievementWorkflow {
    /// Statistics over everything visible to the caller.
    pub fn statistics(&self, identity: &Identity) -> Result<Statistics, MeritError> {
        let achievements = self.list(identity)?;
        Ok(Statistics::collect(&achievements))
    }

    /// Report on one student's non-deleted achievements.
    ///
    /// Admins may ask about anyone, advisors about their advisees (without
    /// drafts), students only about themselves.
    pub fn student_report(
        &self,
        identity: &Identity,
        student: &StudentId,
    ) -> Result<StudentReport, MeritError> {
        let mut constraint = QueryConstraint::owned_by(student.clone()).excluding([Status::Deleted]);
        match &identity.role {
            Role::Admin => {}
            Role::Student => {
                if self.visibility().student_of(identity)? != *student {
                    return Err(MeritError::Forbidden(
                        "students may only view their own report".to_string(),
                    ));
                }
            }
            Role::Advisor => {
                let lecturer = self.visibility().lecturer_of(identity)?;
                if !self.visibility().directory().advisees(&lecturer)?.contains(student) {
                    return Err(MeritError::Forbidden(format!(
                        "student {} is not advised by {}",
                        student, lecturer
                    )));
                }
                constraint = constraint.excluding([Status::Draft]);
            }
            Role::Other(name) => {
                return Err(MeritError::Forbidden(format!(
                    "role '{}' may not view reports",
                    name
                )));
            }
        }

        let references = self.references().query(&constraint)?;
        let achievements = self.merge_engine().merge(references)?;
        Ok(StudentReport {
            student_id: student.clone(),
            statistics: Statistics::collect(&achievements),
            achievements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detail, DetailId, Reference};
    use chrono::Utc;
    use serde_json::json;

    fn achievement(kind: &str, details: serde_json::Value, points: u32, status: Status) -> Achievement {
        let now = Utc::now();
        let id = DetailId::generate();
        let mut reference = Reference::draft(StudentId::new("S-01"), id, now);
        reference.status = status;
        Achievement {
            reference,
            detail: Detail {
                id,
                student_id: StudentId::new("S-01"),
                achievement_type: kind.to_string(),
                title: "t".to_string(),
                description: String::new(),
                details,
                tags: Default::default(),
                points,
                attachments: Vec::new(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        }
    }

    #[test]
    fn groups_by_type_and_level() {
        let stats = Statistics::collect(&[
            achievement("competition", json!({"competitionLevel": "national"}), 50, Status::Verified),
            achievement("competition", json!({"competitionLevel": "national"}), 30, Status::Submitted),
            achievement("competition", json!({}), 10, Status::Draft),
            achievement("publication", json!({"competitionLevel": 3}), 20, Status::Verified),
        ]);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.total_points, 110);
        assert_eq!(stats.by_status.get(&Status::Verified), Some(&2));
        assert_eq!(stats.by_type.get("competition"), Some(&3));
        let competition = &stats.by_type_and_level["competition"];
        assert_eq!(competition.get("national"), Some(&2));
        assert_eq!(competition.get(UNSPECIFIED_LEVEL), Some(&1));
        // non-string levels are treated as unspecified
        assert_eq!(
            stats.by_type_and_level["publication"].get(UNSPECIFIED_LEVEL),
            Some(&1)
        );
    }

    #[test]
    fn empty_set_has_zero_totals() {
        assert_eq!(Statistics::collect(&[]), Statistics::default());
    }
}
