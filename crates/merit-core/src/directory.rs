//! # Directory
//!
//! Lookups into the user/student/lecturer directory. The directory itself is
//! managed elsewhere; the core only resolves identities through it.

use crate::types::{LecturerId, StudentId, UserId};
use crate::MeritError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identity resolution consumed by visibility and ownership checks.
pub trait Directory: Send + Sync {
    /// Student profile owned by `user`, if any.
    fn student_for_user(&self, user: &UserId) -> Result<Option<StudentId>, MeritError>;

    /// Lecturer profile owned by `user`, if any.
    fn lecturer_for_user(&self, user: &UserId) -> Result<Option<LecturerId>, MeritError>;

    /// Students assigned to `lecturer`. Possibly empty.
    fn advisees(&self, lecturer: &LecturerId) -> Result<BTreeSet<StudentId>, MeritError>;
}

/// One student entry in a directory seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentEntry {
    pub id: StudentId,
    pub user_id: UserId,
    #[serde(default)]
    pub advisor: Option<LecturerId>,
}

/// One lecturer entry in a directory seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturerEntry {
    pub id: LecturerId,
    pub user_id: UserId,
}

/// Serializable directory contents.
///
/// ```toml
/// [[lecturers]]
/// id = "L-01"
/// user_id = "u-lecturer"
///
/// [[students]]
/// id = "S-01"
/// user_id = "u-student"
/// advisor = "L-01"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    #[serde(default)]
    pub lecturers: Vec<LecturerEntry>,
}

/// An immutable in-memory directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    students_by_user: BTreeMap<UserId, StudentId>,
    lecturers_by_user: BTreeMap<UserId, LecturerId>,
    advisees: BTreeMap<LecturerId, BTreeSet<StudentId>>,
}

impl MemoryDirectory {
    /// Build the directory. A user may hold at most one student and one
    /// lecturer profile; duplicates are `Conflict`.
    pub fn from_seed(seed: DirectorySeed) -> Result<Self, MeritError> {
        let mut directory = Self::default();

        for lecturer in seed.lecturers {
            if directory
                .lecturers_by_user
                .insert(lecturer.user_id.clone(), lecturer.id.clone())
                .is_some()
            {
                return Err(MeritError::Conflict(format!(
                    "user {} has more than one lecturer profile",
                    lecturer.user_id
                )));
            }
            directory.advisees.entry(lecturer.id).or_default();
        }

        for student in seed.students {
            if directory
                .students_by_user
                .insert(student.user_id.clone(), student.id.clone())
                .is_some()
            {
                return Err(MeritError::Conflict(format!(
                    "user {} has more than one student profile",
                    student.user_id
                )));
            }
            if let Some(advisor) = student.advisor {
                directory.advisees.entry(advisor).or_default().insert(student.id);
            }
        }

        Ok(directory)
    }
}

impl Directory for MemoryDirectory {
    fn student_for_user(&self, user: &UserId) -> Result<Option<StudentId>, MeritError> {
        Ok(self.students_by_user.get(user).cloned())
    }

    fn lecturer_for_user(&self, user: &UserId) -> Result<Option<LecturerId>, MeritError> {
        Ok(self.lecturers_by_user.get(user).cloned())
    }

    fn advisees(&self, lecturer: &LecturerId) -> Result<BTreeSet<StudentId>, MeritError> {
        Ok(self.advisees.get(lecturer).cloned().unwrap_or_default())
    }
}
