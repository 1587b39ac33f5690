//! # Core Type Definitions
//!
//! This module contains all core types for the merit lifecycle engine:
//! - Identifiers (`ReferenceId`, `DetailId`, `StudentId`, `LecturerId`, `UserId`)
//! - The two halves of an achievement (`Reference`, `Detail`) and their
//!   merged view (`Achievement`)
//! - Caller-supplied input (`AchievementContent`, `AttachmentMeta`)
//! - Error types (`MeritError`) and the outcome taxonomy (`Outcome`)
//!
//! ## Split Records
//!
//! A `Reference` is the authoritative workflow row; a `Detail` is the mutable
//! content document. They are linked only by `Reference::detail_ref`, an
//! opaque string that must parse into a `DetailId`. Nothing in this module
//! keeps the two in sync; that is the workflow's job.

use crate::primitives::{
    ATTACHMENT_URL_PREFIXES, DETAIL_ID_BYTES, DETAIL_ID_HEX_LENGTH, MAX_DESCRIPTION_LENGTH,
    MAX_DETAILS_BYTES, MAX_FILE_NAME_LENGTH, MAX_MIME_LENGTH, MAX_NOTE_LENGTH, MAX_POINTS,
    MAX_TAG_LENGTH, MAX_TAGS, MAX_TITLE_LENGTH, MAX_TYPE_LENGTH, MAX_URL_LENGTH,
};
use crate::status::{Action, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Caller-visible identifier of an achievement (the reference row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(pub Uuid);

impl ReferenceId {
    /// Allocate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a caller-supplied identifier.
    pub fn parse(s: &str) -> Result<Self, MeritError> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| MeritError::validation("id", e.to_string()))
    }

    /// Integer form used as a storage key.
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0.as_u128()
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Identifier of a detail document.
///
/// 12 bytes: a big-endian unix-seconds prefix followed by 8 random bytes,
/// rendered as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DetailId([u8; DETAIL_ID_BYTES]);

impl DetailId {
    /// Allocate a fresh identifier stamped with the current time.
    #[must_use]
    pub fn generate() -> Self {
        let seconds = Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        let entropy = Uuid::new_v4();
        let random = entropy.as_bytes();

        let mut bytes = [0u8; DETAIL_ID_BYTES];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        // Bytes 6 and 8 of a v4 UUID carry version/variant bits; skip them.
        bytes[4..10].copy_from_slice(&random[..6]);
        bytes[10..].copy_from_slice(&random[14..]);
        Self(bytes)
    }

    /// Parse a stored detail reference.
    ///
    /// A reference that does not parse is a data-integrity failure, never a
    /// caller mistake, so the error is `Corrupt`.
    pub fn parse(s: &str) -> Result<Self, MeritError> {
        if s.len() != DETAIL_ID_HEX_LENGTH {
            return Err(MeritError::Corrupt(format!(
                "detail reference '{}' has length {}, expected {}",
                s,
                s.len(),
                DETAIL_ID_HEX_LENGTH
            )));
        }
        let mut bytes = [0u8; DETAIL_ID_BYTES];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| {
            MeritError::Corrupt(format!("detail reference '{}' is not hex: {}", s, e))
        })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DetailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for DetailId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DetailId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a student profile in the directory.
    StudentId
);
string_id!(
    /// Identifier of a lecturer (advisor) profile in the directory.
    LecturerId
);
string_id!(
    /// Identifier of an authenticated user account.
    UserId
);

// =============================================================================
// REFERENCE (workflow half)
// =============================================================================

/// The authoritative workflow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub student_id: StudentId,
    /// Opaque pointer into the detail store. Immutable once set.
    pub detail_ref: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<LecturerId>,
    pub rejection_note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Reference {
    /// A fresh Draft reference pointing at `detail`.
    #[must_use]
    pub fn draft(student_id: StudentId, detail: DetailId, now: DateTime<Utc>) -> Self {
        Self {
            id: ReferenceId::generate(),
            student_id,
            detail_ref: detail.to_hex(),
            status: Status::Draft,
            created_at: now,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
            updated_at: now,
        }
    }

    /// Resolve `detail_ref` into a detail identifier.
    pub fn detail_id(&self) -> Result<DetailId, MeritError> {
        DetailId::parse(&self.detail_ref)
    }

    /// Apply a status change in place.
    ///
    /// Stores call this inside their compare-and-set, after the guard has
    /// admitted the current row.
    pub fn apply(&mut self, change: &StatusChange) {
        match change.to {
            Status::Submitted => {
                self.submitted_at = Some(change.at);
                self.verified_at = None;
                self.verified_by = None;
                self.rejection_note = None;
            }
            Status::Verified => {
                self.verified_at = Some(change.at);
                self.verified_by = change.verifier.clone();
            }
            Status::Rejected => {
                self.verified_at = Some(change.at);
                self.verified_by = change.verifier.clone();
                self.rejection_note = change.note.clone();
            }
            Status::Draft | Status::Deleted => {}
        }
        self.status = change.to;
        self.updated_at = change.at;
    }
}

/// A decided transition, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub action: Action,
    pub to: Status,
    pub at: DateTime<Utc>,
    pub verifier: Option<LecturerId>,
    pub note: Option<String>,
}

// =============================================================================
// DETAIL (document half)
// =============================================================================

/// Attachment metadata persisted on a detail document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub url: String,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// The mutable content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    pub id: DetailId,
    /// Denormalized; must equal the owning reference's student id.
    pub student_id: StudentId,
    pub achievement_type: String,
    pub title: String,
    pub description: String,
    pub details: serde_json::Value,
    pub tags: BTreeSet<String>,
    pub points: u32,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Detail {
    /// Materialize a new document from validated content.
    #[must_use]
    pub fn from_new(id: DetailId, new: NewDetail) -> Self {
        let NewDetail {
            student_id,
            content,
            created_at,
        } = new;
        Self {
            id,
            student_id,
            achievement_type: content.achievement_type,
            title: content.title,
            description: content.description,
            details: content.details,
            tags: content.tags,
            points: content.points,
            attachments: Vec::new(),
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    /// Overwrite the mutable content fields. Attachments are untouched.
    pub fn overwrite(&mut self, content: &AchievementContent, at: DateTime<Utc>) {
        self.achievement_type.clone_from(&content.achievement_type);
        self.title.clone_from(&content.title);
        self.description.clone_from(&content.description);
        self.details.clone_from(&content.details);
        self.tags.clone_from(&content.tags);
        self.points = content.points;
        self.updated_at = at;
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Input to `DetailStore::insert`; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetail {
    pub student_id: StudentId,
    pub content: AchievementContent,
    pub created_at: DateTime<Utc>,
}

/// A reference joined with its detail document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievement {
    pub reference: Reference,
    pub detail: Detail,
}

// =============================================================================
// CALLER INPUT
// =============================================================================

/// Editable achievement content as supplied by the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementContent {
    #[serde(alias = "achievement_type")]
    pub achievement_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub points: u32,
}

impl AchievementContent {
    /// Check limits and normalize whitespace.
    ///
    /// Returns the normalized content; `null` details become `{}`.
    pub fn validate(self) -> Result<Self, MeritError> {
        let achievement_type = self.achievement_type.trim().to_string();
        if achievement_type.is_empty() {
            return Err(MeritError::validation("achievementType", "must not be empty"));
        }
        if achievement_type.chars().count() > MAX_TYPE_LENGTH {
            return Err(MeritError::validation(
                "achievementType",
                format!("exceeds {} characters", MAX_TYPE_LENGTH),
            ));
        }

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(MeritError::validation("title", "must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(MeritError::validation(
                "title",
                format!("exceeds {} characters", MAX_TITLE_LENGTH),
            ));
        }

        if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(MeritError::validation(
                "description",
                format!("exceeds {} characters", MAX_DESCRIPTION_LENGTH),
            ));
        }

        let details = match self.details {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            object @ serde_json::Value::Object(_) => object,
            _ => return Err(MeritError::validation("details", "must be a JSON object")),
        };
        let details_size = serde_json::to_vec(&details)
            .map_err(|e| MeritError::validation("details", e.to_string()))?
            .len();
        if details_size > MAX_DETAILS_BYTES {
            return Err(MeritError::validation(
                "details",
                format!("serialized size {} exceeds {} bytes", details_size, MAX_DETAILS_BYTES),
            ));
        }

        let mut tags = BTreeSet::new();
        for tag in self.tags {
            let tag = tag.trim().to_string();
            if tag.is_empty() || tag.chars().count() > MAX_TAG_LENGTH {
                return Err(MeritError::validation(
                    "tags",
                    format!("each tag must be 1..={} characters", MAX_TAG_LENGTH),
                ));
            }
            tags.insert(tag);
        }
        if tags.len() > MAX_TAGS {
            return Err(MeritError::validation(
                "tags",
                format!("at most {} tags allowed", MAX_TAGS),
            ));
        }

        if self.points > MAX_POINTS {
            return Err(MeritError::validation(
                "points",
                format!("must not exceed {}", MAX_POINTS),
            ));
        }

        Ok(Self {
            achievement_type,
            title,
            description: self.description,
            details,
            tags,
            points: self.points,
        })
    }
}

/// Attachment triple returned by the physical storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub file_name: String,
    pub url: String,
    pub mime_type: String,
}

impl AttachmentMeta {
    /// Validate the triple and stamp it with the upload time.
    pub fn into_attachment(self, uploaded_at: DateTime<Utc>) -> Result<Attachment, MeritError> {
        let file_name = self.file_name.trim().to_string();
        if file_name.is_empty() || file_name.chars().count() > MAX_FILE_NAME_LENGTH {
            return Err(MeritError::validation(
                "file_name",
                format!("must be 1..={} characters", MAX_FILE_NAME_LENGTH),
            ));
        }

        let url = self.url.trim().to_string();
        if url.is_empty() || url.len() > MAX_URL_LENGTH {
            return Err(MeritError::validation(
                "url",
                format!("must be 1..={} bytes", MAX_URL_LENGTH),
            ));
        }
        if !ATTACHMENT_URL_PREFIXES.iter().any(|p| url.starts_with(p)) {
            return Err(MeritError::validation(
                "url",
                "must be an http(s) URL or an absolute path",
            ));
        }

        let mime_type = self.mime_type.trim().to_ascii_lowercase();
        let well_formed = mime_type
            .split_once('/')
            .is_some_and(|(major, minor)| !major.is_empty() && !minor.is_empty());
        if !well_formed || mime_type.len() > MAX_MIME_LENGTH {
            return Err(MeritError::validation("mime_type", "expected 'type/subtype'"));
        }

        Ok(Attachment {
            file_name,
            url,
            mime_type,
            uploaded_at,
        })
    }
}

/// Validate an advisor's rejection note; returns the trimmed note.
pub fn validate_note(note: &str) -> Result<String, MeritError> {
    let note = note.trim();
    if note.is_empty() {
        return Err(MeritError::validation("rejection_note", "must not be empty"));
    }
    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(MeritError::validation(
            "rejection_note",
            format!("exceeds {} characters", MAX_NOTE_LENGTH),
        ));
    }
    Ok(note.to_string())
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the merit core.
///
/// - No silent failures
/// - Use `Result<T, MeritError>` for fallible operations
/// - Nothing here is retried automatically; callers decide
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeritError {
    /// Malformed input or a missing required field.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The caller is not the student who owns the achievement.
    #[error("Caller does not own this achievement")]
    NotOwner,

    /// The caller's role or profile does not permit the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The status precondition was violated, including lost races.
    #[error("Cannot {action} an achievement in status {status}")]
    InvalidState { status: Status, action: Action },

    /// The reference or its detail does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The write would break a uniqueness invariant.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored identifier is unparsable; indicates a data-integrity bug.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A store did not answer within its budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The store is unavailable or returned an error.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl MeritError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Wrap a store-level error.
    pub fn storage(e: impl fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }

    /// Collapse into the outcome set exposed to the transport layer.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Validation { .. } => Outcome::ValidationError,
            Self::NotOwner | Self::Forbidden(_) => Outcome::Forbidden,
            Self::InvalidState { .. } => Outcome::InvalidState,
            Self::NotFound(_) => Outcome::NotFound,
            Self::Conflict(_) => Outcome::Conflict,
            Self::Timeout(_) => Outcome::Timeout,
            Self::Corrupt(_) | Self::Storage(_) => Outcome::InternalFailure,
        }
    }

    /// The offending field, for validation failures.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Outcome classes a transport maps to its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Forbidden,
    NotFound,
    InvalidState,
    ValidationError,
    Conflict,
    Timeout,
    InternalFailure,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::ValidationError => "validation_error",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::InternalFailure => "internal_failure",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
