//! # Primitives
//!
//! Hardcoded limits and defaults for the merit CORE.
//!
//! These are compiled into the binary and are immutable at runtime.
//! Validation happens at the workflow boundary, before either store is
//! touched, so a rejected input never produces a half-written record.

// =============================================================================
// CONTENT LIMITS
// =============================================================================

/// Maximum length (in characters) of an achievement title, after trimming.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of an achievement type label.
pub const MAX_TYPE_LENGTH: usize = 64;

/// Maximum length of the free-text description.
pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;

/// Maximum number of distinct tags on one achievement.
pub const MAX_TAGS: usize = 32;

/// Maximum length of a single tag.
pub const MAX_TAG_LENGTH: usize = 64;

/// Maximum serialized size of the schema-less `details` object (64 KiB).
pub const MAX_DETAILS_BYTES: usize = 65_536;

/// Upper bound for the points awarded to one achievement.
pub const MAX_POINTS: u32 = 10_000;

/// Maximum length of an advisor's rejection note, after trimming.
pub const MAX_NOTE_LENGTH: usize = 2_000;

// =============================================================================
// ATTACHMENT LIMITS
// =============================================================================

/// Maximum length of an attachment's original file name.
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Maximum length of an attachment URL.
pub const MAX_URL_LENGTH: usize = 2_048;

/// Maximum length of an attachment MIME type.
pub const MAX_MIME_LENGTH: usize = 127;

/// Accepted URL prefixes for attachment locations.
///
/// `/` admits server-relative paths handed out by the upload collaborator.
pub const ATTACHMENT_URL_PREFIXES: [&str; 3] = ["https://", "http://", "/"];

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Length in bytes of a detail identifier (4-byte timestamp + 8 random bytes).
pub const DETAIL_ID_BYTES: usize = 12;

/// Length of the hex rendering of a detail identifier.
pub const DETAIL_ID_HEX_LENGTH: usize = DETAIL_ID_BYTES * 2;

/// Details key used to bucket statistics by competition level.
pub const COMPETITION_LEVEL_KEY: &str = "competitionLevel";

/// Bucket name for achievements that carry no competition level.
pub const UNSPECIFIED_LEVEL: &str = "unspecified";

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Default budget for read operations against either store, in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// Default budget for create/update operations, in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
