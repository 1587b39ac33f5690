//! # Persistent Storage
//!
//! redb-backed implementations of the two store traits.
//!
//! The reference rows and the detail documents live in two separate
//! database files. Each file is its own redb `Database` with its own
//! single-writer lock, so no transaction can ever span both halves of an
//! achievement; consistency between them is the workflow's responsibility.

mod redb_details;
mod redb_references;

pub use redb_details::RedbDetailStore;
pub use redb_references::RedbReferenceStore;

use crate::MeritError;
use std::path::Path;

/// File name of the reference database inside a data directory.
pub const REFERENCES_FILE: &str = "references.redb";

/// File name of the detail database inside a data directory.
pub const DETAILS_FILE: &str = "details.redb";

/// Open (or create) both stores inside `dir`.
pub fn open_data_dir(
    dir: impl AsRef<Path>,
) -> Result<(RedbReferenceStore, RedbDetailStore), MeritError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(MeritError::storage)?;
    let references = RedbReferenceStore::open(dir.join(REFERENCES_FILE))?;
    let details = RedbDetailStore::open(dir.join(DETAILS_FILE))?;
    Ok((references, details))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_gets_two_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        let _stores = open_data_dir(&nested).expect("open");
        assert!(nested.join(REFERENCES_FILE).exists());
        assert!(nested.join(DETAILS_FILE).exists());
    }
}
