//! Result types at the store's boundary.
//!
//! `spec.md` §6 describes the C-side contract as "a typed result (variant
//! {Inserted, Present, Error}) or a success/failure integer". The integer
//! encoding doesn't belong in a Rust API; `InsertOutcome` is the typed half,
//! and file-level failures use plain `std::io::Error` the way
//! `storage/chunk.rs` does (`io::Error::other(..)`) rather than a dedicated
//! `thiserror` enum — every failure here really is "a file couldn't be
//! read or written".

use std::fmt;

/// Outcome of inserting into a [`crate::table::Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was absent and is now present with the given value.
    Inserted,
    /// The key was already present; the table is unchanged.
    AlreadyPresent,
}

impl InsertOutcome {
    pub fn is_fresh(self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// Errors surfaced by directory-level persistence operations
/// ([`crate::db::Database::persist`], [`crate::db::Database::restore`]).
///
/// Per-file corruption (§7 item 4) does not produce this error: it is
/// logged and the affected table is loaded empty so that the rest of the
/// directory still restores.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    /// The file's magic bytes didn't match `"tpl"`.
    BadMagic,
    /// The file's format string didn't match what this metric expects.
    FormatMismatch { expected: &'static str, found: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "{e}"),
            StoreError::BadMagic => write!(f, "bad tpl magic"),
            StoreError::FormatMismatch { expected, found } => {
                write!(f, "format mismatch: expected {expected:?}, found {found:?}")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<StoreError> for std::io::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => e,
            other => std::io::Error::other(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
