//! Configuration surface the core takes from the outside (`spec.md` §6
//! `parse_config()`, `SPEC_FULL.md` §"configuration").

use std::path::PathBuf;

/// Persistence policy for a [`crate::db::Database`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory persisted files live in.
    pub db_path: PathBuf,
    /// Whether [`crate::db::Database::persist`] writes anything at all.
    pub persist: bool,
    /// Whether [`crate::db::Database::restore`] reads an existing `db_path`.
    pub restore: bool,
    /// If `Some(n)`, restore only the `n` most recent persisted dates and
    /// drop anything older (`spec.md` §3 "Lifecycle").
    pub keep_last: Option<usize>,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            persist: true,
            restore: true,
            keep_last: None,
        }
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    pub fn with_keep_last(mut self, keep_last: Option<usize>) -> Self {
        self.keep_last = keep_last;
        self
    }
}
