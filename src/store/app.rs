//! The process-wide application table (`AppDB`, `spec.md` §3): metrics that
//! are neither per-date nor per-module.

use crate::ids::Sequences;
use crate::table::Table;

/// A resume checkpoint for one log source (`spec.md` §3 `LAST_PARSE`,
/// `SPEC_FULL.md` §4.5, grammar `A(US(uIUvc#READ_BYTES))`). `line` is the
/// last fully-processed line number; `ts` is the log source's last-modified
/// time at that point; `size` is the file's byte length; `pos` is the byte
/// offset `snippet` was read from; `snippet` is the first bytes of that
/// line, used to detect truncation/rotation between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastParse {
    pub line: u32,
    pub ts: i64,
    pub size: u64,
    pub pos: u16,
    pub snippet: [u8; 20],
}

/// Process-wide, undated tables (`spec.md` §4.2's eight app metrics, minus
/// `DATES`, which [`crate::db::Database`] owns directly since it maps to
/// full [`crate::store::date::DateStore`] values rather than a plain
/// [`crate::variant::MetricTable`]).
#[derive(Debug, Clone, Default)]
pub struct AppTables {
    /// Named auto-increment counters (`ht_unique_keys`, `ht_keymap_<module>`, …).
    pub seqs: Sequences,
    /// Process-wide processed/valid/excluded/timing totals, by counter name.
    pub cnt_overall: Table<String, u32>,
    /// IP address -> resolved hostname.
    pub hostnames: Table<String, String>,
    /// Per-source-path hash -> resume checkpoint.
    pub last_parse: Table<u64, LastParse>,
    /// JSON log field name -> JSON-path expression.
    pub json_logfmt: Table<String, String>,
    /// Method/protocol string -> auto-incrementing u8 id. Append-only.
    pub meth_proto: Table<String, u8>,
    /// `{ "version": N }`.
    pub db_props: Table<String, u32>,
}

/// Names used as keys into `CNT_OVERALL` (`spec.md` §4.3 step 10).
pub const CNT_TOTAL_REQUESTS: &str = "total_requests";
pub const CNT_VALID_REQUESTS: &str = "valid_requests";
pub const CNT_EXCLUDED_REQUESTS: &str = "excluded_requests";
pub const CNT_FAILED_REQUESTS: &str = "failed_requests";

/// Key used in `DB_PROPS` for the persisted format version stamp.
pub const DB_PROPS_VERSION: &str = "version";

/// Current persisted format version this crate writes (`spec.md` §4.5).
pub const CURRENT_VERSION: u32 = 2;

impl AppTables {
    pub fn new() -> Self {
        Self::default()
    }
}
