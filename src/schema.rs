//! Metric schema & registry (`spec.md` §4.2).
//!
//! Three closed enumerations — app metrics (8), module metrics (14), global
//! metrics (5) — each carrying a [`VariantTag`] (which of the ten map shapes
//! it uses), a persistence filename stem, and whether its values own heap
//! memory. "The index of each metric in its table equals the numeric value
//! of its tag" (§4.2) is enforced by `#[repr(u8)]` plus a `const fn index`
//! returning the discriminant, mirroring how the teacher's `DataBlock`
//! tagged union (`storage/model/snapshot.rs`) is matched exhaustively rather
//! than looked up through function-pointer tables.

use crate::variant::VariantTag;

/// Process-wide, undated metrics held by the application table (`AppDB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AppMetric {
    /// The set of active dates. Not a `Table` — see `store::app::AppTables::dates`.
    Dates = 0,
    /// Named auto-increment counters (e.g. `"ht_unique_keys"`, one per module).
    Seqs = 1,
    /// Overall processed/valid/excluded/timing totals.
    CntOverall = 2,
    /// IP address to resolved hostname.
    Hostnames = 3,
    /// Per-log-source resume checkpoint. Not a `Table` of the ten shapes —
    /// see `store::app::AppTables::last_parse` and `SPEC_FULL.md` §4.5.
    LastParse = 4,
    /// JSON log format field-name to JSON-path mapping.
    JsonLogfmt = 5,
    /// Method/protocol string to auto-incrementing u8 id. Append-only.
    MethProto = 6,
    /// `{ "version": N }`, the persisted format version stamp.
    DbProps = 7,
}

pub const APP_METRIC_COUNT: usize = 8;

pub const ALL_APP_METRICS: [AppMetric; APP_METRIC_COUNT] = [
    AppMetric::Dates,
    AppMetric::Seqs,
    AppMetric::CntOverall,
    AppMetric::Hostnames,
    AppMetric::LastParse,
    AppMetric::JsonLogfmt,
    AppMetric::MethProto,
    AppMetric::DbProps,
];

impl AppMetric {
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            AppMetric::Dates => "DATES",
            AppMetric::Seqs => "SEQS",
            AppMetric::CntOverall => "CNT_OVERALL",
            AppMetric::Hostnames => "HOSTNAMES",
            AppMetric::LastParse => "LAST_PARSE",
            AppMetric::JsonLogfmt => "JSON_LOGFMT",
            AppMetric::MethProto => "METH_PROTO",
            AppMetric::DbProps => "DB_PROPS",
        }
    }

    /// `None` for `Dates`/`LastParse`, which have bespoke file formats
    /// (`I32_DATES.db`, `IGLP_LAST_PARSE.db`) rather than a plain
    /// [`VariantTag`] table.
    pub const fn variant(self) -> Option<VariantTag> {
        match self {
            AppMetric::Dates => None,
            AppMetric::Seqs => Some(VariantTag::SI32),
            AppMetric::CntOverall => Some(VariantTag::SI32),
            AppMetric::Hostnames => Some(VariantTag::SS32),
            AppMetric::LastParse => None,
            AppMetric::JsonLogfmt => Some(VariantTag::SS32),
            AppMetric::MethProto => Some(VariantTag::SI08),
            AppMetric::DbProps => Some(VariantTag::SI32),
        }
    }

    /// Whether this metric's values own heap memory (affects nothing in a
    /// GC'd/RAII language beyond documentation, but kept to mirror the
    /// schema table's `free_data` flag named in `spec.md` §4.2/§5).
    pub const fn owns_heap_memory(self) -> bool {
        matches!(
            self,
            AppMetric::Hostnames | AppMetric::JsonLogfmt | AppMetric::LastParse
        )
    }
}

/// Per-module, per-date metrics (`spec.md` §4.2, fourteen entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModuleMetric {
    KeyMap = 0,
    RootMap = 1,
    DataMap = 2,
    UniqMap = 3,
    Root = 4,
    Hits = 5,
    Visitors = 6,
    Bw = 7,
    CumTs = 8,
    MaxTs = 9,
    Methods = 10,
    Protocols = 11,
    Agents = 12,
    Metadata = 13,
}

pub const MODULE_METRIC_COUNT: usize = 14;

pub const ALL_MODULE_METRICS: [ModuleMetric; MODULE_METRIC_COUNT] = [
    ModuleMetric::KeyMap,
    ModuleMetric::RootMap,
    ModuleMetric::DataMap,
    ModuleMetric::UniqMap,
    ModuleMetric::Root,
    ModuleMetric::Hits,
    ModuleMetric::Visitors,
    ModuleMetric::Bw,
    ModuleMetric::CumTs,
    ModuleMetric::MaxTs,
    ModuleMetric::Methods,
    ModuleMetric::Protocols,
    ModuleMetric::Agents,
    ModuleMetric::Metadata,
];

impl ModuleMetric {
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            ModuleMetric::KeyMap => "KEYMAP",
            ModuleMetric::RootMap => "ROOTMAP",
            ModuleMetric::DataMap => "DATAMAP",
            ModuleMetric::UniqMap => "UNIQMAP",
            ModuleMetric::Root => "ROOT",
            ModuleMetric::Hits => "HITS",
            ModuleMetric::Visitors => "VISITORS",
            ModuleMetric::Bw => "BW",
            ModuleMetric::CumTs => "CUMTS",
            ModuleMetric::MaxTs => "MAXTS",
            ModuleMetric::Methods => "METHODS",
            ModuleMetric::Protocols => "PROTOCOLS",
            ModuleMetric::Agents => "AGENTS",
            ModuleMetric::Metadata => "METADATA",
        }
    }

    /// Variant tag in the current (post-migration) on-disk format — i.e.
    /// `KEYMAP`/`METHODS`/`PROTOCOLS` are already `II32`/`II08`, not the
    /// legacy `SI32`/`IS32` shapes `persist::migrate` reads.
    pub const fn variant(self) -> VariantTag {
        match self {
            ModuleMetric::KeyMap => VariantTag::II32,
            ModuleMetric::RootMap => VariantTag::IS32,
            ModuleMetric::DataMap => VariantTag::IS32,
            ModuleMetric::UniqMap => VariantTag::U648,
            ModuleMetric::Root => VariantTag::II32,
            ModuleMetric::Hits => VariantTag::II32,
            ModuleMetric::Visitors => VariantTag::II32,
            ModuleMetric::Bw => VariantTag::IU64,
            ModuleMetric::CumTs => VariantTag::IU64,
            ModuleMetric::MaxTs => VariantTag::IU64,
            ModuleMetric::Methods => VariantTag::II08,
            ModuleMetric::Protocols => VariantTag::II08,
            ModuleMetric::Agents => VariantTag::IGSL,
            ModuleMetric::Metadata => VariantTag::IGSL,
        }
    }

    pub const fn owns_heap_memory(self) -> bool {
        matches!(self, ModuleMetric::RootMap | ModuleMetric::DataMap)
    }

    /// Whether this metric's values are summed across dates in the
    /// aggregation cache (`HITS`/`VISITORS`/`BW`/`CUMTS`), maxed
    /// (`MAXTS`), or taken from the first observation (everything else) —
    /// `spec.md` §4.4.
    pub const fn cache_fold(self) -> CacheFold {
        match self {
            ModuleMetric::Hits | ModuleMetric::Visitors | ModuleMetric::Bw | ModuleMetric::CumTs => {
                CacheFold::Sum
            }
            ModuleMetric::MaxTs => CacheFold::Max,
            _ => CacheFold::First,
        }
    }
}

/// How a module metric's per-date values fold into the aggregation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFold {
    Sum,
    Max,
    First,
}

/// Per-date, cross-module metrics (`spec.md` §4.2, five entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GlobalMetric {
    UniqueKeys = 0,
    AgentKeys = 1,
    AgentVals = 2,
    CntValid = 3,
    CntBw = 4,
}

pub const GLOBAL_METRIC_COUNT: usize = 5;

pub const ALL_GLOBAL_METRICS: [GlobalMetric; GLOBAL_METRIC_COUNT] = [
    GlobalMetric::UniqueKeys,
    GlobalMetric::AgentKeys,
    GlobalMetric::AgentVals,
    GlobalMetric::CntValid,
    GlobalMetric::CntBw,
];

impl GlobalMetric {
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            GlobalMetric::UniqueKeys => "UNIQUE_KEYS",
            GlobalMetric::AgentKeys => "AGENT_KEYS",
            GlobalMetric::AgentVals => "AGENT_VALS",
            GlobalMetric::CntValid => "CNT_VALID",
            GlobalMetric::CntBw => "CNT_BW",
        }
    }

    pub const fn variant(self) -> VariantTag {
        match self {
            GlobalMetric::UniqueKeys => VariantTag::II32,
            GlobalMetric::AgentKeys => VariantTag::II32,
            GlobalMetric::AgentVals => VariantTag::IS32,
            GlobalMetric::CntValid => VariantTag::II32,
            GlobalMetric::CntBw => VariantTag::IU64,
        }
    }

    pub const fn owns_heap_memory(self) -> bool {
        matches!(self, GlobalMetric::AgentVals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_declaration_order() {
        for (i, m) in ALL_APP_METRICS.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
        for (i, m) in ALL_MODULE_METRICS.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
        for (i, m) in ALL_GLOBAL_METRICS.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
    }

    #[test]
    fn cache_fold_matches_spec_groupings() {
        assert_eq!(ModuleMetric::Hits.cache_fold(), CacheFold::Sum);
        assert_eq!(ModuleMetric::Visitors.cache_fold(), CacheFold::Sum);
        assert_eq!(ModuleMetric::Bw.cache_fold(), CacheFold::Sum);
        assert_eq!(ModuleMetric::CumTs.cache_fold(), CacheFold::Sum);
        assert_eq!(ModuleMetric::MaxTs.cache_fold(), CacheFold::Max);
        assert_eq!(ModuleMetric::DataMap.cache_fold(), CacheFold::First);
    }
}
