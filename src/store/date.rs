//! Per-date storage (`spec.md` §3): one [`ModuleStore`] per module plus one
//! [`GlobalStore`] for metrics that are per-date but not per-module.

use crate::module::{Module, MODULE_COUNT};
use crate::table::Table;

/// The fourteen metric tables for one module, for one date (`spec.md` §4.2).
#[derive(Debug, Clone)]
pub struct ModuleStore {
    /// `djb2(raw key)` -> hit id. Allocated from `ht_keymap_<module>`.
    pub keymap: Table<u32, u32>,
    /// root id -> root string.
    pub rootmap: Table<u32, String>,
    /// hit id -> raw key string.
    pub datamap: Table<u32, String>,
    /// `encode_uniqmap_key(visitor_id, hit_id)` -> membership marker.
    /// Presence means "this visitor has already been counted for this hit".
    pub uniqmap: Table<u64, u8>,
    /// hit id -> root id, when the record carries a root value.
    pub root: Table<u32, u32>,
    pub hits: Table<u32, u32>,
    pub visitors: Table<u32, u32>,
    pub bw: Table<u32, u64>,
    pub cumts: Table<u32, u64>,
    pub maxts: Table<u32, u64>,
    /// hit id -> `METH_PROTO` id.
    pub methods: Table<u32, u8>,
    /// hit id -> `METH_PROTO` id.
    pub protocols: Table<u32, u8>,
    /// host hit id -> fan-out list of agent hit ids.
    pub agents: Table<u32, Vec<u32>>,
    pub metadata: Table<u32, Vec<u32>>,
}

impl Default for ModuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleStore {
    pub fn new() -> Self {
        Self {
            keymap: Table::new(),
            rootmap: Table::new(),
            datamap: Table::new(),
            uniqmap: Table::new(),
            root: Table::new(),
            hits: Table::new(),
            visitors: Table::new(),
            bw: Table::new(),
            cumts: Table::new(),
            maxts: Table::new(),
            methods: Table::new(),
            protocols: Table::new(),
            agents: Table::new(),
            metadata: Table::new(),
        }
    }
}

/// Per-date, cross-module metrics (`spec.md` §4.2, five entries).
#[derive(Debug, Clone)]
pub struct GlobalStore {
    /// `djb2(IP|date|UA_hash)` -> unique-visitor id.
    pub unique_keys: Table<u32, u32>,
    /// `djb2(user agent)` -> agent id.
    pub agent_keys: Table<u32, u32>,
    /// agent id -> user agent string.
    pub agent_vals: Table<u32, String>,
    /// Always keyed by the constant `1`: `CNT_VALID[D][1]`.
    pub cnt_valid: Table<u32, u32>,
    /// Always keyed by the constant `1`: `CNT_BW[D][1]`.
    pub cnt_bw: Table<u32, u64>,
}

/// The single key every `GlobalStore` counter is stored under.
pub const GLOBAL_COUNTER_KEY: u32 = 1;

impl Default for GlobalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalStore {
    pub fn new() -> Self {
        Self {
            unique_keys: Table::new(),
            agent_keys: Table::new(),
            agent_vals: Table::new(),
            cnt_valid: Table::new(),
            cnt_bw: Table::new(),
        }
    }
}

/// One date partition: fourteen-metric stores for every module, plus the
/// global (cross-module) store for that date.
#[derive(Debug, Clone)]
pub struct DateStore {
    modules: [ModuleStore; MODULE_COUNT],
    pub global: GlobalStore,
}

impl Default for DateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DateStore {
    pub fn new() -> Self {
        Self {
            modules: std::array::from_fn(|_| ModuleStore::new()),
            global: GlobalStore::new(),
        }
    }

    pub fn module(&self, m: Module) -> &ModuleStore {
        &self.modules[m.index()]
    }

    pub fn module_mut(&mut self, m: Module) -> &mut ModuleStore {
        &mut self.modules[m.index()]
    }

    /// Borrows one module's store and the date's global store
    /// simultaneously — ingestion touches both per record.
    pub fn module_and_global_mut(&mut self, m: Module) -> (&mut ModuleStore, &mut GlobalStore) {
        (&mut self.modules[m.index()], &mut self.global)
    }

    pub fn modules(&self) -> impl Iterator<Item = (Module, &ModuleStore)> {
        crate::module::ALL_MODULES
            .into_iter()
            .map(move |m| (m, self.module(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_date_store_has_empty_modules() {
        let ds = DateStore::new();
        for (_, ms) in ds.modules() {
            assert_eq!(ms.hits.len(), 0);
        }
    }
}
