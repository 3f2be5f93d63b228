//! The aggregation cache (`spec.md` §4.4): a per-module summary folding
//! every date's contributions into one row per cache id (`ck`), used for
//! hot reads and top-N queries. Grounded on the teacher's
//! `storage/metrics.rs`/`storage/heatmap.rs` fold-many-snapshots-into-one-
//! bucket idiom — the same accumulate-max/accumulate-sum shape, aggregating
//! across dates here instead of across a time bucket.

use crate::ids::{self, Sequences};
use crate::module::Module;
use crate::table::Table;

/// Per-module summary view. Keys are cache ids (`ck`), independent of the
/// hit ids any one date's `KEYMAP` assigns.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    /// `djb2(raw key)` -> ck. The same hash a dated `KEYMAP` stores, re-keyed
    /// into this module's own monotonic sequence.
    pub keymap: Table<u32, u32>,
    /// root ck -> root string (first observation).
    pub rootmap: Table<u32, String>,
    /// ck -> raw key string (first observation).
    pub datamap: Table<u32, String>,
    /// ck -> root ck.
    pub root: Table<u32, u32>,
    /// ck -> sum of hits across all dates.
    pub hits: Table<u32, u32>,
    /// ck -> sum of visitors across all dates.
    pub visitors: Table<u32, u32>,
    /// ck -> sum of bandwidth across all dates.
    pub bw: Table<u32, u64>,
    /// ck -> sum of cumulative time-to-serve across all dates.
    pub cumts: Table<u32, u64>,
    /// ck -> max time-to-serve across all dates.
    pub maxts: Table<u32, u64>,
    /// ck -> `METH_PROTO` id (first observation).
    pub methods: Table<u32, u8>,
    /// ck -> `METH_PROTO` id (first observation).
    pub protocols: Table<u32, u8>,
}

/// One date's contribution to a single hit, as needed to fold it into the
/// cache. Mirrors the per-hit fields `spec.md` §4.3 updates in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct HitContribution<'a> {
    pub djb2_key: u32,
    pub raw_key: &'a str,
    pub root_djb2_key: Option<u32>,
    pub root_raw: Option<&'a str>,
    pub hits: u32,
    pub visitors: u32,
    pub bw: u64,
    pub cumts: u64,
    pub maxts: u64,
    pub method_id: Option<u8>,
    pub protocol_id: Option<u8>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one hit's accumulated per-date values into this cache,
    /// returning the cache id (`ck`) it was folded into. Called both from
    /// the live ingestion path (once per updated hit) and from
    /// [`crate::db::Database::rebuild_cache`] (once per keymap entry, per
    /// date, replaying history).
    pub fn fold(&mut self, module: Module, seqs: &mut Sequences, c: HitContribution<'_>) -> u32 {
        let seq_name = ids::cache_sequence_name(module);
        let (ck, fresh) = ids::intern_hashed(&mut self.keymap, seqs, &seq_name, c.djb2_key);

        if fresh {
            self.datamap.insert(ck, c.raw_key.to_string());
        }

        if let (Some(root_key), Some(root_raw)) = (c.root_djb2_key, c.root_raw) {
            let root_seq = format!("{seq_name}_root");
            let (root_ck, root_fresh) =
                ids::intern_hashed(&mut self.keymap, seqs, &root_seq, root_key);
            if root_fresh {
                self.rootmap.insert(root_ck, root_raw.to_string());
            }
            self.root.insert_or_replace(ck, root_ck);
        }

        self.hits.increment(ck, c.hits);
        self.visitors.increment(ck, c.visitors);
        self.bw.increment(ck, c.bw);
        self.cumts.increment(ck, c.cumts);
        self.maxts.max_assign(ck, c.maxts);

        if let Some(id) = c.method_id {
            self.methods.insert(ck, id);
        }
        if let Some(id) = c.protocol_id {
            self.protocols.insert(ck, id);
        }

        ck
    }

    pub fn clear(&mut self) {
        self.keymap.clear();
        self.rootmap.clear();
        self.datamap.clear();
        self.root.clear();
        self.hits.clear();
        self.visitors.clear();
        self.bw.clear();
        self.cumts.clear();
        self.maxts.clear();
        self.methods.clear();
        self.protocols.clear();
    }

    /// `min_max` query (`spec.md` §4.6): a linear scan of one metric's
    /// cache entries.
    pub fn min_max_hits(&self) -> Option<(u32, u32)> {
        min_max(self.hits.values().copied())
    }

    pub fn min_max_bw(&self) -> Option<(u64, u64)> {
        min_max(self.bw.values().copied())
    }

    pub fn min_max_visitors(&self) -> Option<(u32, u32)> {
        min_max(self.visitors.values().copied())
    }
}

fn min_max<T: PartialOrd + Copy>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => {
            let lo = if v < lo { v } else { lo };
            let hi = if v > hi { v } else { hi };
            Some((lo, hi))
        }
    })
}

/// One row of a top-N result (`spec.md` §4.4 `parse_raw_data`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopEntry {
    pub key: u32,
    pub hits: u32,
}

/// Builds the top-N array for a module: one entry per cache key, sorted by
/// hits descending, ties broken by key ascending (`spec.md` §8 property 8).
pub fn top_by_hits(cache: &Cache) -> Vec<TopEntry> {
    let mut entries: Vec<TopEntry> = cache
        .hits
        .iter()
        .map(|(&key, &hits)| TopEntry { key, hits })
        .collect();
    entries.sort_by(|a, b| b.hits.cmp(&a.hits).then(a.key.cmp(&b.key)));
    entries
}

/// One row of the "visitors" module's top-N, which sorts by the data
/// string ascending rather than by a numeric value (`spec.md` §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopStringEntry {
    pub key: u32,
    pub data: String,
}

/// Builds the top-N array sorted lexicographically by the data string.
pub fn top_by_data_string(cache: &Cache) -> Vec<TopStringEntry> {
    let mut entries: Vec<TopStringEntry> = cache
        .datamap
        .iter()
        .map(|(&key, data)| TopStringEntry {
            key,
            data: data.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.data.cmp(&b.data).then(a.key.cmp(&b.key)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::djb2;

    fn contribution<'a>(raw: &'a str, hits: u32, visitors: u32, bw: u64, ts: u64) -> HitContribution<'a> {
        HitContribution {
            djb2_key: djb2(raw),
            raw_key: raw,
            root_djb2_key: None,
            root_raw: None,
            hits,
            visitors,
            bw,
            cumts: ts,
            maxts: ts,
            method_id: None,
            protocol_id: None,
        }
    }

    #[test]
    fn fold_sums_hits_and_bw_across_calls() {
        let mut cache = Cache::new();
        let mut seqs = Sequences::new();
        let ck1 = cache.fold(Module::Requests, &mut seqs, contribution("/a", 1, 1, 100, 5));
        let ck2 = cache.fold(Module::Requests, &mut seqs, contribution("/a", 1, 0, 200, 7));
        let ck3 = cache.fold(Module::Requests, &mut seqs, contribution("/a", 1, 0, 300, 2));
        assert_eq!(ck1, ck2);
        assert_eq!(ck2, ck3);
        assert_eq!(cache.hits.get_or_zero(&ck1), 3);
        assert_eq!(cache.bw.get_or_zero(&ck1), 600);
        assert_eq!(cache.cumts.get_or_zero(&ck1), 14);
        assert_eq!(cache.maxts.get_or_zero(&ck1), 7);
        assert_eq!(cache.visitors.get_or_zero(&ck1), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_cache_ids() {
        let mut cache = Cache::new();
        let mut seqs = Sequences::new();
        let ck_a = cache.fold(Module::Requests, &mut seqs, contribution("/a", 5, 1, 0, 0));
        let ck_b = cache.fold(Module::Requests, &mut seqs, contribution("/b", 7, 1, 0, 0));
        assert_ne!(ck_a, ck_b);

        let top = top_by_hits(&cache);
        assert_eq!(top[0].key, ck_b);
        assert_eq!(top[1].key, ck_a);
    }

    #[test]
    fn top_by_hits_breaks_ties_by_ascending_key() {
        let mut cache = Cache::new();
        let mut seqs = Sequences::new();
        let ck_a = cache.fold(Module::Requests, &mut seqs, contribution("/a", 5, 1, 0, 0));
        let ck_b = cache.fold(Module::Requests, &mut seqs, contribution("/b", 5, 1, 0, 0));
        let top = top_by_hits(&cache);
        let (lo, hi) = if ck_a < ck_b { (ck_a, ck_b) } else { (ck_b, ck_a) };
        assert_eq!(top[0].key, lo);
        assert_eq!(top[1].key, hi);
    }
}
