//! The top-level façade (`spec.md` §3 `DB`, §4.3 ingestion write path, §4.6
//! query surface): owns every dated partition, the process-wide table, and
//! the per-module aggregation cache, and is the one type external callers
//! (a parser feeding records in, a renderer pulling top-N out) hold.

use std::collections::HashMap;

use tracing::debug;

use crate::error::StoreResult;
use crate::hash::djb2;
use crate::ids::{self};
use crate::module::{Module, ALL_MODULES, MODULE_COUNT};
use crate::persist;
use crate::schema::AppMetric;
use crate::store::app::{
    CNT_EXCLUDED_REQUESTS, CNT_FAILED_REQUESTS, CNT_TOTAL_REQUESTS, CNT_VALID_REQUESTS,
};
use crate::store::date::GLOBAL_COUNTER_KEY;
use crate::store::{AppTables, Cache, DateStore, HitContribution};
use crate::config::StoreConfig;

/// One parsed HTTP access record, as the ingestion write path expects it.
/// Construction (log-line parsing) is out of scope; this is the seam the
/// external parser writes through.
#[derive(Debug, Clone, Copy)]
pub struct IngestRecord<'a> {
    /// `YYYYMMDD`-packed date this record belongs to.
    pub date: u32,
    pub module: Module,
    /// The raw key this module indexes by (a URL, host, browser name, …).
    pub key: &'a str,
    /// The raw "root" value, when this module's key has one (e.g. a
    /// referring site's root domain).
    pub root: Option<&'a str>,
    /// Hit-count delta this record contributes (ordinarily 1).
    pub hits: u32,
    /// Bytes transferred for this hit.
    pub bytes: u64,
    /// Time-to-serve for this hit.
    pub time: u64,
    pub method: &'a str,
    pub protocol: &'a str,
    /// `IP|date|UA_hash`, used to detect repeat visits within the date.
    pub visitor_composite: &'a str,
}

/// Outcome of a single record's excluded/failed classification, decided by
/// the caller (parsing and filtering rules are out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Valid,
    Excluded,
    Failed,
}

/// The in-memory analytics store.
#[derive(Debug)]
pub struct Database {
    dates: HashMap<u32, DateStore>,
    app: AppTables,
    cache: [Cache; MODULE_COUNT],
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            dates: HashMap::new(),
            app: AppTables::new(),
            cache: std::array::from_fn(|_| Cache::new()),
        }
    }

    pub fn cache(&self, module: Module) -> &Cache {
        &self.cache[module.index()]
    }

    pub fn app(&self) -> &AppTables {
        &self.app
    }

    pub fn dates(&self) -> impl Iterator<Item = u32> + '_ {
        self.dates.keys().copied()
    }

    pub fn date(&self, date: u32) -> Option<&DateStore> {
        self.dates.get(&date)
    }

    /// Step 1 of `spec.md` §4.3: insert into `DATES` if absent.
    pub fn ensure_date(&mut self, date: u32) {
        self.dates.entry(date).or_default();
    }

    /// `spec.md` §4.3: the ten-step ingestion write path. Bumps the overall
    /// counters (step 10) according to `outcome`; `Excluded`/`Failed`
    /// records still bump `CNT_OVERALL` but skip every other step.
    pub fn ingest(&mut self, rec: &IngestRecord<'_>, outcome: RecordOutcome) {
        self.app
            .cnt_overall
            .increment(CNT_TOTAL_REQUESTS.to_string(), 1);

        match outcome {
            RecordOutcome::Excluded => {
                self.app
                    .cnt_overall
                    .increment(CNT_EXCLUDED_REQUESTS.to_string(), 1);
                return;
            }
            RecordOutcome::Failed => {
                self.app
                    .cnt_overall
                    .increment(CNT_FAILED_REQUESTS.to_string(), 1);
                return;
            }
            RecordOutcome::Valid => {}
        }

        self.ensure_date(rec.date);
        let module_seq = ids::keymap_sequence_name(rec.module);
        let seqs = &mut self.app.seqs;
        let date_store = self.dates.get_mut(&rec.date).expect("ensured above");
        let (store, global) = date_store.module_and_global_mut(rec.module);

        // Step 2: intern the visitor composite against this date's global table.
        let uk_hash = djb2(rec.visitor_composite);
        let (uk_id, _) =
            ids::intern_hashed(&mut global.unique_keys, seqs, ids::UNIQUE_KEYS_SEQUENCE, uk_hash);

        // Step 3-4: intern the key, mirror the raw string on first sight.
        let key_hash = djb2(rec.key);
        let (hit_id, hit_fresh) = ids::intern_hashed(&mut store.keymap, seqs, &module_seq, key_hash);
        if hit_fresh {
            store.datamap.insert(hit_id, rec.key.to_string());
        }

        // Step 5: intern the root value, when present, into the same keymap.
        if let Some(r) = rec.root {
            let root_hash = djb2(r);
            let (root_id, root_fresh) =
                ids::intern_hashed(&mut store.keymap, seqs, &module_seq, root_hash);
            if root_fresh {
                store.rootmap.insert(root_id, r.to_string());
            }
            store.root.insert_or_replace(hit_id, root_id);
        }

        // Step 6: dedupe repeat visits to this hit within the date.
        let uniq_key = ids::encode_uniqmap_key(uk_id, hit_id);
        let is_new_visit = store.uniqmap.insert(uniq_key, 1).is_fresh();

        // Step 7: counters.
        store.hits.increment(hit_id, rec.hits);
        store.bw.increment(hit_id, rec.bytes);
        store.cumts.increment(hit_id, rec.time);
        store.maxts.max_assign(hit_id, rec.time);
        if is_new_visit {
            store.visitors.increment(hit_id, 1);
        }

        // Step 8: method/protocol intern, auto-incrementing on first sight.
        let method_id = ids::intern_meth_proto(&mut self.app.meth_proto, rec.method);
        let protocol_id = ids::intern_meth_proto(&mut self.app.meth_proto, rec.protocol);
        let date_store = self.dates.get_mut(&rec.date).expect("ensured above");
        let (store, global) = date_store.module_and_global_mut(rec.module);
        store.methods.insert_or_replace(hit_id, method_id);
        store.protocols.insert_or_replace(hit_id, protocol_id);

        // Step 9: fold this record's deltas into the aggregation cache.
        let contribution = HitContribution {
            djb2_key: key_hash,
            raw_key: rec.key,
            root_djb2_key: rec.root.map(djb2),
            root_raw: rec.root,
            hits: rec.hits,
            visitors: u32::from(is_new_visit),
            bw: rec.bytes,
            cumts: rec.time,
            maxts: rec.time,
            method_id: Some(method_id),
            protocol_id: Some(protocol_id),
        };
        self.cache[rec.module.index()].fold(rec.module, &mut self.app.seqs, contribution);

        // Step 10: per-date and process-wide valid totals.
        global.cnt_valid.increment(GLOBAL_COUNTER_KEY, 1);
        global.cnt_bw.increment(GLOBAL_COUNTER_KEY, rec.bytes);
        self.app
            .cnt_overall
            .increment(CNT_VALID_REQUESTS.to_string(), 1);
    }

    /// `rebuild_raw_data_cache` (`spec.md` §4.4): recomputes every module's
    /// cache from scratch by replaying every date's `KEYMAP`. Used after
    /// [`Database::restore`] and after [`Database::invalidate`].
    pub fn rebuild_cache(&mut self) {
        for cache in &mut self.cache {
            cache.clear();
        }

        for module in ALL_MODULES {
            for date_store in self.dates.values() {
                let store = date_store.module(module);
                for (&djb2_key, &hit_id) in store.keymap.iter() {
                    let Some(raw_key) = store.datamap.get(&hit_id) else {
                        continue;
                    };
                    let root_id = store.root.get(&hit_id).copied();
                    let root_raw = root_id.and_then(|id| store.rootmap.get(&id));
                    let contribution = HitContribution {
                        djb2_key,
                        raw_key,
                        root_djb2_key: root_raw.map(|r| djb2(r)),
                        root_raw: root_raw.map(String::as_str),
                        hits: store.hits.get_or_zero(&hit_id),
                        visitors: store.visitors.get_or_zero(&hit_id),
                        bw: store.bw.get_or_zero(&hit_id),
                        cumts: store.cumts.get_or_zero(&hit_id),
                        maxts: store.maxts.get_or_zero(&hit_id),
                        method_id: store.methods.get(&hit_id).copied(),
                        protocol_id: store.protocols.get(&hit_id).copied(),
                    };
                    self.cache[module.index()].fold(module, &mut self.app.seqs, contribution);
                }
            }
        }
    }

    /// Tears down one date's partition entirely (`spec.md` §3 lifecycle,
    /// §8 property 7), then rebuilds the cache so it stops reflecting the
    /// invalidated date's contributions.
    pub fn invalidate(&mut self, date: u32) {
        if self.dates.remove(&date).is_some() {
            debug!(date, "invalidated date partition");
            self.rebuild_cache();
        }
    }

    // --- Query surface (`spec.md` §4.6) -----------------------------------

    /// `sum_valid()`: total valid requests across every active date.
    pub fn sum_valid(&self) -> u32 {
        self.dates
            .values()
            .map(|d| d.global.cnt_valid.get_or_zero(&GLOBAL_COUNTER_KEY))
            .sum()
    }

    /// `sum_bw()`: total bandwidth across every active date.
    pub fn sum_bw(&self) -> u64 {
        self.dates
            .values()
            .map(|d| d.global.cnt_bw.get_or_zero(&GLOBAL_COUNTER_KEY))
            .sum()
    }

    /// `keymap_list_from_key(M, ck)`: per-date hit ids corresponding to the
    /// cache id `ck`, for cross-date drill-down.
    pub fn keymap_list_from_key(&self, module: Module, ck: u32) -> Vec<(u32, u32)> {
        let Some(raw_key) = self.cache[module.index()].datamap.get(&ck) else {
            return Vec::new();
        };
        let key_hash = djb2(raw_key);
        let mut out = Vec::new();
        for (&date, date_store) in &self.dates {
            let store = date_store.module(module);
            if let Some(&hit_id) = store.keymap.get(&key_hash) {
                out.push((date, hit_id));
            }
        }
        out.sort_unstable();
        out
    }

    /// `host_agent_list(module, ck)`: union of `AGENTS[M,D][ck]` across all
    /// dates, deduplicated.
    pub fn host_agent_list(&self, module: Module, ck: u32) -> Vec<u32> {
        let mut out = Vec::new();
        for (date, hit_id) in self.keymap_list_from_key(module, ck) {
            let store = self.dates[&date].module(module);
            for &agent_id in store.agents.list(&hit_id) {
                if !out.contains(&agent_id) {
                    out.push(agent_id);
                }
            }
        }
        out
    }

    /// Persists every table with a non-null filename to `config.db_path`
    /// (`spec.md` §4.5, §6). No-op if `config.persist` is `false`.
    pub fn persist(&self, config: &StoreConfig) -> StoreResult<()> {
        if !config.persist {
            return Ok(());
        }
        persist::files::write_all(&config.db_path, &self.dates, &self.app)
    }

    /// Restores from `config.db_path`, applying `config.keep_last` and
    /// legacy-format migration, then rebuilds the cache. No-op if
    /// `config.restore` is `false` or the directory doesn't exist.
    pub fn restore(&mut self, config: &StoreConfig) -> StoreResult<()> {
        if !config.restore || !config.db_path.exists() {
            return Ok(());
        }
        let (dates, app) = persist::files::read_all(&config.db_path, config.keep_last)?;
        self.dates = dates;
        self.app = app;
        self.rebuild_cache();
        Ok(())
    }

    /// Whether `metric` is persisted as a dedicated file at all
    /// (`DATES`/`LAST_PARSE` use bespoke formats handled directly by
    /// [`crate::persist::files`]).
    pub fn is_persisted(metric: AppMetric) -> bool {
        !matches!(metric, AppMetric::Dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(date: u32, module: Module, key: &'a str, visitor: &'a str) -> IngestRecord<'a> {
        IngestRecord {
            date,
            module,
            key,
            root: None,
            hits: 0,
            bytes: 0,
            time: 0,
            method: "GET",
            protocol: "HTTP/1.1",
            visitor_composite: visitor,
        }
    }

    // E1: three same-visitor hits to the same path sum hits/bw/cumts, track
    // maxts, and count one visitor.
    #[test]
    fn e1_same_visitor_repeated_hits() {
        let mut db = Database::new();
        for (bytes, time) in [(100u64, 5u64), (200, 7), (300, 2)] {
            let mut rec = record(20250101, Module::Requests, "/a", "1.2.3.4|20250101|ua1");
            rec.bytes = bytes;
            rec.time = time;
            rec.hits = 1;
            db.ingest(&rec, RecordOutcome::Valid);
        }
        let cache = db.cache(Module::Requests);
        let ck = *cache.keymap.values().next().unwrap();
        assert_eq!(cache.hits.get_or_zero(&ck), 3);
        assert_eq!(cache.bw.get_or_zero(&ck), 600);
        assert_eq!(cache.cumts.get_or_zero(&ck), 14);
        assert_eq!(cache.maxts.get_or_zero(&ck), 7);
        assert_eq!(cache.visitors.get_or_zero(&ck), 1);
    }

    // E2: same as E1 but the second record's visitor composite differs.
    #[test]
    fn e2_distinct_visitor_increments_visitors() {
        let mut db = Database::new();
        let mut r1 = record(20250101, Module::Requests, "/a", "1.2.3.4|20250101|ua1");
        r1.hits = 1;
        db.ingest(&r1, RecordOutcome::Valid);
        let mut r2 = record(20250101, Module::Requests, "/a", "5.6.7.8|20250101|ua2");
        r2.hits = 1;
        db.ingest(&r2, RecordOutcome::Valid);
        let cache = db.cache(Module::Requests);
        let ck = *cache.keymap.values().next().unwrap();
        assert_eq!(cache.visitors.get_or_zero(&ck), 2);
    }

    // E3: two dates, same path, hits {5, 7}; cache sums to 12, sum_valid too.
    #[test]
    fn e3_sums_across_dates() {
        let mut db = Database::new();
        let mut r1 = record(20250101, Module::Requests, "/a", "1.1.1.1|20250101|ua");
        r1.hits = 5;
        db.ingest(&r1, RecordOutcome::Valid);
        let mut r2 = record(20250102, Module::Requests, "/a", "1.1.1.1|20250102|ua");
        r2.hits = 7;
        db.ingest(&r2, RecordOutcome::Valid);
        let cache = db.cache(Module::Requests);
        let ck = *cache.keymap.values().next().unwrap();
        assert_eq!(cache.hits.get_or_zero(&ck), 12);
    }

    // E4: METH_PROTO assigns ids in first-seen order without reassignment.
    #[test]
    fn e4_meth_proto_stable_ids() {
        let mut db = Database::new();
        let mut r1 = record(20250101, Module::Requests, "/a", "1.1.1.1|20250101|ua");
        r1.method = "GET";
        db.ingest(&r1, RecordOutcome::Valid);
        let mut r2 = record(20250101, Module::Requests, "/b", "1.1.1.1|20250101|ua");
        r2.method = "POST";
        db.ingest(&r2, RecordOutcome::Valid);
        let mut r3 = record(20250101, Module::Requests, "/c", "1.1.1.1|20250101|ua");
        r3.method = "GET";
        db.ingest(&r3, RecordOutcome::Valid);
        // METH_PROTO is shared between methods and protocols (`spec.md` §3:
        // "METH_PROTO (method/protocol string→u8 intern table...)"), so the
        // first record's protocol ("HTTP/1.1") also claims a slot between
        // GET and POST.
        assert_eq!(db.app().meth_proto.get("GET"), Some(&1));
        assert_eq!(db.app().meth_proto.get("HTTP/1.1"), Some(&2));
        assert_eq!(db.app().meth_proto.get("POST"), Some(&3));
        assert_eq!(db.app().meth_proto.get("GET"), Some(&1));
    }

    // E7: invalidate(D0) leaves other dates' metrics untouched and removes
    // D0's contribution from the rebuilt cache.
    #[test]
    fn invalidate_is_local() {
        // `CNT_VALID[D][1] += 1` counts *records*, not the `hits` delta each
        // carries (`spec.md` §4.3 step 10), so "hits {5, 7}" from the E3/E5
        // scenarios means five and seven separate valid records.
        let mut db = Database::new();
        for i in 0..5 {
            let visitor = format!("1.1.1.1|20250101|ua{i}");
            let mut r = record(20250101, Module::Requests, "/a", &visitor);
            r.hits = 1;
            db.ingest(&r, RecordOutcome::Valid);
        }
        for i in 0..7 {
            let visitor = format!("1.1.1.1|20250102|ua{i}");
            let mut r = record(20250102, Module::Requests, "/a", &visitor);
            r.hits = 1;
            db.ingest(&r, RecordOutcome::Valid);
        }

        db.invalidate(20250101);

        assert_eq!(db.sum_valid(), 7);
        let cache = db.cache(Module::Requests);
        let ck = *cache.keymap.values().next().unwrap();
        assert_eq!(cache.hits.get_or_zero(&ck), 7);
    }
}
