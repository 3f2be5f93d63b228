//! Directory-level persistence (`spec.md` §6 file layout): one file per
//! metric with a non-null filename, read/written through
//! [`super::codec::TplWriter`]/[`super::codec::TplReader`].

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::error::StoreResult;
use crate::module::{Module, ALL_MODULES};
use crate::persist::codec::{write_file_atomic, TplReader, TplWriter};
use crate::persist::migrate;
use crate::schema::ModuleMetric;
use crate::store::app::{LastParse, CURRENT_VERSION, DB_PROPS_VERSION};
use crate::store::date::GLOBAL_COUNTER_KEY;
use crate::store::{AppTables, DateStore, ModuleStore};
use crate::table::Table;

const FMT_FLAT_SI32: &str = "A(su)";
const FMT_FLAT_SI08: &str = "A(sv)";
const FMT_FLAT_SS32: &str = "A(ss)";
const FMT_FLAT_U32: &str = "A(u)";
const FMT_LAST_PARSE: &str = "A(US(uIUvc#20))";
const FMT_DATED_II32: &str = "A(iA(uu))";
const FMT_DATED_IS32: &str = "A(iA(us))";
const FMT_DATED_IU64: &str = "A(iA(uU))";
const FMT_DATED_II08: &str = "A(iA(uv))";
const FMT_DATED_U648: &str = "A(iA(Uv))";

// --- Flat (undated) tables --------------------------------------------------

fn write_flat_si32(entries: &Table<String, u32>) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_FLAT_SI32);
    w.write_u32(entries.len() as u32);
    for (k, &v) in entries.iter() {
        w.write_string(k);
        w.write_u32(v);
    }
    w.into_bytes()
}

fn read_flat_si32(data: &[u8]) -> StoreResult<Table<String, u32>> {
    let mut r = TplReader::open(data, FMT_FLAT_SI32)?;
    let n = r.read_u32()? as usize;
    let mut out = Table::new();
    for _ in 0..n {
        let k = r.read_string()?;
        let v = r.read_u32()?;
        out.insert_or_replace(k, v);
    }
    Ok(out)
}

fn write_flat_si08(entries: &Table<String, u8>) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_FLAT_SI08);
    w.write_u32(entries.len() as u32);
    for (k, &v) in entries.iter() {
        w.write_string(k);
        w.write_u16(v as u16);
    }
    w.into_bytes()
}

fn read_flat_si08(data: &[u8]) -> StoreResult<Table<String, u8>> {
    let mut r = TplReader::open(data, FMT_FLAT_SI08)?;
    let n = r.read_u32()? as usize;
    let mut out = Table::new();
    for _ in 0..n {
        let k = r.read_string()?;
        let v = r.read_u16()? as u8;
        out.insert_or_replace(k, v);
    }
    Ok(out)
}

fn write_flat_ss32(entries: &Table<String, String>) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_FLAT_SS32);
    w.write_u32(entries.len() as u32);
    for (k, v) in entries.iter() {
        w.write_string(k);
        w.write_string(v);
    }
    w.into_bytes()
}

fn read_flat_ss32(data: &[u8]) -> StoreResult<Table<String, String>> {
    let mut r = TplReader::open(data, FMT_FLAT_SS32)?;
    let n = r.read_u32()? as usize;
    let mut out = Table::new();
    for _ in 0..n {
        let k = r.read_string()?;
        let v = r.read_string()?;
        out.insert_or_replace(k, v);
    }
    Ok(out)
}

fn write_dates_index(mut dates: Vec<u32>) -> Vec<u8> {
    dates.sort_unstable();
    let mut w = TplWriter::new(FMT_FLAT_U32);
    w.write_u32(dates.len() as u32);
    for d in dates {
        w.write_u32(d);
    }
    w.into_bytes()
}

fn read_dates_index(data: &[u8]) -> StoreResult<Vec<u32>> {
    let mut r = TplReader::open(data, FMT_FLAT_U32)?;
    let n = r.read_u32()? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(r.read_u32()?);
    }
    Ok(out)
}

fn write_last_parse(entries: &Table<u64, LastParse>) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_LAST_PARSE);
    w.write_u32(entries.len() as u32);
    for (&k, v) in entries.iter() {
        w.write_u64(k);
        w.write_u32(v.line);
        w.write_i64(v.ts);
        w.write_u64(v.size);
        w.write_u16(v.pos);
        w.write_bytes(&v.snippet);
    }
    w.into_bytes()
}

fn read_last_parse(data: &[u8]) -> StoreResult<Table<u64, LastParse>> {
    let mut r = TplReader::open(data, FMT_LAST_PARSE)?;
    let n = r.read_u32()? as usize;
    let mut out = Table::new();
    for _ in 0..n {
        let k = r.read_u64()?;
        let line = r.read_u32()?;
        let ts = r.read_i64()?;
        let size = r.read_u64()?;
        let pos = r.read_u16()?;
        let snippet: [u8; 20] = r.read_bytes(20)?.try_into().unwrap();
        out.insert_or_replace(
            k,
            LastParse {
                line,
                ts,
                size,
                pos,
                snippet,
            },
        );
    }
    Ok(out)
}

// --- Dated (per-date) tables -------------------------------------------------

fn write_dated_ii32(dates: &[(u32, Vec<(u32, u32)>)]) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_DATED_II32);
    w.write_u32(dates.len() as u32);
    for (d, entries) in dates {
        w.write_u32(*d);
        w.write_u32(entries.len() as u32);
        for &(k, v) in entries {
            w.write_u32(k);
            w.write_u32(v);
        }
    }
    w.into_bytes()
}

fn read_dated_ii32(data: &[u8]) -> StoreResult<Vec<(u32, Vec<(u32, u32)>)>> {
    let mut r = TplReader::open(data, FMT_DATED_II32)?;
    read_dated_body(&mut r, |r| Ok((r.read_u32()?, r.read_u32()?)))
}

fn write_dated_is32(dates: &[(u32, Vec<(u32, String)>)]) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_DATED_IS32);
    w.write_u32(dates.len() as u32);
    for (d, entries) in dates {
        w.write_u32(*d);
        w.write_u32(entries.len() as u32);
        for (k, v) in entries {
            w.write_u32(*k);
            w.write_string(v);
        }
    }
    w.into_bytes()
}

fn read_dated_is32(data: &[u8]) -> StoreResult<Vec<(u32, Vec<(u32, String)>)>> {
    let mut r = TplReader::open(data, FMT_DATED_IS32)?;
    read_dated_body(&mut r, |r| Ok((r.read_u32()?, r.read_string()?)))
}

fn write_dated_iu64(dates: &[(u32, Vec<(u32, u64)>)]) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_DATED_IU64);
    w.write_u32(dates.len() as u32);
    for (d, entries) in dates {
        w.write_u32(*d);
        w.write_u32(entries.len() as u32);
        for &(k, v) in entries {
            w.write_u32(k);
            w.write_u64(v);
        }
    }
    w.into_bytes()
}

fn read_dated_iu64(data: &[u8]) -> StoreResult<Vec<(u32, Vec<(u32, u64)>)>> {
    let mut r = TplReader::open(data, FMT_DATED_IU64)?;
    read_dated_body(&mut r, |r| Ok((r.read_u32()?, r.read_u64()?)))
}

fn write_dated_ii08(dates: &[(u32, Vec<(u32, u8)>)]) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_DATED_II08);
    w.write_u32(dates.len() as u32);
    for (d, entries) in dates {
        w.write_u32(*d);
        w.write_u32(entries.len() as u32);
        for &(k, v) in entries {
            w.write_u32(k);
            w.write_u16(v as u16);
        }
    }
    w.into_bytes()
}

fn read_dated_ii08(data: &[u8]) -> StoreResult<Vec<(u32, Vec<(u32, u8)>)>> {
    let mut r = TplReader::open(data, FMT_DATED_II08)?;
    read_dated_body(&mut r, |r| Ok((r.read_u32()?, r.read_u16()? as u8)))
}

fn write_dated_u648(dates: &[(u32, Vec<(u64, u8)>)]) -> Vec<u8> {
    let mut w = TplWriter::new(FMT_DATED_U648);
    w.write_u32(dates.len() as u32);
    for (d, entries) in dates {
        w.write_u32(*d);
        w.write_u32(entries.len() as u32);
        for &(k, v) in entries {
            w.write_u64(k);
            w.write_u16(v as u16);
        }
    }
    w.into_bytes()
}

fn read_dated_u648(data: &[u8]) -> StoreResult<Vec<(u32, Vec<(u64, u8)>)>> {
    let mut r = TplReader::open(data, FMT_DATED_U648)?;
    read_dated_body(&mut r, |r| Ok((r.read_u64()?, r.read_u16()? as u8)))
}

/// Shared "outer date array, inner (K,V) array" reader loop.
fn read_dated_body<K, V>(
    r: &mut TplReader<'_>,
    mut read_entry: impl FnMut(&mut TplReader<'_>) -> StoreResult<(K, V)>,
) -> StoreResult<Vec<(u32, Vec<(K, V)>)>> {
    let dates = r.read_u32()? as usize;
    let mut out = Vec::with_capacity(dates);
    for _ in 0..dates {
        let date = r.read_u32()?;
        let count = r.read_u32()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(read_entry(r)?);
        }
        out.push((date, entries));
    }
    Ok(out)
}

/// Legacy dated `SI32`/`IS32` shapes, read only for migration.
fn read_dated_si32(data: &[u8]) -> StoreResult<Vec<(u32, Vec<(String, u32)>)>> {
    let mut r = TplReader::open(data, "A(iA(su))")?;
    read_dated_body(&mut r, |r| Ok((r.read_string()?, r.read_u32()?)))
}

fn read_dated_is32_legacy(data: &[u8]) -> StoreResult<Vec<(u32, Vec<(u32, String)>)>> {
    read_dated_is32(data)
}

// --- File naming (`spec.md` §6) ---------------------------------------------

fn module_metric_path(dir: &Path, module: Module, metric: ModuleMetric) -> std::path::PathBuf {
    dir.join(format!(
        "{}_{}_{}.db",
        metric.variant().file_prefix(),
        module.as_str(),
        metric.name()
    ))
}

fn legacy_module_metric_path(
    dir: &Path,
    module: Module,
    metric: ModuleMetric,
    legacy_prefix: &str,
) -> std::path::PathBuf {
    dir.join(format!("{legacy_prefix}_{}_{}.db", module.as_str(), metric.name()))
}

/// Reads a small file into memory, translating a missing file into `None`
/// rather than an error — most metric files are optional.
fn try_read(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Loads one per-date `(K,V)` table for a module metric, transparently
/// migrating from the legacy filename/format if the current one is absent
/// (`spec.md` §4.5 "Versioning").
fn load_module_ii32_with_migration(
    dir: &Path,
    module: Module,
    metric: ModuleMetric,
) -> Vec<(u32, Vec<(u32, u32)>)> {
    let current = module_metric_path(dir, module, metric);
    match try_read(&current) {
        Ok(Some(bytes)) => match read_dated_ii32(&bytes) {
            Ok(v) => return v,
            Err(e) => warn!(?current, %e, "corrupted file, loading empty"),
        },
        Ok(None) => {}
        Err(e) => warn!(?current, %e, "failed to read file, loading empty"),
    }

    let legacy = legacy_module_metric_path(dir, module, metric, "SI32");
    if let Ok(Some(bytes)) = try_read(&legacy) {
        match read_dated_si32(&bytes) {
            Ok(dated) => {
                let migrated: Vec<_> = dated
                    .into_iter()
                    .map(|(d, entries)| {
                        let table = migrate::migrate_si32_to_ii32(entries);
                        (d, table.iter().map(|(&k, &v)| (k, v)).collect())
                    })
                    .collect();
                let _ = std::fs::remove_file(&legacy);
                return migrated;
            }
            Err(e) => warn!(?legacy, %e, "legacy file corrupted, loading empty"),
        }
    }

    Vec::new()
}

fn load_module_ii08_with_migration(
    dir: &Path,
    module: Module,
    metric: ModuleMetric,
    meth_proto: &Table<String, u8>,
) -> Vec<(u32, Vec<(u32, u8)>)> {
    let current = module_metric_path(dir, module, metric);
    match try_read(&current) {
        Ok(Some(bytes)) => match read_dated_ii08(&bytes) {
            Ok(v) => return v,
            Err(e) => warn!(?current, %e, "corrupted file, loading empty"),
        },
        Ok(None) => {}
        Err(e) => warn!(?current, %e, "failed to read file, loading empty"),
    }

    let legacy = legacy_module_metric_path(dir, module, metric, "IS32");
    if let Ok(Some(bytes)) = try_read(&legacy) {
        match read_dated_is32_legacy(&bytes) {
            Ok(dated) => {
                let migrated: Vec<_> = dated
                    .into_iter()
                    .map(|(d, entries)| {
                        let table = migrate::migrate_is32_to_ii08(entries, meth_proto);
                        (d, table.iter().map(|(&k, &v)| (k, v)).collect())
                    })
                    .collect();
                let _ = std::fs::remove_file(&legacy);
                return migrated;
            }
            Err(e) => warn!(?legacy, %e, "legacy file corrupted, loading empty"),
        }
    }

    Vec::new()
}

/// Loads the dated `UNIQUE_KEYS` global table, transparently migrating from
/// the legacy `SI32_UNIQUE_KEYS.db` composite-string format if the current
/// `II32_UNIQUE_KEYS.db` is absent (`spec.md` §4.5 "Versioning" bullet 1).
fn load_unique_keys_with_migration(dir: &Path) -> Vec<(u32, Vec<(u32, u32)>)> {
    let current = dir.join("II32_UNIQUE_KEYS.db");
    match try_read(&current) {
        Ok(Some(bytes)) => match read_dated_ii32(&bytes) {
            Ok(v) => return v,
            Err(e) => warn!(?current, %e, "corrupted file, loading empty"),
        },
        Ok(None) => {}
        Err(e) => warn!(?current, %e, "failed to read file, loading empty"),
    }

    let legacy = dir.join("SI32_UNIQUE_KEYS.db");
    if let Ok(Some(bytes)) = try_read(&legacy) {
        match read_dated_si32(&bytes) {
            Ok(dated) => {
                let migrated: Vec<_> = dated
                    .into_iter()
                    .map(|(d, entries)| {
                        let table = migrate::migrate_unique_keys(entries);
                        (d, table.iter().map(|(&k, &v)| (k, v)).collect())
                    })
                    .collect();
                let _ = std::fs::remove_file(&legacy);
                return migrated;
            }
            Err(e) => warn!(?legacy, %e, "legacy file corrupted, loading empty"),
        }
    }

    Vec::new()
}

/// Writes every persisted metric into `dir` (`spec.md` §4.5/§6).
pub fn write_all(
    dir: &Path,
    dates: &HashMap<u32, DateStore>,
    app: &AppTables,
) -> StoreResult<()> {
    std::fs::create_dir_all(dir)?;

    write_file_atomic(
        &dir.join("I32_DATES.db"),
        &write_dates_index(dates.keys().copied().collect()),
    )?;

    let mut db_props = app.db_props.clone();
    db_props.insert_or_replace(DB_PROPS_VERSION.to_string(), CURRENT_VERSION);
    write_file_atomic(&dir.join("SI32_DB_PROPS.db"), &write_flat_si32(&db_props))?;
    write_file_atomic(
        &dir.join("SI32_CNT_OVERALL.db"),
        &write_flat_si32(&app.cnt_overall),
    )?;
    write_file_atomic(&dir.join("SI32_SEQS.db"), &write_flat_si32(&app.seqs))?;
    write_file_atomic(
        &dir.join("SI08_METH_PROTO.db"),
        &write_flat_si08(&app.meth_proto),
    )?;
    write_file_atomic(
        &dir.join("SS32_HOSTNAMES.db"),
        &write_flat_ss32(&app.hostnames),
    )?;
    write_file_atomic(
        &dir.join("SS32_JSON_LOGFMT.db"),
        &write_flat_ss32(&app.json_logfmt),
    )?;
    write_file_atomic(
        &dir.join("IGLP_LAST_PARSE.db"),
        &write_last_parse(&app.last_parse),
    )?;

    let mut sorted_dates: Vec<u32> = dates.keys().copied().collect();
    sorted_dates.sort_unstable();

    let unique_keys: Vec<_> = sorted_dates
        .iter()
        .map(|&d| (d, dates[&d].global.unique_keys.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(&dir.join("II32_UNIQUE_KEYS.db"), &write_dated_ii32(&unique_keys))?;

    let agent_keys: Vec<_> = sorted_dates
        .iter()
        .map(|&d| (d, dates[&d].global.agent_keys.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(&dir.join("II32_AGENT_KEYS.db"), &write_dated_ii32(&agent_keys))?;

    let agent_vals: Vec<_> = sorted_dates
        .iter()
        .map(|&d| {
            (
                d,
                dates[&d]
                    .global
                    .agent_vals
                    .iter()
                    .map(|(&k, v)| (k, v.clone()))
                    .collect(),
            )
        })
        .collect();
    write_file_atomic(&dir.join("IS32_AGENT_VALS.db"), &write_dated_is32(&agent_vals))?;

    let cnt_valid: Vec<_> = sorted_dates
        .iter()
        .map(|&d| (d, vec![(GLOBAL_COUNTER_KEY, dates[&d].global.cnt_valid.get_or_zero(&GLOBAL_COUNTER_KEY))]))
        .collect();
    write_file_atomic(&dir.join("II32_CNT_VALID.db"), &write_dated_ii32(&cnt_valid))?;

    let cnt_bw: Vec<_> = sorted_dates
        .iter()
        .map(|&d| (d, vec![(GLOBAL_COUNTER_KEY, dates[&d].global.cnt_bw.get_or_zero(&GLOBAL_COUNTER_KEY))]))
        .collect();
    write_file_atomic(&dir.join("IU64_CNT_BW.db"), &write_dated_iu64(&cnt_bw))?;

    for module in ALL_MODULES {
        write_module(dir, module, &sorted_dates, dates)?;
    }

    Ok(())
}

fn write_module(
    dir: &Path,
    module: Module,
    sorted_dates: &[u32],
    dates: &HashMap<u32, DateStore>,
) -> StoreResult<()> {
    let store_for = |d: &u32| dates[d].module(module);

    let keymap: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).keymap.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::KeyMap),
        &write_dated_ii32(&keymap),
    )?;

    let rootmap: Vec<_> = sorted_dates
        .iter()
        .map(|d| {
            (
                *d,
                store_for(d).rootmap.iter().map(|(&k, v)| (k, v.clone())).collect(),
            )
        })
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::RootMap),
        &write_dated_is32(&rootmap),
    )?;

    let datamap: Vec<_> = sorted_dates
        .iter()
        .map(|d| {
            (
                *d,
                store_for(d).datamap.iter().map(|(&k, v)| (k, v.clone())).collect(),
            )
        })
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::DataMap),
        &write_dated_is32(&datamap),
    )?;

    let uniqmap: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).uniqmap.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::UniqMap),
        &write_dated_u648(&uniqmap),
    )?;

    let root: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).root.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Root),
        &write_dated_ii32(&root),
    )?;

    let hits: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).hits.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Hits),
        &write_dated_ii32(&hits),
    )?;

    let visitors: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).visitors.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Visitors),
        &write_dated_ii32(&visitors),
    )?;

    let bw: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).bw.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Bw),
        &write_dated_iu64(&bw),
    )?;

    let cumts: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).cumts.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::CumTs),
        &write_dated_iu64(&cumts),
    )?;

    let maxts: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).maxts.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::MaxTs),
        &write_dated_iu64(&maxts),
    )?;

    let methods: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).methods.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Methods),
        &write_dated_ii08(&methods),
    )?;

    let protocols: Vec<_> = sorted_dates
        .iter()
        .map(|d| (*d, store_for(d).protocols.iter().map(|(&k, &v)| (k, v)).collect()))
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Protocols),
        &write_dated_ii08(&protocols),
    )?;

    let agents: Vec<_> = sorted_dates
        .iter()
        .map(|d| {
            (
                *d,
                store_for(d)
                    .agents
                    .iter()
                    .flat_map(|(&host, list)| list.iter().map(move |&agent| (host, agent)))
                    .collect(),
            )
        })
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Agents),
        &write_dated_ii32(&agents),
    )?;

    let metadata: Vec<_> = sorted_dates
        .iter()
        .map(|d| {
            (
                *d,
                store_for(d)
                    .metadata
                    .iter()
                    .flat_map(|(&host, list)| list.iter().map(move |&v| (host, v)))
                    .collect(),
            )
        })
        .collect();
    write_file_atomic(
        &module_metric_path(dir, module, ModuleMetric::Metadata),
        &write_dated_ii32(&metadata),
    )?;

    Ok(())
}

/// Restores every persisted metric from `dir`, applying `keep_last` to the
/// dates index before loading anything else (`spec.md` §3 "Lifecycle"), and
/// transparently migrating legacy per-module files it encounters.
pub fn read_all(
    dir: &Path,
    keep_last: Option<usize>,
) -> StoreResult<(HashMap<u32, DateStore>, AppTables)> {
    let mut app = AppTables::new();

    if let Some(bytes) = try_read(&dir.join("SI32_SEQS.db"))? {
        match read_flat_si32(&bytes) {
            Ok(t) => app.seqs = t,
            Err(e) => warn!(%e, "SI32_SEQS.db corrupted, starting empty"),
        }
    }
    if let Some(bytes) = try_read(&dir.join("SI32_CNT_OVERALL.db"))? {
        match read_flat_si32(&bytes) {
            Ok(t) => app.cnt_overall = t,
            Err(e) => warn!(%e, "SI32_CNT_OVERALL.db corrupted, starting empty"),
        }
    }
    if let Some(bytes) = try_read(&dir.join("SI32_DB_PROPS.db"))? {
        match read_flat_si32(&bytes) {
            Ok(t) => app.db_props = t,
            Err(e) => warn!(%e, "SI32_DB_PROPS.db corrupted, starting empty"),
        }
    }
    if let Some(bytes) = try_read(&dir.join("SS32_HOSTNAMES.db"))? {
        match read_flat_ss32(&bytes) {
            Ok(t) => app.hostnames = t,
            Err(e) => warn!(%e, "SS32_HOSTNAMES.db corrupted, starting empty"),
        }
    }
    if let Some(bytes) = try_read(&dir.join("SS32_JSON_LOGFMT.db"))? {
        match read_flat_ss32(&bytes) {
            Ok(t) => app.json_logfmt = t,
            Err(e) => warn!(%e, "SS32_JSON_LOGFMT.db corrupted, starting empty"),
        }
    }
    if let Some(bytes) = try_read(&dir.join("IGLP_LAST_PARSE.db"))? {
        match read_last_parse(&bytes) {
            Ok(t) => app.last_parse = t,
            Err(e) => warn!(%e, "IGLP_LAST_PARSE.db corrupted, starting empty"),
        }
    }
    // METH_PROTO must load before any II08 migration (resolves the third
    // Open Question carried from spec.md §9).
    if let Some(bytes) = try_read(&dir.join("SI08_METH_PROTO.db"))? {
        match read_flat_si08(&bytes) {
            Ok(t) => app.meth_proto = t,
            Err(e) => warn!(%e, "SI08_METH_PROTO.db corrupted, starting empty"),
        }
    }

    let mut kept_dates = match try_read(&dir.join("I32_DATES.db"))? {
        Some(bytes) => read_dates_index(&bytes).unwrap_or_default(),
        None => Vec::new(),
    };
    kept_dates.sort_unstable();
    if let Some(n) = keep_last {
        let drop = kept_dates.len().saturating_sub(n);
        kept_dates.drain(..drop);
    }
    let keep: std::collections::HashSet<u32> = kept_dates.iter().copied().collect();

    let mut dates: HashMap<u32, DateStore> = kept_dates.iter().map(|&d| (d, DateStore::new())).collect();

    for (date, entries) in load_unique_keys_with_migration(dir) {
        if !keep.contains(&date) {
            continue;
        }
        let ds = dates.entry(date).or_default();
        for (k, v) in entries {
            ds.global.unique_keys.insert_or_replace(k, v);
        }
    }
    load_dated_ii32_into(dir, "II32_AGENT_KEYS.db", &keep, &mut dates, |ds, _, entries| {
        for (k, v) in entries {
            ds.global.agent_keys.insert_or_replace(k, v);
        }
    });
    load_dated_is32_into(dir, "IS32_AGENT_VALS.db", &keep, &mut dates, |ds, _, entries| {
        for (k, v) in entries {
            ds.global.agent_vals.insert_or_replace(k, v);
        }
    });
    load_dated_ii32_into(dir, "II32_CNT_VALID.db", &keep, &mut dates, |ds, _, entries| {
        for (_, v) in entries {
            ds.global.cnt_valid.insert_or_replace(GLOBAL_COUNTER_KEY, v);
        }
    });
    load_dated_iu64_into(dir, "IU64_CNT_BW.db", &keep, &mut dates, |ds, _, entries| {
        for (_, v) in entries {
            ds.global.cnt_bw.insert_or_replace(GLOBAL_COUNTER_KEY, v);
        }
    });

    for module in ALL_MODULES {
        read_module(dir, module, &keep, &mut dates, &app.meth_proto);
    }

    Ok((dates, app))
}

fn load_dated_ii32_into(
    dir: &Path,
    filename: &str,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    mut apply: impl FnMut(&mut DateStore, u32, Vec<(u32, u32)>),
) {
    let path = dir.join(filename);
    let Ok(Some(bytes)) = try_read(&path) else {
        return;
    };
    match read_dated_ii32(&bytes) {
        Ok(dated) => {
            for (date, entries) in dated {
                if !keep.contains(&date) {
                    continue;
                }
                let ds = dates.entry(date).or_default();
                apply(ds, date, entries);
            }
        }
        Err(e) => warn!(?path, %e, "corrupted file, loading empty"),
    }
}

fn load_dated_iu64_into(
    dir: &Path,
    filename: &str,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    mut apply: impl FnMut(&mut DateStore, u32, Vec<(u32, u64)>),
) {
    let path = dir.join(filename);
    let Ok(Some(bytes)) = try_read(&path) else {
        return;
    };
    match read_dated_iu64(&bytes) {
        Ok(dated) => {
            for (date, entries) in dated {
                if !keep.contains(&date) {
                    continue;
                }
                let ds = dates.entry(date).or_default();
                apply(ds, date, entries);
            }
        }
        Err(e) => warn!(?path, %e, "corrupted file, loading empty"),
    }
}

fn load_dated_is32_into(
    dir: &Path,
    filename: &str,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    mut apply: impl FnMut(&mut DateStore, u32, Vec<(u32, String)>),
) {
    let path = dir.join(filename);
    let Ok(Some(bytes)) = try_read(&path) else {
        return;
    };
    match read_dated_is32(&bytes) {
        Ok(dated) => {
            for (date, entries) in dated {
                if !keep.contains(&date) {
                    continue;
                }
                let ds = dates.entry(date).or_default();
                apply(ds, date, entries);
            }
        }
        Err(e) => warn!(?path, %e, "corrupted file, loading empty"),
    }
}

fn read_module(
    dir: &Path,
    module: Module,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    meth_proto: &Table<String, u8>,
) {
    for (date, entries) in load_module_ii32_with_migration(dir, module, ModuleMetric::KeyMap) {
        if !keep.contains(&date) {
            continue;
        }
        let ds = dates.entry(date).or_default();
        let store = ds.module_mut(module);
        for (k, v) in entries {
            store.keymap.insert_or_replace(k, v);
        }
    }

    load_module_dated_is32(dir, module, ModuleMetric::RootMap, keep, dates, |s, e| {
        for (k, v) in e {
            s.rootmap.insert_or_replace(k, v);
        }
    });
    load_module_dated_is32(dir, module, ModuleMetric::DataMap, keep, dates, |s, e| {
        for (k, v) in e {
            s.datamap.insert_or_replace(k, v);
        }
    });
    load_module_dated_u648(dir, module, ModuleMetric::UniqMap, keep, dates, |s, e| {
        for (k, v) in e {
            s.uniqmap.insert_or_replace(k, v);
        }
    });
    load_module_dated_ii32(dir, module, ModuleMetric::Root, keep, dates, |s, e| {
        for (k, v) in e {
            s.root.insert_or_replace(k, v);
        }
    });
    load_module_dated_ii32(dir, module, ModuleMetric::Hits, keep, dates, |s, e| {
        for (k, v) in e {
            s.hits.insert_or_replace(k, v);
        }
    });
    load_module_dated_ii32(dir, module, ModuleMetric::Visitors, keep, dates, |s, e| {
        for (k, v) in e {
            s.visitors.insert_or_replace(k, v);
        }
    });
    load_module_dated_iu64(dir, module, ModuleMetric::Bw, keep, dates, |s, e| {
        for (k, v) in e {
            s.bw.insert_or_replace(k, v);
        }
    });
    load_module_dated_iu64(dir, module, ModuleMetric::CumTs, keep, dates, |s, e| {
        for (k, v) in e {
            s.cumts.insert_or_replace(k, v);
        }
    });
    load_module_dated_iu64(dir, module, ModuleMetric::MaxTs, keep, dates, |s, e| {
        for (k, v) in e {
            s.maxts.insert_or_replace(k, v);
        }
    });

    for (date, entries) in
        load_module_ii08_with_migration(dir, module, ModuleMetric::Methods, meth_proto)
    {
        if !keep.contains(&date) {
            continue;
        }
        let ds = dates.entry(date).or_default();
        let store = ds.module_mut(module);
        for (k, v) in entries {
            store.methods.insert_or_replace(k, v);
        }
    }
    for (date, entries) in
        load_module_ii08_with_migration(dir, module, ModuleMetric::Protocols, meth_proto)
    {
        if !keep.contains(&date) {
            continue;
        }
        let ds = dates.entry(date).or_default();
        let store = ds.module_mut(module);
        for (k, v) in entries {
            store.protocols.insert_or_replace(k, v);
        }
    }

    load_module_dated_ii32(dir, module, ModuleMetric::Agents, keep, dates, |s, e| {
        for (host, agent) in e {
            s.agents.push_unique(host, agent);
        }
    });
    load_module_dated_ii32(dir, module, ModuleMetric::Metadata, keep, dates, |s, e| {
        for (host, v) in e {
            s.metadata.push_unique(host, v);
        }
    });
}

fn load_module_dated_ii32(
    dir: &Path,
    module: Module,
    metric: ModuleMetric,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    mut apply: impl FnMut(&mut ModuleStore, Vec<(u32, u32)>),
) {
    let path = module_metric_path(dir, module, metric);
    let Ok(Some(bytes)) = try_read(&path) else {
        return;
    };
    match read_dated_ii32(&bytes) {
        Ok(dated) => {
            for (date, entries) in dated {
                if !keep.contains(&date) {
                    continue;
                }
                let ds = dates.entry(date).or_default();
                apply(ds.module_mut(module), entries);
            }
        }
        Err(e) => warn!(?path, %e, "corrupted file, loading empty"),
    }
}

fn load_module_dated_iu64(
    dir: &Path,
    module: Module,
    metric: ModuleMetric,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    mut apply: impl FnMut(&mut ModuleStore, Vec<(u32, u64)>),
) {
    let path = module_metric_path(dir, module, metric);
    let Ok(Some(bytes)) = try_read(&path) else {
        return;
    };
    match read_dated_iu64(&bytes) {
        Ok(dated) => {
            for (date, entries) in dated {
                if !keep.contains(&date) {
                    continue;
                }
                let ds = dates.entry(date).or_default();
                apply(ds.module_mut(module), entries);
            }
        }
        Err(e) => warn!(?path, %e, "corrupted file, loading empty"),
    }
}

fn load_module_dated_is32(
    dir: &Path,
    module: Module,
    metric: ModuleMetric,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    mut apply: impl FnMut(&mut ModuleStore, Vec<(u32, String)>),
) {
    let path = module_metric_path(dir, module, metric);
    let Ok(Some(bytes)) = try_read(&path) else {
        return;
    };
    match read_dated_is32(&bytes) {
        Ok(dated) => {
            for (date, entries) in dated {
                if !keep.contains(&date) {
                    continue;
                }
                let ds = dates.entry(date).or_default();
                apply(ds.module_mut(module), entries);
            }
        }
        Err(e) => warn!(?path, %e, "corrupted file, loading empty"),
    }
}

fn load_module_dated_u648(
    dir: &Path,
    module: Module,
    metric: ModuleMetric,
    keep: &std::collections::HashSet<u32>,
    dates: &mut HashMap<u32, DateStore>,
    mut apply: impl FnMut(&mut ModuleStore, Vec<(u64, u8)>),
) {
    let path = module_metric_path(dir, module, metric);
    let Ok(Some(bytes)) = try_read(&path) else {
        return;
    };
    match read_dated_u648(&bytes) {
        Ok(dated) => {
            for (date, entries) in dated {
                if !keep.contains(&date) {
                    continue;
                }
                let ds = dates.entry(date).or_default();
                apply(ds.module_mut(module), entries);
            }
        }
        Err(e) => warn!(?path, %e, "corrupted file, loading empty"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::app::AppTables;

    /// Writes the legacy dated `SI32` format (`A(iA(su))`) a pre-migration
    /// `SI32_UNIQUE_KEYS.db`/`SI32_KEYMAP.db` file used, for migration tests.
    fn write_legacy_dated_si32(dates: &[(u32, Vec<(String, u32)>)]) -> Vec<u8> {
        let mut w = TplWriter::new("A(iA(su))");
        w.write_u32(dates.len() as u32);
        for (d, entries) in dates {
            w.write_u32(*d);
            w.write_u32(entries.len() as u32);
            for (k, v) in entries {
                w.write_string(k);
                w.write_u32(*v);
            }
        }
        w.into_bytes()
    }

    #[test]
    fn restore_migrates_legacy_unique_keys() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path()).unwrap();
        write_file_atomic(
            &tmp.path().join("I32_DATES.db"),
            &write_dates_index(vec![20250101]),
        )
        .unwrap();
        let legacy = write_legacy_dated_si32(&[(
            20250101,
            vec![("1.2.3.4|20250101|Mozilla/5.0".to_string(), 7u32)],
        )]);
        write_file_atomic(&tmp.path().join("SI32_UNIQUE_KEYS.db"), &legacy).unwrap();

        let (restored, _) = read_all(tmp.path(), None).unwrap();

        let ds = &restored[&20250101];
        assert_eq!(ds.global.unique_keys.len(), 1);
        assert_eq!(
            ds.global.unique_keys.values().next().copied(),
            Some(7)
        );
        assert!(!tmp.path().join("SI32_UNIQUE_KEYS.db").exists());
    }

    #[test]
    fn round_trips_an_empty_database() {
        let tmp = tempfile::tempdir().unwrap();
        let dates: HashMap<u32, DateStore> = HashMap::new();
        let app = AppTables::new();
        write_all(tmp.path(), &dates, &app).unwrap();
        let (restored_dates, restored_app) = read_all(tmp.path(), None).unwrap();
        assert!(restored_dates.is_empty());
        assert_eq!(
            restored_app.db_props.get(DB_PROPS_VERSION),
            Some(&CURRENT_VERSION)
        );
    }

    #[test]
    fn round_trips_a_populated_module() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dates = HashMap::new();
        let mut ds = DateStore::new();
        ds.module_mut(Module::Requests).keymap.insert(42, 1);
        ds.module_mut(Module::Requests).datamap.insert(1, "/a".to_string());
        ds.module_mut(Module::Requests).hits.insert(1, 9);
        dates.insert(20250101, ds);
        let app = AppTables::new();

        write_all(tmp.path(), &dates, &app).unwrap();
        let (restored, _) = read_all(tmp.path(), None).unwrap();

        let store = restored[&20250101].module(Module::Requests);
        assert_eq!(store.keymap.get(&42), Some(&1));
        assert_eq!(store.datamap.get(&1).map(String::as_str), Some("/a"));
        assert_eq!(store.hits.get_or_zero(&1), 9);
    }

    #[test]
    fn keep_last_drops_older_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dates = HashMap::new();
        dates.insert(20250101, DateStore::new());
        dates.insert(20250102, DateStore::new());
        dates.insert(20250103, DateStore::new());
        let app = AppTables::new();
        write_all(tmp.path(), &dates, &app).unwrap();

        let (restored, _) = read_all(tmp.path(), Some(2)).unwrap();
        let mut kept: Vec<u32> = restored.keys().copied().collect();
        kept.sort_unstable();
        assert_eq!(kept, vec![20250102, 20250103]);
    }
}
