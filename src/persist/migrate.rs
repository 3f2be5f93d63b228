//! Legacy-format migration (`spec.md` §4.5 "Versioning"): rewrites
//! pre-version-2 persisted files into the shapes this crate reads natively,
//! then deletes the legacy file so it is never read twice.
//!
//! Per the third Open Question this crate resolves (`SPEC_FULL.md` §9):
//! `METH_PROTO` must be loaded before any `II08` migration runs, since
//! migrating `IS32 METHODS`/`PROTOCOLS` requires looking method/protocol
//! strings up in it.

use crate::hash::djb2;
use crate::table::Table;

/// `SI32 KEYMAP`/`SI32 AGENT_KEYS` -> `II32`: replace the string key with
/// `djb2(string)`. Collisions (two legacy strings sharing a `djb2` hash)
/// keep whichever entry is encountered last, matching a plain re-insert.
pub fn migrate_si32_to_ii32(legacy: Vec<(String, u32)>) -> Table<u32, u32> {
    let mut out = Table::new();
    for (k, v) in legacy {
        out.insert_or_replace(djb2(&k), v);
    }
    out
}

/// `SI32 UNIQUE_KEYS` -> `II32 UNIQUE_KEYS`: the composite key is
/// `IP|date|UA`; keep the first two fields, replace the third with
/// `djb2(UA)` rendered as lowercase hex, then hash the rebuilt composite
/// with `djb2`.
pub fn migrate_unique_keys(legacy: Vec<(String, u32)>) -> Table<u32, u32> {
    let mut out = Table::new();
    for (composite, v) in legacy {
        let mut parts = composite.splitn(3, '|');
        let (ip, date, ua) = match (parts.next(), parts.next(), parts.next()) {
            (Some(ip), Some(date), Some(ua)) => (ip, date, ua),
            _ => continue,
        };
        let rekeyed = format!("{ip}|{date}|{:08x}", djb2(ua));
        out.insert_or_replace(djb2(&rekeyed), v);
    }
    out
}

/// `IS32 METHODS`/`PROTOCOLS` -> `II08`: look the stored string up in
/// `METH_PROTO` and keep its small id instead of the string itself.
/// Strings absent from `meth_proto` (shouldn't happen if it was loaded
/// first) are dropped with a `tracing::warn!` at the call site.
pub fn migrate_is32_to_ii08(
    legacy: Vec<(u32, String)>,
    meth_proto: &Table<String, u8>,
) -> Table<u32, u8> {
    let mut out = Table::new();
    for (k, s) in legacy {
        if let Some(&id) = meth_proto.get(&s) {
            out.insert_or_replace(k, id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn si32_to_ii32_rekeys_by_djb2() {
        let legacy = vec![("/index.php".to_string(), 1u32), ("/about.php".to_string(), 2)];
        let migrated = migrate_si32_to_ii32(legacy);
        assert_eq!(migrated.get(&djb2("/index.php")), Some(&1));
        assert_eq!(migrated.get(&djb2("/about.php")), Some(&2));
    }

    #[test]
    fn is32_to_ii08_looks_up_meth_proto() {
        let mut meth_proto = Table::new();
        meth_proto.insert(String::from("GET"), 1u8);
        meth_proto.insert(String::from("POST"), 2);
        let legacy = vec![(10u32, "GET".to_string()), (11, "POST".to_string())];
        let migrated = migrate_is32_to_ii08(legacy, &meth_proto);
        assert_eq!(migrated.get(&10), Some(&1));
        assert_eq!(migrated.get(&11), Some(&2));
    }

    #[test]
    fn unique_keys_migration_preserves_ip_and_date() {
        let legacy = vec![("1.2.3.4|20250101|Mozilla/5.0".to_string(), 1u32)];
        let migrated = migrate_unique_keys(legacy);
        assert_eq!(migrated.len(), 1);
    }
}
