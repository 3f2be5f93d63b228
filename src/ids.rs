//! The key-interning pipeline (`spec.md` §3, §4.3): raw log fields become
//! globally unique 32-bit identifiers by going through a named sequence
//! counter. `0` is reserved as "absent"; the first id issued for any
//! sequence is `1`.

use crate::hash::djb2;
use crate::module::Module;
use crate::table::Table;

/// Named auto-increment counters (`SEQS`). One table, many independent
/// sequences distinguished by name — e.g. `"ht_unique_keys"`, or
/// `"ht_keymap_<module>"` per module.
pub type Sequences = Table<String, u32>;

/// Bumps the named sequence and returns the new value. The first call for
/// any given `name` returns `1`.
pub fn next_id(seqs: &mut Sequences, name: &str) -> u32 {
    if let Some(&existing) = seqs.get(name) {
        let next = existing + 1;
        seqs.insert_or_replace(name.to_string(), next);
        next
    } else {
        seqs.insert_or_replace(name.to_string(), 1);
        1
    }
}

/// The sequence name backing a given module's `KEYMAP`/cache `KEYMAP`.
pub fn keymap_sequence_name(module: Module) -> String {
    format!("ht_keymap_{}", module.as_str())
}

/// The sequence name backing a module's aggregation-cache `KEYMAP` —
/// independent from the per-date `KEYMAP` sequence (`spec.md` glossary:
/// "Cache id (ck): monotonic u32 ... independent of per-date hit ids").
pub fn cache_sequence_name(module: Module) -> String {
    format!("ht_cache_{}", module.as_str())
}

/// The sequence name backing the global unique-visitor keymap.
pub const UNIQUE_KEYS_SEQUENCE: &str = "ht_unique_keys";

/// Interns a raw string into a module's per-date `KEYMAP` (or the
/// equivalent cache `KEYMAP`/global `UNIQUE_KEYS` table, which share this
/// shape): `keymap` maps `djb2(raw)` to an id drawn from `seq_name`.
///
/// Returns `(id, was_fresh)`. Calling this twice with the same `raw` within
/// a run always returns the same `id` (`spec.md` §8 property 1).
pub fn intern(
    keymap: &mut Table<u32, u32>,
    seqs: &mut Sequences,
    seq_name: &str,
    raw: &str,
) -> (u32, bool) {
    intern_hashed(keymap, seqs, seq_name, djb2(raw))
}

/// As [`intern`], but takes an already-computed `djb2` hash directly. Used
/// by the aggregation cache, which re-keys off the hash a dated `KEYMAP`
/// already stored rather than re-hashing the original string
/// (`spec.md` §4.4: cache ids are "assigned strictly monotonically ...
/// as new `djb2(s)` keys are seen").
pub fn intern_hashed(
    keymap: &mut Table<u32, u32>,
    seqs: &mut Sequences,
    seq_name: &str,
    hash_key: u32,
) -> (u32, bool) {
    if let Some(&id) = keymap.get(&hash_key) {
        (id, false)
    } else {
        let id = next_id(seqs, seq_name);
        keymap.insert_or_replace(hash_key, id);
        (id, true)
    }
}

/// Interns a method/protocol string into `METH_PROTO`: auto-incrementing,
/// append-only (`spec.md` §3 invariant: "never deletes; ... immutable for
/// the run"). Next id is `size + 1`, matching the original's
/// `kh_size(meth_proto) + 1` scheme rather than a separate sequence.
pub fn intern_meth_proto(meth_proto: &mut Table<String, u8>, s: &str) -> u8 {
    if let Some(&id) = meth_proto.get(s) {
        id
    } else {
        let id = (meth_proto.len() + 1) as u8;
        meth_proto.insert_or_replace(s.to_string(), id);
        id
    }
}

/// Encodes the `(visitor_id, hit_id)` composite key `UNIQMAP` uses to
/// detect repeat visits to the same hit within a run, by bit-concatenation
/// into a u64 (`spec.md` design note "Composite u64 key").
pub const fn encode_uniqmap_key(visitor_id: u32, hit_id: u32) -> u64 {
    ((visitor_id as u64) << 32) | (hit_id as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_starts_at_one_and_is_monotonic() {
        let mut seqs = Sequences::new();
        assert_eq!(next_id(&mut seqs, "x"), 1);
        assert_eq!(next_id(&mut seqs, "x"), 2);
        assert_eq!(next_id(&mut seqs, "x"), 3);
        // independent sequence starts fresh
        assert_eq!(next_id(&mut seqs, "y"), 1);
    }

    #[test]
    fn intern_is_idempotent() {
        let mut keymap = Table::new();
        let mut seqs = Sequences::new();
        let (id1, fresh1) = intern(&mut keymap, &mut seqs, "s", "/index.php");
        let (id2, fresh2) = intern(&mut keymap, &mut seqs, "s", "/index.php");
        assert_eq!(id1, id2);
        assert!(fresh1);
        assert!(!fresh2);
    }

    #[test]
    fn intern_meth_proto_assigns_stable_ids_without_reassignment() {
        let mut mp = Table::new();
        assert_eq!(intern_meth_proto(&mut mp, "GET"), 1);
        assert_eq!(intern_meth_proto(&mut mp, "POST"), 2);
        assert_eq!(intern_meth_proto(&mut mp, "GET"), 1);
    }

    #[test]
    fn uniqmap_key_round_trips_components() {
        let k = encode_uniqmap_key(7, 9);
        assert_eq!(k >> 32, 7);
        assert_eq!(k & 0xffff_ffff, 9);
    }
}
