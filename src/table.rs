//! Generic typed-map primitive (`spec.md` §4.1).
//!
//! `Table<K, V>` is a thin wrapper over `std::collections::HashMap`, grounded
//! on the shape of the teacher's `StringInterner` (a bare `HashMap` field
//! plus a handful of named operations). The ten concrete variants named in
//! spec.md (`II32`, `II08`, `IS32`, `IU64`, `SI32`, `SI08`, `SS32`, `SU64`,
//! `U648`, `IGSL`) are all instantiations of this one generic type; see
//! [`crate::variant::MetricTable`] for the closed enum that ties a metric tag
//! to one specific instantiation.
//!
//! Ownership makes most of §4.1's "insert duplicates the key into
//! map-owned storage" and "failed inserts must not leak duplicates"
//! guarantees automatic: `String` keys/values are moved into the `HashMap`
//! on insert and dropped with it, and a failed `insert` (key already
//! present) simply drops the caller's value via normal Rust ownership.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::InsertOutcome;

/// A value type usable with `increment`/`max_assign`. Implemented for the
/// unsigned integer types that back the eight numeric metric variants.
pub trait Numeric: Copy + PartialOrd {
    const ZERO: Self;
    fn add(self, other: Self) -> Self;
}

macro_rules! impl_numeric {
    ($t:ty) => {
        impl Numeric for $t {
            const ZERO: Self = 0;
            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }
        }
    };
}
impl_numeric!(u8);
impl_numeric!(u16);
impl_numeric!(u32);
impl_numeric!(u64);

/// A typed hash table: one key type, one value type, uniform operations.
#[derive(Debug, Clone)]
pub struct Table<K, V> {
    map: HashMap<K, V>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self { map: HashMap::new() }
    }
}

impl<K: Eq + Hash, V> Table<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Inserts `v` under `k` only if `k` is absent. Returns whether it was
    /// fresh. A value passed in when the key is already present is simply
    /// dropped — there is nothing to "leak" in Rust's ownership model.
    pub fn insert(&mut self, k: K, v: V) -> InsertOutcome {
        if let std::collections::hash_map::Entry::Vacant(e) = self.map.entry(k) {
            e.insert(v);
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyPresent
        }
    }

    /// Inserts `v` under `k` unconditionally, replacing any prior value.
    pub fn insert_or_replace(&mut self, k: K, v: V) {
        self.map.insert(k, v);
    }

    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(k)
    }

    pub fn contains<Q>(&self, k: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(k)
    }

    pub fn remove<Q>(&mut self, k: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(k)
    }

    /// Clears all entries. `free_values` exists in the C API only because
    /// the map stores raw owned pointers it must explicitly free; here
    /// `Drop` handles that regardless, so clearing is unconditional.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values()
    }
}

impl<K: Eq + Hash + Clone, V: Numeric> Table<K, V> {
    /// Reads the value at `k`, treating an absent key as zero (never
    /// inserts).
    pub fn get_or_zero<Q>(&self, k: &Q) -> V
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(k).copied().unwrap_or(V::ZERO)
    }

    /// `m[k] = m.get(k).unwrap_or(0) + delta`, returning the new value.
    /// This is the only operation ever performed concurrently by multiple
    /// writers in the design this crate targets (see `SPEC_FULL.md` §5);
    /// callers needing true cross-thread atomicity wrap the owning
    /// [`crate::db::Database`] in a lock, the same way `StorageManager`
    /// leaves synchronization to its caller.
    pub fn increment(&mut self, k: K, delta: V) -> V {
        let entry = self.map.entry(k).or_insert(V::ZERO);
        *entry = entry.add(delta);
        *entry
    }

    /// `m[k] = max(m.get(k).unwrap_or(0), v)`, returning the new value.
    pub fn max_assign(&mut self, k: K, v: V) -> V {
        let entry = self.map.entry(k).or_insert(V::ZERO);
        if v > *entry {
            *entry = v;
        }
        *entry
    }
}

impl<K: Eq + Hash + Clone, T: PartialEq> Table<K, Vec<T>> {
    /// Appends `v` to the list at `k` unless it is already present
    /// (linear scan — see design note "List fan-out in IGSL" for why this
    /// is adequate for the small per-key lists `AGENTS`/`METADATA` hold).
    /// Returns whether `v` was newly added.
    pub fn push_unique(&mut self, k: K, v: T) -> bool {
        let list = self.map.entry(k).or_default();
        if list.contains(&v) {
            false
        } else {
            list.push(v);
            true
        }
    }

    /// Returns the fan-out list for `k`, or an empty slice if absent.
    pub fn list(&self, k: &K) -> &[T] {
        self.map.get(k).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_fresh_then_present() {
        let mut t: Table<u32, u32> = Table::new();
        assert_eq!(t.insert(1, 10), InsertOutcome::Inserted);
        assert_eq!(t.insert(1, 99), InsertOutcome::AlreadyPresent);
        assert_eq!(t.get(&1), Some(&10));
    }

    #[test]
    fn increment_from_absent_reads_as_zero() {
        let mut t: Table<u32, u64> = Table::new();
        assert_eq!(t.get_or_zero(&7), 0);
        for _ in 0..5 {
            t.increment(7, 1);
        }
        assert_eq!(t.get_or_zero(&7), 5);
    }

    #[test]
    fn max_assign_tracks_running_maximum() {
        let mut t: Table<u32, u64> = Table::new();
        t.max_assign(1, 5);
        t.max_assign(1, 3);
        t.max_assign(1, 7);
        assert_eq!(t.get_or_zero(&1), 7);
    }

    #[test]
    fn insert_or_replace_overwrites() {
        let mut t: Table<u32, String> = Table::new();
        t.insert_or_replace(1, "a".to_string());
        t.insert_or_replace(1, "b".to_string());
        assert_eq!(t.get(&1).map(String::as_str), Some("b"));
    }
}
