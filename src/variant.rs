//! The closed family of ten concrete map types (`spec.md` §4.1) as one
//! tagged enum, so the schema (§4.2) can dispatch on a metric's tag without
//! the caller needing to know the concrete `K`/`V` at the call site — the
//! Rust replacement for the C union-plus-enum-cast (see DESIGN NOTES,
//! "Union-tagged maps").

use crate::table::Table;

/// Which of the ten concrete map shapes a metric uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantTag {
    /// u32 key, u32 value — counters.
    II32,
    /// u32 key, u8 value — small-domain ids (method, protocol).
    II08,
    /// u32 key, owned string value.
    IS32,
    /// u32 key, u64 value — bandwidth, timings.
    IU64,
    /// owned string key, u32 value — interning.
    SI32,
    /// owned string key, u8 value — method/protocol intern.
    SI08,
    /// owned string key, owned string value — hostnames, json fmt.
    SS32,
    /// owned string key, u64 value — metadata.
    SU64,
    /// u64 key, u8 value — composite-key set membership.
    U648,
    /// u32 key, list-of-u32 value — host to agents fan-out.
    IGSL,
}

impl VariantTag {
    /// The name used as the `<TYPE>` component of a persisted filename
    /// (`spec.md` §6), e.g. `SI32_SEQS.db`.
    pub const fn file_prefix(self) -> &'static str {
        match self {
            VariantTag::II32 => "II32",
            VariantTag::II08 => "II08",
            VariantTag::IS32 => "IS32",
            VariantTag::IU64 => "IU64",
            VariantTag::SI32 => "SI32",
            VariantTag::SI08 => "SI08",
            VariantTag::SS32 => "SS32",
            VariantTag::SU64 => "SU64",
            VariantTag::U648 => "U648",
            VariantTag::IGSL => "IGSL",
        }
    }
}

/// A concrete instantiation of one of the ten map shapes.
#[derive(Debug, Clone)]
pub enum MetricTable {
    II32(Table<u32, u32>),
    II08(Table<u32, u8>),
    IS32(Table<u32, String>),
    IU64(Table<u32, u64>),
    SI32(Table<String, u32>),
    SI08(Table<String, u8>),
    SS32(Table<String, String>),
    SU64(Table<String, u64>),
    U648(Table<u64, u8>),
    IGSL(Table<u32, Vec<u32>>),
}

impl MetricTable {
    pub fn new(tag: VariantTag) -> Self {
        match tag {
            VariantTag::II32 => MetricTable::II32(Table::new()),
            VariantTag::II08 => MetricTable::II08(Table::new()),
            VariantTag::IS32 => MetricTable::IS32(Table::new()),
            VariantTag::IU64 => MetricTable::IU64(Table::new()),
            VariantTag::SI32 => MetricTable::SI32(Table::new()),
            VariantTag::SI08 => MetricTable::SI08(Table::new()),
            VariantTag::SS32 => MetricTable::SS32(Table::new()),
            VariantTag::SU64 => MetricTable::SU64(Table::new()),
            VariantTag::U648 => MetricTable::U648(Table::new()),
            VariantTag::IGSL => MetricTable::IGSL(Table::new()),
        }
    }

    pub fn tag(&self) -> VariantTag {
        match self {
            MetricTable::II32(_) => VariantTag::II32,
            MetricTable::II08(_) => VariantTag::II08,
            MetricTable::IS32(_) => VariantTag::IS32,
            MetricTable::IU64(_) => VariantTag::IU64,
            MetricTable::SI32(_) => VariantTag::SI32,
            MetricTable::SI08(_) => VariantTag::SI08,
            MetricTable::SS32(_) => VariantTag::SS32,
            MetricTable::SU64(_) => VariantTag::SU64,
            MetricTable::U648(_) => VariantTag::U648,
            MetricTable::IGSL(_) => VariantTag::IGSL,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MetricTable::II32(t) => t.len(),
            MetricTable::II08(t) => t.len(),
            MetricTable::IS32(t) => t.len(),
            MetricTable::IU64(t) => t.len(),
            MetricTable::SI32(t) => t.len(),
            MetricTable::SI08(t) => t.len(),
            MetricTable::SS32(t) => t.len(),
            MetricTable::SU64(t) => t.len(),
            MetricTable::U648(t) => t.len(),
            MetricTable::IGSL(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            MetricTable::II32(t) => t.clear(),
            MetricTable::II08(t) => t.clear(),
            MetricTable::IS32(t) => t.clear(),
            MetricTable::IU64(t) => t.clear(),
            MetricTable::SI32(t) => t.clear(),
            MetricTable::SI08(t) => t.clear(),
            MetricTable::SS32(t) => t.clear(),
            MetricTable::SU64(t) => t.clear(),
            MetricTable::U648(t) => t.clear(),
            MetricTable::IGSL(t) => t.clear(),
        }
    }
}

/// Narrows a `&MetricTable`/`&mut MetricTable` to its concrete instantiation,
/// panicking on a tag mismatch. Schema-driven code always knows the
/// expected tag for a given metric (see `schema.rs`), so a mismatch here
/// means a bug in this crate, not bad external input.
macro_rules! impl_narrow {
    ($fn_ref:ident, $fn_mut:ident, $variant:ident, $k:ty, $v:ty) => {
        impl MetricTable {
            pub fn $fn_ref(&self) -> &Table<$k, $v> {
                match self {
                    MetricTable::$variant(t) => t,
                    other => panic!(
                        "expected {:?}, found {:?}",
                        VariantTag::$variant,
                        other.tag()
                    ),
                }
            }

            pub fn $fn_mut(&mut self) -> &mut Table<$k, $v> {
                match self {
                    MetricTable::$variant(t) => t,
                    other => panic!(
                        "expected {:?}, found {:?}",
                        VariantTag::$variant,
                        other.tag()
                    ),
                }
            }
        }
    };
}

impl_narrow!(as_ii32, as_ii32_mut, II32, u32, u32);
impl_narrow!(as_ii08, as_ii08_mut, II08, u32, u8);
impl_narrow!(as_is32, as_is32_mut, IS32, u32, String);
impl_narrow!(as_iu64, as_iu64_mut, IU64, u32, u64);
impl_narrow!(as_si32, as_si32_mut, SI32, String, u32);
impl_narrow!(as_si08, as_si08_mut, SI08, String, u8);
impl_narrow!(as_ss32, as_ss32_mut, SS32, String, String);
impl_narrow!(as_su64, as_su64_mut, SU64, String, u64);
impl_narrow!(as_u648, as_u648_mut, U648, u64, u8);
impl_narrow!(as_igsl, as_igsl_mut, IGSL, u32, Vec<u32>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_produces_matching_tag() {
        for tag in [
            VariantTag::II32,
            VariantTag::II08,
            VariantTag::IS32,
            VariantTag::IU64,
            VariantTag::SI32,
            VariantTag::SI08,
            VariantTag::SS32,
            VariantTag::SU64,
            VariantTag::U648,
            VariantTag::IGSL,
        ] {
            assert_eq!(MetricTable::new(tag).tag(), tag);
        }
    }

    #[test]
    fn narrowing_gives_a_usable_table() {
        let mut mt = MetricTable::new(VariantTag::II32);
        mt.as_ii32_mut().insert(1, 42);
        assert_eq!(mt.as_ii32().get(&1), Some(&42));
    }

    #[test]
    #[should_panic]
    fn narrowing_wrong_tag_panics() {
        let mt = MetricTable::new(VariantTag::II32);
        let _ = mt.as_si32();
    }
}
