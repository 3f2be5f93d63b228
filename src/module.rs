//! The closed set of report categories a [`crate::store::ModuleStore`] exists for.
//!
//! `spec.md` lists `parse_module`/`module_to_string` as dependencies the core
//! takes on the outside, but the persistence layer needs the module's name to
//! build a filename (`<TYPE>_<MODULE>_<METRIC>.db`) and the dated store is
//! indexed by this type directly, so the enum itself lives here.

use std::fmt;
use std::str::FromStr;

/// A report category. Closed enumeration — one [`crate::store::ModuleStore`]
/// exists per variant, per active date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Module {
    Visitors = 0,
    Requests = 1,
    RequestsStatic = 2,
    NotFound = 3,
    Hosts = 4,
    OperatingSystems = 5,
    Browsers = 6,
    Visit404 = 7,
    Referrers = 8,
    ReferringSites = 9,
    Keyphrases = 10,
    Geolocation = 11,
    Status = 12,
    Vhosts = 13,
}

/// Total number of modules. Used to size fixed-length per-module arrays.
pub const MODULE_COUNT: usize = 14;

/// All modules in declaration order, for iterating "every module" loops.
pub const ALL_MODULES: [Module; MODULE_COUNT] = [
    Module::Visitors,
    Module::Requests,
    Module::RequestsStatic,
    Module::NotFound,
    Module::Hosts,
    Module::OperatingSystems,
    Module::Browsers,
    Module::Visit404,
    Module::Referrers,
    Module::ReferringSites,
    Module::Keyphrases,
    Module::Geolocation,
    Module::Status,
    Module::Vhosts,
];

impl Module {
    /// Array index for O(1) indexing into fixed-size per-module tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lowercase filename stem used by the persistence codec, e.g. `requests`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Module::Visitors => "visitors",
            Module::Requests => "requests",
            Module::RequestsStatic => "requests_static",
            Module::NotFound => "not_found",
            Module::Hosts => "hosts",
            Module::OperatingSystems => "os",
            Module::Browsers => "browsers",
            Module::Visit404 => "visit_404",
            Module::Referrers => "referrers",
            Module::ReferringSites => "referring_sites",
            Module::Keyphrases => "keyphrases",
            Module::Geolocation => "geolocation",
            Module::Status => "status",
            Module::Vhosts => "vhosts",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`Module::from_str`] for an unrecognized module name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseModuleError(pub String);

impl fmt::Display for ParseModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized module name: {:?}", self.0)
    }
}

impl std::error::Error for ParseModuleError {}

impl FromStr for Module {
    type Err = ParseModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_MODULES
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseModuleError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        for m in ALL_MODULES {
            assert_eq!(Module::from_str(m.as_str()).unwrap(), m);
        }
    }

    #[test]
    fn index_matches_declaration_order() {
        for (i, m) in ALL_MODULES.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
    }

    #[test]
    fn rejects_unknown_name() {
        assert!(Module::from_str("bogus").is_err());
    }
}
