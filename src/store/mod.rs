//! Storage layout (`spec.md` §3): process-wide, per-date, and aggregated
//! views over the typed tables in [`crate::table`].

pub mod app;
pub mod cache;
pub mod date;

pub use app::{AppTables, LastParse};
pub use cache::{Cache, HitContribution, TopEntry, TopStringEntry};
pub use date::{DateStore, GlobalStore, ModuleStore};
