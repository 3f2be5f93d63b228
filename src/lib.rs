//! `accessdb`: the in-memory analytics store of a web-log analyzer.
//!
//! A schema-driven, date-partitioned, typed hash-table registry that
//! ingests parsed HTTP access records and supports aggregation queries
//! (hits, visitors, bandwidth, cumulative/maximum time-to-serve, per-module
//! top-N), plus optional persistence to disk so subsequent runs resume
//! incrementally.
//!
//! Log-line parsing, rendering, CLI/config loading, and hostname resolution
//! are external concerns — this crate is the storage core a parser writes
//! through and a renderer reads from.

pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod ids;
pub mod module;
pub mod persist;
pub mod schema;
pub mod store;
pub mod table;
pub mod variant;

pub use config::StoreConfig;
pub use db::{Database, IngestRecord, RecordOutcome};
pub use error::{InsertOutcome, StoreError, StoreResult};
pub use module::Module;
