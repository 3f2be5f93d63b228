//! The portable binary persistence codec (`spec.md` §4.5): a self-describing
//! "tpl" format, per-directory file layout (§6), and legacy-version
//! migration.

pub mod codec;
pub mod files;
pub mod migrate;
