// ABOUTME: Versioned script discovery, application and target bootstrapping
// ABOUTME: Collects change scripts, applies them in order, creates databases and schemas

pub mod apply;
pub mod bootstrap;
pub mod collect;

pub use apply::{Applier, ApplyContext, ChunkExecutor, CommandExecutor, SqlExecutor};
pub use bootstrap::{bootstrap_database, bootstrap_schema};
pub use collect::{collect, ScriptChunk, VersionToken};
