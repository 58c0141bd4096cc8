// ABOUTME: Command implementations behind the CLI
// ABOUTME: Exports plan, bootstrap, inspect and transfer commands

pub mod bootstrap;
pub mod inspect;
pub mod transfer;

pub use bootstrap::{bootstrap, bootstrap_schema, plan};
pub use inspect::{database_exists, primary_key, table_exists, tables};
pub use transfer::{dump_table, export, import, query, restore_table};
