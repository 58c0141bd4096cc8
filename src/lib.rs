// ABOUTME: Library module for pg-scriptkit
// ABOUTME: Exports script migration, introspection and bulk transfer for the binary and tests

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod migration;
pub mod postgres;
pub mod uri;
pub mod utils;

pub use error::MigrateError;
