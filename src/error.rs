// ABOUTME: Typed failure taxonomy for discovery, application, bootstrap and transfer
// ABOUTME: Raised as the root cause inside anyhow errors so callers can downcast

use std::path::PathBuf;
use thiserror::Error;

/// Failure classes surfaced by the scriptkit operations.
///
/// Public functions return `anyhow::Result`; when one of these conditions is
/// the cause, the error can be recovered with
/// `err.downcast_ref::<MigrateError>()`.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Scripts directory (or a script inside it) missing or unreadable
    #[error("Cannot read scripts from {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A chunk failed while being applied; earlier chunks stay applied
    #[error("Script '{filename}' failed: {message}")]
    Application { filename: String, message: String },

    /// Target already exists and replacing it was not requested
    #[error("{kind} '{name}' already exists (pass --replace to drop and recreate it)")]
    BootstrapConflict { kind: TargetKind, name: String },

    /// Catalog query failed or returned something unusable
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// External tool exited with a non-zero status
    #[error("{tool} failed: {output}")]
    Transfer { tool: String, output: String },

    /// Alias configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// What a bootstrap call was creating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Database,
    Schema,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Database => write!(f, "Database"),
            TargetKind::Schema => write!(f, "Schema"),
        }
    }
}

impl MigrateError {
    pub fn application(filename: impl Into<String>, err: &anyhow::Error) -> Self {
        MigrateError::Application {
            filename: filename.into(),
            message: format!("{:#}", err),
        }
    }

    pub fn transfer(tool: impl Into<String>, output: impl Into<String>) -> Self {
        MigrateError::Transfer {
            tool: tool.into(),
            output: output.into(),
        }
    }
}
