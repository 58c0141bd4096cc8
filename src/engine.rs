// ABOUTME: Engine-neutral traits for connections, catalog introspection and bulk transfer
// ABOUTME: Each supported database engine provides one implementation of these seams

use crate::error::MigrateError;
use crate::uri::ConnectionUri;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// An open connection bound to one database.
///
/// Dropping the handle closes the session.
#[async_trait]
pub trait DbHandle: Send + Sync {
    /// Send one or more statements verbatim; the server splits them.
    async fn batch_execute(&self, sql: &str) -> Result<()>;

    /// Run a parameterised query and return the first column of every row.
    async fn query_column(&self, sql: &str, params: &[&str]) -> Result<Vec<String>>;

    /// Run a parameterised query returning a single integer.
    async fn query_scalar(&self, sql: &str, params: &[&str]) -> Result<i64>;
}

/// Catalog lookups for one engine's dialect.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// User tables visible in the connected database
    async fn list_tables(&self, handle: &dyn DbHandle) -> Result<Vec<String>>;

    /// Whether `table` is one of the names [`Introspector::list_tables`] returns
    async fn table_exists(&self, handle: &dyn DbHandle, table: &str) -> Result<bool>;

    async fn schema_exists(&self, handle: &dyn DbHandle, schema: &str) -> Result<bool>;

    /// Whether the database named in `uri` exists, checked from the admin database
    async fn database_exists(&self, uri: &ConnectionUri) -> Result<bool>;

    /// Primary-key columns of `table` in key order. Empty when there is no key.
    async fn primary_key_columns(&self, handle: &dyn DbHandle, table: &str)
        -> Result<Vec<String>>;
}

/// Creating and dropping databases and schemas.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn connect(&self, uri: &ConnectionUri) -> Result<Box<dyn DbHandle>>;

    async fn create_database(&self, uri: &ConnectionUri) -> Result<()>;

    async fn drop_database(&self, uri: &ConnectionUri) -> Result<()>;

    async fn create_schema(&self, handle: &dyn DbHandle, schema: &str) -> Result<()>;

    async fn drop_schema(&self, handle: &dyn DbHandle, schema: &str) -> Result<()>;

    /// Make `schema` the default for unqualified names on this handle
    async fn use_schema(&self, handle: &dyn DbHandle, schema: &str) -> Result<()>;
}

/// Bulk export/import and table dump/restore through external client tools.
#[async_trait]
pub trait BulkTransfer: Send + Sync {
    /// Unload a table (bare name) or query result into `dest`
    async fn export_query(
        &self,
        uri: &ConnectionUri,
        query: &str,
        dest: &Path,
        format: &CopyFormat,
    ) -> Result<ToolOutput>;

    /// Load `source` into `table`
    async fn import_file(
        &self,
        uri: &ConnectionUri,
        table: &str,
        source: &CopySource,
        format: &CopyFormat,
    ) -> Result<ToolOutput>;

    async fn dump_table(
        &self,
        uri: &ConnectionUri,
        table: &str,
        dest: &Path,
        extra_args: &[String],
    ) -> Result<ToolOutput>;

    async fn restore_table(
        &self,
        uri: &ConnectionUri,
        table: &str,
        src: &Path,
        extra_args: &[String],
    ) -> Result<ToolOutput>;

    /// Run a query (or `select *` of a bare table name) with its output written to `dest`
    async fn run_query_to_file(
        &self,
        uri: &ConnectionUri,
        query: &str,
        dest: &Path,
    ) -> Result<ToolOutput>;
}

/// Fetch the primary key of `table`, failing when it has none
pub async fn require_primary_key<I>(
    introspector: &I,
    handle: &dyn DbHandle,
    table: &str,
) -> Result<Vec<String>>
where
    I: Introspector + ?Sized,
{
    let columns = introspector.primary_key_columns(handle, table).await?;
    if columns.is_empty() {
        return Err(MigrateError::Introspection(format!(
            "Table '{}' has no primary key",
            table
        ))
        .into());
    }
    Ok(columns)
}

/// Row encoding for COPY transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyFormat {
    /// Native binary COPY format
    Binary,
    /// Delimited text with a field separator and a NULL marker
    Text { delimiter: String, null: String },
}

impl CopyFormat {
    pub fn text(delimiter: impl Into<String>, null: impl Into<String>) -> Self {
        CopyFormat::Text {
            delimiter: delimiter.into(),
            null: null.into(),
        }
    }
}

/// Tab-separated with `\N` for NULL, the server's own text default
impl Default for CopyFormat {
    fn default() -> Self {
        CopyFormat::text("\t", "\\N")
    }
}

/// Where an import reads its rows from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopySource {
    File(PathBuf),
    /// This process's own standard input
    Stdin,
}

impl CopySource {
    /// `-` and `STDIN` select standard input, anything else is a path
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" || arg == "STDIN" {
            CopySource::Stdin
        } else {
            CopySource::File(PathBuf::from(arg))
        }
    }
}

/// Captured result of a successful client tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !self.stderr.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}
