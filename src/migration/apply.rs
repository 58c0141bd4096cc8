// ABOUTME: Applies ordered change scripts through per-suffix executors
// ABOUTME: SQL chunks go to the connection, procedural chunks run as isolated child processes

use crate::engine::DbHandle;
use crate::error::MigrateError;
use crate::uri::ConnectionUri;
use crate::utils::{quote_ident, PgPassFile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::process::Command;

use super::ScriptChunk;

/// Where chunks are being applied.
pub struct ApplyContext<'a> {
    pub handle: &'a dyn DbHandle,
    pub uri: &'a ConnectionUri,
    /// Schema selected on `handle`, if bootstrapping a schema
    pub schema: Option<&'a str>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(handle: &'a dyn DbHandle, uri: &'a ConnectionUri) -> Self {
        Self {
            handle,
            uri,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: &'a str) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Runs one kind of change script.
#[async_trait]
pub trait ChunkExecutor: Send + Sync {
    async fn execute(&self, ctx: &ApplyContext<'_>, chunk: &ScriptChunk) -> Result<()>;
}

/// Sends the script text to the server as a single batch
#[derive(Debug, Default)]
pub struct SqlExecutor;

#[async_trait]
impl ChunkExecutor for SqlExecutor {
    async fn execute(&self, ctx: &ApplyContext<'_>, chunk: &ScriptChunk) -> Result<()> {
        ctx.handle.batch_execute(&chunk.code).await
    }
}

/// Runs the script with an external interpreter, e.g. `sh`.
///
/// The child starts with an empty environment apart from `PATH` and the
/// libpq variables that point it at the target database (including session
/// parameters like `sslmode`), so it shares no state with this process and
/// can only act through the database.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Interpreter invocation for one script file, without running it
    pub fn command(
        &self,
        uri: &ConnectionUri,
        schema: Option<&str>,
        script: &std::path::Path,
        pgpass: Option<&PgPassFile>,
    ) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(script).env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env("PGHOST", uri.host())
            .env("PGPORT", uri.port().to_string())
            .env("PGDATABASE", uri.database());
        if let Some(user) = uri.user() {
            cmd.env("PGUSER", user);
        }
        if let Some(pgpass) = pgpass {
            cmd.env("PGPASSFILE", pgpass.path());
        }

        let mut session = uri.libpq_env();
        if let Some(schema) = schema {
            let search_path = format!("-c search_path={}", quote_ident(schema));
            match session.iter_mut().find(|(var, _)| *var == "PGOPTIONS") {
                Some((_, options)) => {
                    options.push(' ');
                    options.push_str(&search_path);
                }
                None => session.push(("PGOPTIONS", search_path)),
            }
        }
        cmd.envs(session);
        cmd
    }
}

#[async_trait]
impl ChunkExecutor for CommandExecutor {
    async fn execute(&self, ctx: &ApplyContext<'_>, chunk: &ScriptChunk) -> Result<()> {
        let mut script = tempfile::Builder::new()
            .prefix("scriptkit-chunk-")
            .tempfile()
            .context("Failed to create temporary script file")?;
        script
            .write_all(chunk.code.as_bytes())
            .context("Failed to write temporary script file")?;
        script
            .flush()
            .context("Failed to write temporary script file")?;

        let pgpass = PgPassFile::for_uri(ctx.uri)?;
        let output = self
            .command(ctx.uri, ctx.schema, script.path(), pgpass.as_ref())
            .output()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if !output.status.success() {
            let mut detail = String::from_utf8_lossy(&output.stdout).into_owned();
            detail.push_str(&String::from_utf8_lossy(&output.stderr));
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                detail.trim()
            );
        }
        Ok(())
    }
}

/// Dispatches chunks to executors by filename suffix.
pub struct Applier {
    executors: BTreeMap<String, Box<dyn ChunkExecutor>>,
}

impl Default for Applier {
    /// `.sql` only
    fn default() -> Self {
        Self::empty().register(".sql", SqlExecutor)
    }
}

impl Applier {
    /// An applier with no executors registered
    pub fn empty() -> Self {
        Self {
            executors: BTreeMap::new(),
        }
    }

    pub fn register(
        mut self,
        suffix: impl Into<String>,
        executor: impl ChunkExecutor + 'static,
    ) -> Self {
        self.executors.insert(suffix.into(), Box::new(executor));
        self
    }

    /// Suffixes with a registered executor, for [`collect`](super::collect)
    pub fn extensions(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }

    fn executor_for(&self, filename: &str) -> Option<&dyn ChunkExecutor> {
        self.executors
            .iter()
            .filter(|(suffix, _)| filename.ends_with(suffix.as_str()))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, executor)| executor.as_ref())
    }

    /// Apply `chunks` in order, stopping at the first failure
    ///
    /// Chunks applied before a failure stay applied. Returns the number of
    /// chunks applied.
    pub async fn apply(&self, ctx: &ApplyContext<'_>, chunks: &[ScriptChunk]) -> Result<usize> {
        for (idx, chunk) in chunks.iter().enumerate() {
            tracing::info!(
                "Applying {}/{}: {} (version {})",
                idx + 1,
                chunks.len(),
                chunk.filename,
                chunk.version
            );

            let executor = self.executor_for(&chunk.filename).ok_or_else(|| {
                MigrateError::Application {
                    filename: chunk.filename.clone(),
                    message: "no executor registered for this file type".to_string(),
                }
            })?;

            if let Err(e) = executor.execute(ctx, chunk).await {
                tracing::error!("✗ {} failed after {} applied script(s)", chunk.filename, idx);
                return Err(MigrateError::application(&chunk.filename, &e).into());
            }
        }

        tracing::info!("✓ Applied {} script(s)", chunks.len());
        Ok(chunks.len())
    }
}
