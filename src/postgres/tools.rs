// ABOUTME: Command builders and runner for psql, pg_dump and pg_restore
// ABOUTME: Captures tool output and maps non-zero exits to transfer errors

use crate::engine::ToolOutput;
use crate::error::MigrateError;
use crate::uri::ConnectionUri;
use crate::utils::PgPassFile;
use anyhow::{Context, Result};
use std::process::Command;

const INSTALL_HINT: &str = "Is PostgreSQL client installed?\n\
     Install with:\n\
     - Ubuntu/Debian: sudo apt-get install postgresql-client\n\
     - macOS: brew install postgresql\n\
     - RHEL/CentOS: sudo yum install postgresql";

/// A client tool invocation plus the password file it depends on.
///
/// The password file lives exactly as long as the invocation.
pub struct ToolCommand {
    tool: &'static str,
    command: Command,
    _pgpass: Option<PgPassFile>,
}

impl ToolCommand {
    /// Start a command for `tool` with host, port and user taken from `uri`
    ///
    /// Session parameters such as `sslmode` travel as libpq environment
    /// variables.
    pub fn new(tool: &'static str, uri: &ConnectionUri) -> Result<Self> {
        let pgpass = PgPassFile::for_uri(uri)
            .context("Failed to create .pgpass file for authentication")?;

        let mut command = Command::new(tool);
        command.arg("-h").arg(uri.host());
        command.arg("-p").arg(uri.port().to_string());
        if let Some(user) = uri.user() {
            command.arg("-U").arg(user);
        }
        // Never stop to prompt for a password
        command.arg("-w");
        command.envs(uri.libpq_env());
        if let Some(pgpass) = &pgpass {
            command.env("PGPASSFILE", pgpass.path());
        }

        Ok(Self {
            tool,
            command,
            _pgpass: pgpass,
        })
    }

    pub fn command_mut(&mut self) -> &mut Command {
        &mut self.command
    }

    /// Arguments as they will be passed, for logging and tests
    pub fn args(&self) -> Vec<String> {
        self.command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Run to completion, capturing stdout and stderr
    ///
    /// A non-zero exit becomes [`MigrateError::Transfer`] carrying the
    /// captured output.
    pub fn run(mut self) -> Result<ToolOutput> {
        tracing::debug!("Running {} {}", self.tool, self.args().join(" "));

        let output = self
            .command
            .output()
            .with_context(|| format!("Failed to execute {}. {}", self.tool, INSTALL_HINT))?;

        let captured = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            let detail = match output.status.code() {
                Some(code) => format!("exit status {}: {}", code, captured.combined().trim()),
                None => format!("terminated by signal: {}", captured.combined().trim()),
            };
            return Err(MigrateError::transfer(self.tool, detail).into());
        }

        Ok(captured)
    }
}

/// `psql` running a single command against the URI's database
pub fn psql(uri: &ConnectionUri, sql: &str) -> Result<ToolCommand> {
    let mut cmd = ToolCommand::new("psql", uri)?;
    cmd.command_mut()
        .arg("-d")
        .arg(uri.database())
        .arg("--no-psqlrc")
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("-c")
        .arg(sql);
    Ok(cmd)
}
