// ABOUTME: CLI entry point for pg-scriptkit
// ABOUTME: Parses commands and routes to appropriate handlers

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use pg_scriptkit::commands;
use pg_scriptkit::config::{self, resolve_target, Config, Target};
use pg_scriptkit::engine::{CopyFormat, CopySource};
use pg_scriptkit::migration::{Applier, CommandExecutor};
use pg_scriptkit::uri::ConnectionUri;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pg-scriptkit")]
#[command(about = "Bootstrap PostgreSQL databases from versioned scripts and move data in bulk", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConnArgs {
    /// Alias config file (TOML)
    #[arg(
        long,
        default_value_t = std::env::var("SCRIPTKIT_CONFIG")
            .unwrap_or_else(|_| config::DEFAULT_CONFIG_FILE.to_string())
    )]
    config: String,
    /// Alias to look up in the config file
    #[arg(short, long)]
    alias: Option<String>,
    /// Connection URL, overrides the alias
    #[arg(long)]
    uri: Option<String>,
}

#[derive(Args, Clone)]
struct TargetArgs {
    #[command(flatten)]
    conn: ConnArgs,
    /// Directory holding the versioned scripts, overrides the alias
    #[arg(long)]
    scripts_dir: Option<PathBuf>,
    /// Run procedural scripts with SUFFIX=PROGRAM (repeatable), e.g. .sh=sh
    #[arg(long = "exec", value_name = "SUFFIX=PROGRAM", default_value = ".sh=sh")]
    executors: Vec<String>,
}

#[derive(Args, Clone)]
struct FormatArgs {
    /// Use the binary COPY format
    #[arg(long, conflicts_with_all = ["delimiter", "null"])]
    binary: bool,
    /// Field separator for text format
    #[arg(long, default_value = "\t")]
    delimiter: String,
    /// NULL marker for text format
    #[arg(long, default_value = "\\N")]
    null: String,
}

impl FormatArgs {
    fn format(&self) -> CopyFormat {
        if self.binary {
            CopyFormat::Binary
        } else {
            CopyFormat::text(self.delimiter.clone(), self.null.clone())
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the scripts a bootstrap would apply, in order
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Create a database and apply every script to it
    Bootstrap {
        #[command(flatten)]
        target: TargetArgs,
        /// Drop an existing database of the same name first
        #[arg(long)]
        replace: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Create a schema in an existing database and apply every script to it
    BootstrapSchema {
        #[command(flatten)]
        target: TargetArgs,
        /// Schema name, overrides the alias
        #[arg(long)]
        schema: Option<String>,
        /// Drop an existing schema of the same name first
        #[arg(long)]
        replace: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// List user tables
    Tables {
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Exit 0 if the table exists, 1 otherwise
    TableExists {
        #[command(flatten)]
        conn: ConnArgs,
        table: String,
    },
    /// Exit 0 if the database exists, 1 otherwise
    DatabaseExists {
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Print primary-key columns in key order
    PrimaryKey {
        #[command(flatten)]
        conn: ConnArgs,
        table: String,
    },
    /// COPY a table or query result into a file
    Export {
        #[command(flatten)]
        conn: ConnArgs,
        /// Table name or full query
        query: String,
        dest: PathBuf,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// COPY a file (or - for standard input) into a table
    Import {
        #[command(flatten)]
        conn: ConnArgs,
        table: String,
        source: String,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// pg_dump one table; arguments after -- go to pg_dump
    DumpTable {
        #[command(flatten)]
        conn: ConnArgs,
        table: String,
        dest: PathBuf,
        #[arg(last = true)]
        extra: Vec<String>,
    },
    /// pg_restore one table; arguments after -- go to pg_restore
    RestoreTable {
        #[command(flatten)]
        conn: ConnArgs,
        table: String,
        src: PathBuf,
        #[arg(last = true)]
        extra: Vec<String>,
    },
    /// Run a query (or select * from a table) through psql into a file
    Query {
        #[command(flatten)]
        conn: ConnArgs,
        query: String,
        dest: PathBuf,
    },
    /// Check that pg_dump, pg_restore and psql are on PATH
    CheckTools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { target } => {
            let applier = build_applier(&target.executors)?;
            commands::plan(&resolve(&target)?, &applier)
        }
        Commands::Bootstrap {
            target,
            replace,
            yes,
        } => {
            let applier = build_applier(&target.executors)?;
            commands::bootstrap(&resolve(&target)?, &applier, replace, yes).await
        }
        Commands::BootstrapSchema {
            target,
            schema,
            replace,
            yes,
        } => {
            let applier = build_applier(&target.executors)?;
            let resolved = resolve(&target)?;
            let Some(schema) = schema.or_else(|| resolved.schema.clone()) else {
                bail!("No schema given: pass --schema or set `schema` on the alias");
            };
            commands::bootstrap_schema(&resolved, &schema, &applier, replace, yes).await
        }
        Commands::Tables { conn } => commands::tables(&resolve_uri(&conn)?).await,
        Commands::TableExists { conn, table } => {
            if !commands::table_exists(&resolve_uri(&conn)?, &table).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::DatabaseExists { conn } => {
            if !commands::database_exists(&resolve_uri(&conn)?).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::PrimaryKey { conn, table } => {
            commands::primary_key(&resolve_uri(&conn)?, &table).await
        }
        Commands::Export {
            conn,
            query,
            dest,
            format,
        } => commands::export(&resolve_uri(&conn)?, &query, &dest, &format.format()).await,
        Commands::Import {
            conn,
            table,
            source,
            format,
        } => {
            commands::import(
                &resolve_uri(&conn)?,
                &table,
                &CopySource::from_arg(&source),
                &format.format(),
            )
            .await
        }
        Commands::DumpTable {
            conn,
            table,
            dest,
            extra,
        } => commands::dump_table(&resolve_uri(&conn)?, &table, &dest, &extra).await,
        Commands::RestoreTable {
            conn,
            table,
            src,
            extra,
        } => commands::restore_table(&resolve_uri(&conn)?, &table, &src, &extra).await,
        Commands::Query { conn, query, dest } => {
            commands::query(&resolve_uri(&conn)?, &query, &dest).await
        }
        Commands::CheckTools => {
            pg_scriptkit::utils::check_required_tools()?;
            println!("✓ pg_dump, pg_restore and psql found");
            Ok(())
        }
    }
}

/// Config is only read when an alias needs it
fn load_config(conn: &ConnArgs) -> anyhow::Result<Option<Config>> {
    if conn.alias.is_none() {
        return Ok(None);
    }
    Config::load(std::path::Path::new(&conn.config)).map(Some)
}

fn resolve(target: &TargetArgs) -> anyhow::Result<Target> {
    let config = load_config(&target.conn)?;
    resolve_target(
        config.as_ref(),
        target.conn.alias.as_deref(),
        target.conn.uri.as_deref(),
        target.scripts_dir.as_deref(),
    )
}

fn resolve_uri(conn: &ConnArgs) -> anyhow::Result<ConnectionUri> {
    match (&conn.uri, &conn.alias) {
        (Some(uri), _) => ConnectionUri::parse(uri),
        (None, Some(alias)) => {
            let config = load_config(conn)?.context("Config file required for --alias")?;
            Ok(config.resolve(alias)?.uri)
        }
        (None, None) => bail!("Either --alias or --uri is required"),
    }
}

/// `.sql` always, plus one interpreter per `SUFFIX=PROGRAM [ARGS...]` entry
fn build_applier(executors: &[String]) -> anyhow::Result<Applier> {
    let mut applier = Applier::default();
    for spec in executors {
        let Some((suffix, command)) = spec.split_once('=') else {
            bail!("Invalid --exec '{}', expected SUFFIX=PROGRAM", spec);
        };
        let mut words = command.split_whitespace();
        let Some(program) = words.next() else {
            bail!("Invalid --exec '{}', program is empty", spec);
        };
        if suffix.is_empty() || suffix == ".sql" {
            bail!("Invalid --exec '{}', suffix must be non-empty and not .sql", spec);
        }
        let executor = words.fold(CommandExecutor::new(program), |exec, arg| exec.arg(arg));
        applier = applier.register(suffix, executor);
    }
    Ok(applier)
}
