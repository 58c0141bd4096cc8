// ABOUTME: Bootstrap and plan commands - build a database or schema from scripts
// ABOUTME: Confirms destructive replacement before handing off to the migration module

use crate::config::Target;
use crate::engine::Provisioner;
use crate::migration::{self, Applier};
use crate::postgres::Postgres;
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Create the target database and apply its scripts
///
/// With `replace`, an existing database of the same name is dropped after
/// an interactive confirmation (skipped when `skip_confirmation` is set).
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use pg_scriptkit::commands::bootstrap;
/// # use pg_scriptkit::config::resolve_target;
/// # use pg_scriptkit::migration::Applier;
/// # async fn example() -> Result<()> {
/// let target = resolve_target(
///     None,
///     None,
///     Some("postgresql://app@localhost/utest"),
///     Some(std::path::Path::new("db/utest")),
/// )?;
/// bootstrap(&target, &Applier::default(), true, true).await?;
/// # Ok(())
/// # }
/// ```
pub async fn bootstrap(
    target: &Target,
    applier: &Applier,
    replace: bool,
    skip_confirmation: bool,
) -> Result<()> {
    if replace && !skip_confirmation {
        confirm_replace(&format!("database '{}'", target.uri.database()))?;
    }

    let applied = migration::bootstrap_database(
        &Postgres,
        &target.uri,
        &target.scripts_dir,
        applier,
        replace,
    )
    .await?;

    println!(
        "Bootstrapped database '{}' with {} script(s)",
        target.uri.database(),
        applied
    );
    Ok(())
}

/// Create `schema` inside the target database and apply its scripts
pub async fn bootstrap_schema(
    target: &Target,
    schema: &str,
    applier: &Applier,
    replace: bool,
    skip_confirmation: bool,
) -> Result<()> {
    if replace && !skip_confirmation {
        confirm_replace(&format!(
            "schema '{}' in database '{}'",
            schema,
            target.uri.database()
        ))?;
    }

    let handle = Postgres
        .connect(&target.uri)
        .await
        .context("Failed to connect to target database")?;

    let applied = migration::bootstrap_schema(
        &Postgres,
        handle.as_ref(),
        &target.uri,
        schema,
        &target.scripts_dir,
        applier,
        replace,
    )
    .await?;

    println!("Bootstrapped schema '{}' with {} script(s)", schema, applied);
    Ok(())
}

/// Print the scripts a bootstrap would apply, in order
pub fn plan(target: &Target, applier: &Applier) -> Result<()> {
    let chunks = migration::collect(&target.scripts_dir, &applier.extensions())?;

    if chunks.is_empty() {
        tracing::warn!(
            "⚠ No versioned scripts found in {}",
            target.scripts_dir.display()
        );
        return Ok(());
    }

    println!("{:<16} {}", "Version", "Script");
    println!("{}", "─".repeat(50));
    for chunk in &chunks {
        println!("{:<16} {}", chunk.version.as_str(), chunk.filename);
    }
    println!("{}", "─".repeat(50));
    println!("{} script(s) from {}", chunks.len(), target.scripts_dir.display());
    Ok(())
}

fn confirm_replace(what: &str) -> Result<()> {
    let proceed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Drop and recreate {}? All existing data in it will be lost",
            what
        ))
        .default(false)
        .interact()
        .context("Failed to get replace confirmation")?;

    if !proceed {
        bail!("Bootstrap cancelled by user");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_target;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_plan_lists_scripts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0001-init.sql"), "").unwrap();
        let target =
            resolve_target(None, None, Some("postgresql://u@h/d"), Some(dir.path())).unwrap();

        assert!(plan(&target, &Applier::default()).is_ok());
    }

    #[test]
    fn test_plan_missing_directory_fails() {
        let target = resolve_target(
            None,
            None,
            Some("postgresql://u@h/d"),
            Some(std::path::Path::new("/nonexistent/scriptkit")),
        )
        .unwrap();

        assert!(plan(&target, &Applier::default()).is_err());
    }

    // Requires a real PostgreSQL instance; creates and drops scriptkit_bootstrap_test
    #[tokio::test]
    #[ignore]
    async fn test_bootstrap_replaces_database() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let uri = crate::uri::ConnectionUri::parse(&url)
            .unwrap()
            .with_database("scriptkit_bootstrap_test");
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("0001-init.sql"),
            "CREATE TABLE items (id int PRIMARY KEY);",
        )
        .unwrap();
        let target = Target {
            uri,
            scripts_dir: dir.path().to_path_buf(),
            schema: None,
        };

        bootstrap(&target, &Applier::default(), true, true)
            .await
            .unwrap();
        // Second run must refuse without replace
        assert!(bootstrap(&target, &Applier::default(), false, true)
            .await
            .is_err());
        bootstrap(&target, &Applier::default(), true, true)
            .await
            .unwrap();

        Postgres.drop_database(&target.uri).await.unwrap();
    }
}
