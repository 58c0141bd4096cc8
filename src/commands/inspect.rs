// ABOUTME: Inspect commands - list tables, check existence, show primary keys
// ABOUTME: Thin CLI wrappers over the PostgreSQL introspector

use crate::engine::{require_primary_key, Introspector, Provisioner};
use crate::postgres::Postgres;
use crate::uri::ConnectionUri;
use anyhow::{Context, Result};

/// Print the user tables of the database behind `uri`
pub async fn tables(uri: &ConnectionUri) -> Result<()> {
    let handle = Postgres
        .connect(uri)
        .await
        .context("Failed to connect to database")?;
    let tables = Postgres.list_tables(handle.as_ref()).await?;

    if tables.is_empty() {
        tracing::warn!("⚠ No tables found in '{}'", uri.database());
        return Ok(());
    }
    for table in &tables {
        println!("{}", table);
    }
    tracing::info!("Found {} table(s)", tables.len());
    Ok(())
}

/// Report whether `table` exists; returns the answer for the exit status
pub async fn table_exists(uri: &ConnectionUri, table: &str) -> Result<bool> {
    let handle = Postgres
        .connect(uri)
        .await
        .context("Failed to connect to database")?;
    let exists = Postgres.table_exists(handle.as_ref(), table).await?;
    println!("{}", if exists { "yes" } else { "no" });
    Ok(exists)
}

/// Report whether the database named in `uri` exists
pub async fn database_exists(uri: &ConnectionUri) -> Result<bool> {
    let exists = Postgres.database_exists(uri).await?;
    println!("{}", if exists { "yes" } else { "no" });
    Ok(exists)
}

/// Print the primary-key columns of `table` in key order
pub async fn primary_key(uri: &ConnectionUri, table: &str) -> Result<()> {
    let handle = Postgres
        .connect(uri)
        .await
        .context("Failed to connect to database")?;
    let columns = require_primary_key(&Postgres, handle.as_ref(), table).await?;
    println!("{}", columns.join(", "));
    Ok(())
}
