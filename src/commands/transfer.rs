// ABOUTME: Transfer commands - COPY export/import, table dump/restore, query to file
// ABOUTME: Checks for client tools first, then delegates to the PostgreSQL bulk gateway

use crate::engine::{BulkTransfer, CopyFormat, CopySource};
use crate::postgres::Postgres;
use crate::uri::ConnectionUri;
use crate::utils;
use anyhow::Result;
use std::path::Path;

pub async fn export(
    uri: &ConnectionUri,
    query: &str,
    dest: &Path,
    format: &CopyFormat,
) -> Result<()> {
    utils::check_required_tools()?;
    Postgres.export_query(uri, query, dest, format).await?;
    Ok(())
}

pub async fn import(
    uri: &ConnectionUri,
    table: &str,
    source: &CopySource,
    format: &CopyFormat,
) -> Result<()> {
    utils::check_required_tools()?;
    Postgres.import_file(uri, table, source, format).await?;
    Ok(())
}

pub async fn dump_table(
    uri: &ConnectionUri,
    table: &str,
    dest: &Path,
    extra_args: &[String],
) -> Result<()> {
    utils::check_required_tools()?;
    let output = Postgres.dump_table(uri, table, dest, extra_args).await?;
    print_captured(&output.combined());
    Ok(())
}

pub async fn restore_table(
    uri: &ConnectionUri,
    table: &str,
    src: &Path,
    extra_args: &[String],
) -> Result<()> {
    utils::check_required_tools()?;
    let output = Postgres.restore_table(uri, table, src, extra_args).await?;
    print_captured(&output.combined());
    Ok(())
}

pub async fn query(uri: &ConnectionUri, query: &str, dest: &Path) -> Result<()> {
    utils::check_required_tools()?;
    let output = Postgres.run_query_to_file(uri, query, dest).await?;
    print_captured(&output.combined());
    Ok(())
}

fn print_captured(output: &str) {
    let output = output.trim();
    if !output.is_empty() {
        println!("{}", output);
    }
}
