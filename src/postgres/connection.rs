// ABOUTME: PostgreSQL connection utilities
// ABOUTME: Handles TLS setup, connection lifecycle, and the DbHandle adapter for tokio-postgres

use crate::engine::DbHandle;
use crate::uri::ConnectionUri;
use anyhow::{Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// Connect to PostgreSQL database with TLS support
pub async fn connect(uri: &ConnectionUri) -> Result<Client> {
    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    tracing::debug!("Connecting to {}", uri);

    let (client, connection) = tokio_postgres::connect(&uri.to_url(), tls)
        .await
        .map_err(|e| describe_connect_error(uri, e))?;

    // The connection task ends when the client is dropped
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}

fn describe_connect_error(uri: &ConnectionUri, e: tokio_postgres::Error) -> anyhow::Error {
    let error_msg = e.to_string();

    if error_msg.contains("password authentication failed") {
        anyhow::anyhow!(
            "Authentication failed: Invalid username or password.\n\
             Please verify your database credentials."
        )
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        anyhow::anyhow!(
            "Database '{}' does not exist: {}\n\
             Bootstrap it first or check the connection URL.",
            uri.database(),
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect")
    {
        anyhow::anyhow!(
            "Connection refused: Unable to reach database server at {}:{}.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            uri.host(),
            uri.port(),
            error_msg
        )
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        anyhow::anyhow!(
            "TLS/SSL error: Failed to establish secure connection.\n\
             Please verify SSL/TLS configuration.\n\
             Error: {}",
            error_msg
        )
    } else {
        anyhow::anyhow!("Failed to connect to {}: {}", uri, error_msg)
    }
}

fn to_params<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl DbHandle for Client {
    async fn batch_execute(&self, sql: &str) -> Result<()> {
        Client::batch_execute(self, sql)
            .await
            .map_err(|e| anyhow::anyhow!(describe_db_error(&e)))
    }

    async fn query_column(&self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
        let rows = self
            .query(sql, &to_params(params))
            .await
            .map_err(|e| anyhow::anyhow!(describe_db_error(&e)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0)
                    .context("Expected a text value in the first column")
            })
            .collect()
    }

    async fn query_scalar(&self, sql: &str, params: &[&str]) -> Result<i64> {
        let row = self
            .query_one(sql, &to_params(params))
            .await
            .map_err(|e| anyhow::anyhow!(describe_db_error(&e)))?;

        row.try_get::<_, i64>(0)
            .context("Expected a bigint value in the first column")
    }
}

/// Server error text with position and detail when the server sent them
fn describe_db_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => {
            let mut msg = format!("{}: {}", db.severity(), db.message());
            if let Some(detail) = db.detail() {
                msg.push_str(&format!(" ({})", detail));
            }
            if let Some(tokio_postgres::error::ErrorPosition::Original(pos)) = db.position() {
                msg.push_str(&format!(" at character {}", pos));
            }
            msg
        }
        None => e.to_string(),
    }
}
