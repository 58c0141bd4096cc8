// ABOUTME: PostgreSQL catalog introspection and database/schema provisioning
// ABOUTME: Lists tables, checks existence, reads primary keys, creates and drops targets

use crate::engine::{DbHandle, Introspector, Provisioner};
use crate::uri::ConnectionUri;
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{connect, Postgres};

/// Database used for cluster-level statements while the target may not exist
pub const ADMIN_DATABASE: &str = "template1";

// A name present in several schemas is listed once
pub(crate) const LIST_TABLES_SQL: &str = "SELECT DISTINCT tablename::text
     FROM pg_catalog.pg_tables
     WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
     ORDER BY 1";

pub(crate) const TABLE_EXISTS_SQL: &str = "SELECT count(*)
     FROM pg_catalog.pg_tables
     WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
       AND tablename = $1";

pub(crate) const SCHEMA_EXISTS_SQL: &str =
    "SELECT count(*) FROM pg_catalog.pg_namespace WHERE nspname = $1";

pub(crate) const LIST_DATABASES_SQL: &str = "SELECT datname::text FROM pg_catalog.pg_database";

pub(crate) const TERMINATE_SESSIONS_SQL: &str = "SELECT count(*) FROM (
         SELECT pg_terminate_backend(pid)
         FROM pg_catalog.pg_stat_activity
         WHERE datname = $1 AND pid <> pg_backend_pid()
     ) AS terminated";

// Tables are matched by exact name over the same schemas as TABLE_EXISTS_SQL.
// When several schemas hold the name, the one visible on search_path wins.
// Attributes of the primary index itself, so attnum is the position in the key.
pub(crate) const PRIMARY_KEY_SQL: &str = "WITH target AS (
         SELECT c.oid
         FROM pg_catalog.pg_class c
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
         WHERE c.relname = $1
           AND c.relkind IN ('r', 'p')
           AND n.nspname NOT IN ('pg_catalog', 'information_schema')
         ORDER BY pg_catalog.pg_table_is_visible(c.oid) DESC, n.nspname
         LIMIT 1
     )
     SELECT a.attname::text
     FROM target t
     JOIN pg_catalog.pg_index i ON i.indrelid = t.oid AND i.indisprimary
     JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indexrelid
     ORDER BY a.attnum";

#[async_trait]
impl Introspector for Postgres {
    async fn list_tables(&self, handle: &dyn DbHandle) -> Result<Vec<String>> {
        handle
            .query_column(LIST_TABLES_SQL, &[])
            .await
            .context("Failed to list tables")
    }

    async fn table_exists(&self, handle: &dyn DbHandle, table: &str) -> Result<bool> {
        let count = handle
            .query_scalar(TABLE_EXISTS_SQL, &[table])
            .await
            .with_context(|| format!("Failed to check whether table '{}' exists", table))?;
        Ok(count != 0)
    }

    async fn schema_exists(&self, handle: &dyn DbHandle, schema: &str) -> Result<bool> {
        let count = handle
            .query_scalar(SCHEMA_EXISTS_SQL, &[schema])
            .await
            .with_context(|| format!("Failed to check whether schema '{}' exists", schema))?;
        Ok(count != 0)
    }

    async fn database_exists(&self, uri: &ConnectionUri) -> Result<bool> {
        let admin = connect(&uri.with_database(ADMIN_DATABASE))
            .await
            .context("Failed to connect to the administrative database")?;
        let names = DbHandle::query_column(&admin, LIST_DATABASES_SQL, &[])
            .await
            .context("Failed to list databases")?;
        Ok(names.iter().any(|name| name == uri.database()))
    }

    async fn primary_key_columns(
        &self,
        handle: &dyn DbHandle,
        table: &str,
    ) -> Result<Vec<String>> {
        handle
            .query_column(PRIMARY_KEY_SQL, &[table])
            .await
            .with_context(|| format!("Failed to read primary key of '{}'", table))
    }
}

#[async_trait]
impl Provisioner for Postgres {
    async fn connect(&self, uri: &ConnectionUri) -> Result<Box<dyn DbHandle>> {
        let client = connect(uri).await?;
        Ok(Box::new(client))
    }

    async fn create_database(&self, uri: &ConnectionUri) -> Result<()> {
        tracing::info!("Creating database '{}'...", uri.database());
        let admin = connect(&uri.with_database(ADMIN_DATABASE)).await?;
        let query = format!("CREATE DATABASE {}", quote_ident(uri.database()));
        DbHandle::batch_execute(&admin, &query)
            .await
            .with_context(|| format!("Failed to create database '{}'", uri.database()))?;
        tracing::info!("✓ Database '{}' created", uri.database());
        Ok(())
    }

    async fn drop_database(&self, uri: &ConnectionUri) -> Result<()> {
        tracing::warn!("⚠ Dropping database '{}'", uri.database());
        let admin = connect(&uri.with_database(ADMIN_DATABASE)).await?;

        let terminated = DbHandle::query_scalar(&admin, TERMINATE_SESSIONS_SQL, &[uri.database()])
            .await
            .context("Failed to close existing sessions")?;
        if terminated > 0 {
            tracing::warn!("⚠ Closed {} open session(s) on '{}'", terminated, uri.database());
        }

        let query = format!("DROP DATABASE {}", quote_ident(uri.database()));
        DbHandle::batch_execute(&admin, &query)
            .await
            .with_context(|| format!("Failed to drop database '{}'", uri.database()))?;
        tracing::info!("✓ Database '{}' dropped", uri.database());
        Ok(())
    }

    async fn create_schema(&self, handle: &dyn DbHandle, schema: &str) -> Result<()> {
        let query = format!("CREATE SCHEMA {}", quote_ident(schema));
        handle
            .batch_execute(&query)
            .await
            .with_context(|| format!("Failed to create schema '{}'", schema))?;
        tracing::info!("✓ Schema '{}' created", schema);
        Ok(())
    }

    async fn drop_schema(&self, handle: &dyn DbHandle, schema: &str) -> Result<()> {
        tracing::warn!("⚠ Dropping schema '{}' and everything in it", schema);
        let query = format!("DROP SCHEMA {} CASCADE", quote_ident(schema));
        handle
            .batch_execute(&query)
            .await
            .with_context(|| format!("Failed to drop schema '{}'", schema))
    }

    async fn use_schema(&self, handle: &dyn DbHandle, schema: &str) -> Result<()> {
        let query = format!("SET search_path TO {}", quote_ident(schema));
        handle
            .batch_execute(&query)
            .await
            .with_context(|| format!("Failed to select schema '{}'", schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers the catalog queries above from a fixed table list
    struct FixtureCatalog {
        tables: Vec<String>,
        pkey: Vec<String>,
        seen: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FixtureCatalog {
        fn new(tables: &[&str]) -> Self {
            Self {
                tables: tables.iter().map(|t| t.to_string()).collect(),
                pkey: Vec::new(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DbHandle for FixtureCatalog {
        async fn batch_execute(&self, sql: &str) -> Result<()> {
            self.seen.lock().unwrap().push((sql.to_string(), Vec::new()));
            Ok(())
        }

        async fn query_column(&self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
            self.seen.lock().unwrap().push((
                sql.to_string(),
                params.iter().map(|p| p.to_string()).collect(),
            ));
            match sql {
                LIST_TABLES_SQL => Ok(self.tables.clone()),
                PRIMARY_KEY_SQL => Ok(self.pkey.clone()),
                _ => anyhow::bail!("unexpected query: {}", sql),
            }
        }

        async fn query_scalar(&self, sql: &str, params: &[&str]) -> Result<i64> {
            match sql {
                TABLE_EXISTS_SQL => {
                    Ok(self.tables.iter().filter(|t| t.as_str() == params[0]).count() as i64)
                }
                SCHEMA_EXISTS_SQL => Ok(i64::from(params[0] == "public")),
                _ => anyhow::bail!("unexpected query: {}", sql),
            }
        }
    }

    #[tokio::test]
    async fn test_table_exists_agrees_with_list_tables() {
        let handle = FixtureCatalog::new(&["customers", "orders", "order_items"]);
        let listed = Postgres.list_tables(&handle).await.unwrap();

        for name in ["customers", "orders", "order_items", "invoices", "order", ""] {
            let exists = Postgres.table_exists(&handle, name).await.unwrap();
            assert_eq!(
                exists,
                listed.iter().any(|t| t == name),
                "disagreement for '{}'",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_primary_key_keeps_key_order() {
        let mut handle = FixtureCatalog::new(&["pairs"]);
        handle.pkey = vec!["b".to_string(), "a".to_string()];

        let columns = Postgres.primary_key_columns(&handle, "pairs").await.unwrap();
        assert_eq!(columns, vec!["b", "a"]);

        let seen = handle.seen.lock().unwrap();
        assert_eq!(seen.last().unwrap().1, vec!["pairs"]);
    }

    #[test]
    fn test_primary_key_query_orders_by_index_position() {
        assert!(PRIMARY_KEY_SQL.contains("a.attrelid = i.indexrelid"));
        assert!(PRIMARY_KEY_SQL.trim_end().ends_with("ORDER BY a.attnum"));
    }

    #[test]
    fn test_catalog_queries_share_one_visibility_rule() {
        let user_schemas = "NOT IN ('pg_catalog', 'information_schema')";
        assert!(LIST_TABLES_SQL.contains(user_schemas));
        assert!(TABLE_EXISTS_SQL.contains(user_schemas));
        assert!(PRIMARY_KEY_SQL.contains(user_schemas));

        // Exact name match, no identifier folding or search_path lookup
        assert!(PRIMARY_KEY_SQL.contains("c.relname = $1"));
        assert!(!PRIMARY_KEY_SQL.contains("regclass"));
        assert!(LIST_TABLES_SQL.starts_with("SELECT DISTINCT"));
    }

    #[tokio::test]
    async fn test_require_primary_key_fails_on_keyless_table() {
        let handle = FixtureCatalog::new(&["events"]);
        let err = crate::engine::require_primary_key(&Postgres, &handle, "events")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::MigrateError>(),
            Some(crate::error::MigrateError::Introspection(_))
        ));
    }

    #[tokio::test]
    async fn test_schema_statements_quote_names() {
        let handle = FixtureCatalog::new(&[]);
        assert!(Postgres.schema_exists(&handle, "public").await.unwrap());
        assert!(!Postgres.schema_exists(&handle, "app").await.unwrap());

        Postgres.drop_schema(&handle, "app").await.unwrap();
        Postgres.create_schema(&handle, "app").await.unwrap();
        Postgres.use_schema(&handle, "app").await.unwrap();

        let statements: Vec<String> = handle
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect();
        assert_eq!(
            statements,
            vec![
                "DROP SCHEMA \"app\" CASCADE",
                "CREATE SCHEMA \"app\"",
                "SET search_path TO \"app\""
            ]
        );
    }

    // Requires a real PostgreSQL instance
    #[tokio::test]
    #[ignore]
    async fn test_composite_primary_key_order_on_server() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let uri = ConnectionUri::parse(&url).unwrap();
        let handle = Postgres.connect(&uri).await.unwrap();

        handle
            .batch_execute(
                "DROP TABLE IF EXISTS scriptkit_pk_order;
                 CREATE TABLE scriptkit_pk_order (a int, b int, PRIMARY KEY (b, a));",
            )
            .await
            .unwrap();

        let columns = Postgres
            .primary_key_columns(handle.as_ref(), "scriptkit_pk_order")
            .await
            .unwrap();
        assert_eq!(columns, vec!["b", "a"]);

        assert!(Postgres
            .table_exists(handle.as_ref(), "scriptkit_pk_order")
            .await
            .unwrap());
        assert!(Postgres.database_exists(&uri).await.unwrap());

        handle
            .batch_execute("DROP TABLE scriptkit_pk_order")
            .await
            .unwrap();
    }

    // Requires a real PostgreSQL instance
    #[tokio::test]
    #[ignore]
    async fn test_listed_tables_have_readable_keys_on_server() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let uri = ConnectionUri::parse(&url).unwrap();
        let handle = Postgres.connect(&uri).await.unwrap();

        handle
            .batch_execute(
                "DROP SCHEMA IF EXISTS scriptkit_side CASCADE;
                 DROP TABLE IF EXISTS \"ScriptkitPairs\";
                 DROP TABLE IF EXISTS scriptkit_twice;
                 CREATE SCHEMA scriptkit_side;
                 CREATE TABLE \"ScriptkitPairs\" (a int, b int, PRIMARY KEY (b, a));
                 CREATE TABLE scriptkit_side.scriptkit_widgets (id int PRIMARY KEY, sku text);
                 CREATE TABLE scriptkit_twice (x int PRIMARY KEY);
                 CREATE TABLE scriptkit_side.scriptkit_twice (y int PRIMARY KEY);",
            )
            .await
            .unwrap();

        let listed = Postgres.list_tables(handle.as_ref()).await.unwrap();
        assert_eq!(
            listed.iter().filter(|t| *t == "scriptkit_twice").count(),
            1
        );

        for (table, key) in [
            ("ScriptkitPairs", vec!["b", "a"]),
            ("scriptkit_widgets", vec!["id"]),
            ("scriptkit_twice", vec!["x"]),
        ] {
            assert!(listed.iter().any(|t| t == table), "{} not listed", table);
            assert!(Postgres.table_exists(handle.as_ref(), table).await.unwrap());
            let columns = Postgres
                .primary_key_columns(handle.as_ref(), table)
                .await
                .unwrap();
            assert_eq!(columns, key, "key of {}", table);
        }

        handle
            .batch_execute(
                "DROP SCHEMA scriptkit_side CASCADE;
                 DROP TABLE \"ScriptkitPairs\";
                 DROP TABLE scriptkit_twice;",
            )
            .await
            .unwrap();
    }
}
