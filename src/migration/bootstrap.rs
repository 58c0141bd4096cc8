// ABOUTME: Creates a database or schema and applies every collected script to it
// ABOUTME: Refuses to touch an existing target unless replacing was requested

use crate::engine::{DbHandle, Introspector, Provisioner};
use crate::error::{MigrateError, TargetKind};
use crate::uri::ConnectionUri;
use anyhow::Result;
use std::path::Path;

use super::{collect, Applier, ApplyContext};

/// Create the database named in `uri` and apply the scripts in `scripts_dir`
///
/// With `replace` set, an existing database of the same name is dropped
/// first and its data is lost. Without it, an existing database is a
/// [`MigrateError::BootstrapConflict`] and nothing is changed.
///
/// Returns the number of scripts applied.
pub async fn bootstrap_database<E>(
    engine: &E,
    uri: &ConnectionUri,
    scripts_dir: &Path,
    applier: &Applier,
    replace: bool,
) -> Result<usize>
where
    E: Introspector + Provisioner + ?Sized,
{
    tracing::info!(
        "Bootstrapping database '{}' from {}",
        uri.database(),
        scripts_dir.display()
    );

    let chunks = collect(scripts_dir, &applier.extensions())?;
    tracing::info!("Found {} script(s) to apply", chunks.len());

    if engine.database_exists(uri).await? {
        if !replace {
            return Err(MigrateError::BootstrapConflict {
                kind: TargetKind::Database,
                name: uri.database().to_string(),
            }
            .into());
        }
        engine.drop_database(uri).await?;
    }
    engine.create_database(uri).await?;

    let handle = engine.connect(uri).await?;
    let ctx = ApplyContext::new(handle.as_ref(), uri);
    let applied = applier.apply(&ctx, &chunks).await?;

    tracing::info!(
        "✅ Database '{}' bootstrapped ({} script(s))",
        uri.database(),
        applied
    );
    Ok(applied)
}

/// Create `schema` inside the database behind `handle`, select it, and apply
/// the scripts in `scripts_dir`
///
/// `uri` must point at the same database as `handle`; procedural scripts use
/// it to connect on their own. Replace semantics match
/// [`bootstrap_database`].
pub async fn bootstrap_schema<E>(
    engine: &E,
    handle: &dyn DbHandle,
    uri: &ConnectionUri,
    schema: &str,
    scripts_dir: &Path,
    applier: &Applier,
    replace: bool,
) -> Result<usize>
where
    E: Introspector + Provisioner + ?Sized,
{
    tracing::info!(
        "Bootstrapping schema '{}' in '{}' from {}",
        schema,
        uri.database(),
        scripts_dir.display()
    );

    let chunks = collect(scripts_dir, &applier.extensions())?;
    tracing::info!("Found {} script(s) to apply", chunks.len());

    if engine.schema_exists(handle, schema).await? {
        if !replace {
            return Err(MigrateError::BootstrapConflict {
                kind: TargetKind::Schema,
                name: schema.to_string(),
            }
            .into());
        }
        engine.drop_schema(handle, schema).await?;
    }
    engine.create_schema(handle, schema).await?;
    engine.use_schema(handle, schema).await?;

    let ctx = ApplyContext::new(handle, uri).with_schema(schema);
    let applied = applier.apply(&ctx, &chunks).await?;

    tracing::info!("✅ Schema '{}' bootstrapped ({} script(s))", schema, applied);
    Ok(applied)
}
