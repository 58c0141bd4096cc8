// ABOUTME: PostgreSQL engine implementation
// ABOUTME: Connection handling, catalog introspection, provisioning and COPY transfer

pub mod catalog;
pub mod connection;
pub mod copy;
pub mod tools;

pub use catalog::ADMIN_DATABASE;
pub use connection::connect;
pub use copy::{copy_in_sql, copy_out_sql, copy_source, select_query};

/// The PostgreSQL engine.
///
/// Implements [`Introspector`](crate::engine::Introspector),
/// [`Provisioner`](crate::engine::Provisioner) and
/// [`BulkTransfer`](crate::engine::BulkTransfer).
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;
