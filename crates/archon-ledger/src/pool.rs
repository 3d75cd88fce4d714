// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Connection pooling and migration bootstrap. One Postgres database is
//! authoritative for the whole system (§1 non-goals); this module is the
//! only place that opens a connection to it.

use diesel::Connection;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use archon_types::ArchonError;

/// Pooled async connection handle shared by every downstream crate.
pub type PgPool = Pool<AsyncPgConnection>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Opens a bb8-backed pool of async Postgres connections.
pub async fn connect(database_url: &str) -> Result<PgPool, ArchonError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .await
        .map_err(|e| ArchonError::Storage(format!("failed to build connection pool: {e}")))
}

/// Runs all embedded migrations. `diesel_migrations` only speaks the
/// synchronous `diesel::Connection` trait, so this opens one blocking
/// connection on a dedicated thread rather than borrowing from the pool.
pub async fn run_migrations(database_url: &str) -> Result<(), ArchonError> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = diesel::PgConnection::establish(&database_url)
            .map_err(|e| ArchonError::Storage(format!("failed to connect for migrations: {e}")))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| ArchonError::Storage(format!("failed to run migrations: {e}")))?;
        Ok(())
    })
    .await
    .map_err(|e| ArchonError::Storage(format!("migration task panicked: {e}")))?
}
