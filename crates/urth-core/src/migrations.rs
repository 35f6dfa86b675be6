// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for urth-core.
//!
//! Embedded migrations that can be run programmatically. [`SqliteStore`]
//! runs them on connect; products that bring their own pool call
//! [`run_sqlite`] before constructing the store.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::SqlitePool;
//! use urth_core::migrations;
//!
//! let pool = SqlitePool::connect(&database_url).await?;
//! migrations::run_sqlite(&pool).await?;
//! ```
//!
//! [`SqliteStore`]: crate::store::SqliteStore

use sqlx::migrate::MigrateError;

/// SQLite migrator with all schema migrations embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Run SQLite migrations.
///
/// Safe to call multiple times; already-applied migrations are skipped.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
