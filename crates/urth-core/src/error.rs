// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Store errors.
//!
//! "Not found" and "version conflict" are not errors at this layer: reads
//! return `Option` and writes return `applied: bool`. What remains are
//! genuine failures of the backend.

use thiserror::Error;

use crate::resource::ResourceId;
use crate::selector::SelectorError;

/// Result type using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by store backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A live resource of the same type already has this name.
    #[error("{resource_type} named '{name}' already exists")]
    AlreadyExists {
        /// Storage partition.
        resource_type: String,
        /// Conflicting name.
        name: String,
    },

    /// A stored row could not be decoded.
    #[error("resource {id} is corrupt: {details}")]
    Corrupt {
        /// Id of the offending row.
        id: ResourceId,
        /// What went wrong.
        details: String,
    },

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Spec (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Selector could not be translated into a query.
    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),
}

impl StoreError {
    /// Stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Corrupt { .. } => "CORRUPT_RECORD",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migrate(_) => "MIGRATION_ERROR",
            Self::Json(_) => "SERIALIZATION_ERROR",
            Self::Selector(_) => "INVALID_SELECTOR",
        }
    }
}
