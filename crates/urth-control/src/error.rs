// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the control plane.
//!
//! Store-level "missing" and "lost CAS" outcomes are translated into this
//! taxonomy at the service boundary; raw storage failures surface as
//! [`Error::Store`].

use thiserror::Error;

use urth_core::kind::{Kind, KindError};
use urth_core::resource::{ResourceId, VersionedResourceId};
use urth_core::selector::SelectorError;
use urth_core::error::StoreError;

use crate::scheduler::SchedulerError;

/// Control plane errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No live resource at the given id.
    #[error("{resource_type} not found: {id}")]
    NotFound {
        /// Resource type.
        resource_type: &'static str,
        /// Requested id.
        id: ResourceId,
    },

    /// A compare-and-swap write lost the race.
    #[error("version conflict on {resource_type} {id}")]
    VersionConflict {
        /// Resource type.
        resource_type: &'static str,
        /// The version the caller held.
        id: VersionedResourceId,
    },

    /// Bad or missing credential, or the run was already claimed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request is valid but the resource state disallows it.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The manifest kind is not registered.
    #[error("Unknown kind: {0}")]
    UnknownKind(Kind),

    /// A selector could not be parsed or translated.
    #[error("Invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    /// The scheduler refused the job.
    #[error("Dispatch failed: {0}")]
    DispatchFailure(#[source] SchedulerError),

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence failed.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl Error {
    /// Stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::UnknownKind(_) => "UNKNOWN_KIND",
            Self::InvalidSelector(_) => "INVALID_SELECTOR",
            Self::DispatchFailure(_) => "DISPATCH_FAILURE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Store(e) => e.error_code(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Selector(e) => Self::InvalidSelector(e),
            other => Self::Store(other),
        }
    }
}

impl From<KindError> for Error {
    fn from(err: KindError) -> Self {
        match err {
            KindError::UnknownKind(kind) => Self::UnknownKind(kind),
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

/// Result type using the control plane [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
