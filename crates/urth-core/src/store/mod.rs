// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Versioned resource store.
//!
//! [`ResourceStore`] is the object-safe contract implemented by backends
//! over type-erased [`ResourceRecord`]s. [`Store`] wraps any backend with a
//! typed API.
//!
//! Every mutation is a compare-and-swap on the stored version: it applies
//! only if the stored version still equals the supplied one, and bumps it by
//! exactly one. A lost race returns `Ok(false)`, never an error. There is no
//! unconditional write path.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resource::{Resource, ResourceId, ResourceRecord, TokenBearing, VersionedResourceId};
use crate::selector::Selector;
use crate::token::ApiToken;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Server-side cap on page size.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 512;

/// Offset/limit pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Rows to skip.
    #[serde(default)]
    pub offset: u32,
    /// Rows to return. Zero means "as many as allowed".
    #[serde(default)]
    pub limit: u32,
}

impl Pagination {
    /// Build a page request.
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// Clamp the limit to `max`. A zero limit becomes `max`.
    pub fn clamp(self, max: u32) -> Self {
        let limit = if self.limit == 0 || self.limit > max {
            max
        } else {
            self.limit
        };
        Self {
            offset: self.offset,
            limit,
        }
    }
}

/// How a delete treats the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Set the deletion marker and bump the version.
    Soft,
    /// Remove the row and its labels.
    Hard,
}

/// A distinct label pair in use by live resources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResourceLabel {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
}

/// Storage backend contract.
///
/// All reads exclude soft-deleted rows. `resource_type` partitions the
/// keyspace; ids are unique across partitions.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Largest page [`ResourceStore::find`] and
    /// [`ResourceStore::list_labels`] return.
    fn max_page_size(&self) -> u32;

    /// Insert a new resource and its labels.
    ///
    /// Assigns id, version 1 and timestamps, ignoring whatever the record
    /// carries, and returns the stored record.
    async fn create(&self, record: ResourceRecord) -> Result<ResourceRecord>;

    /// Point lookup by id.
    async fn get(&self, resource_type: &str, id: ResourceId) -> Result<Option<ResourceRecord>>;

    /// Point lookup by id, only if the stored version matches.
    async fn get_with_version(
        &self,
        resource_type: &str,
        id: VersionedResourceId,
    ) -> Result<Option<ResourceRecord>>;

    /// Lookup by token digest.
    async fn get_by_token(
        &self,
        resource_type: &str,
        token_hash: &str,
    ) -> Result<Option<ResourceRecord>>;

    /// Replace name, labels, spec and token digest if the stored version is
    /// still `id.version`. Returns whether the write applied.
    async fn update(&self, record: &ResourceRecord, id: VersionedResourceId) -> Result<bool>;

    /// Delete under the same version guard as [`ResourceStore::update`].
    async fn delete(
        &self,
        resource_type: &str,
        id: VersionedResourceId,
        mode: DeleteMode,
    ) -> Result<bool>;

    /// Resources whose labels match `selector`, oldest first.
    ///
    /// The page limit is clamped to the backend's maximum.
    async fn find(
        &self,
        resource_type: &str,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<ResourceRecord>>;

    /// Distinct label pairs of live resources, sorted.
    async fn list_labels(&self, pagination: Pagination) -> Result<Vec<ResourceLabel>>;
}

/// Typed facade over a [`ResourceStore`].
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn ResourceStore>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("backend", &"...").finish()
    }
}

impl Store {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn ResourceStore>) -> Self {
        Self { backend }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn ResourceStore> {
        &self.backend
    }

    /// The backend's page size cap.
    pub fn max_page_size(&self) -> u32 {
        self.backend.max_page_size()
    }

    /// Persist a new resource. On success `value.meta()` holds the assigned
    /// id, version and timestamps.
    pub async fn create<T: Resource>(&self, value: &mut T) -> Result<()> {
        let record = ResourceRecord::from_resource(value)?;
        let stored = self.backend.create(record).await?;
        *value.meta_mut() = stored.meta;
        Ok(())
    }

    /// Point lookup by id.
    pub async fn get<T: Resource>(&self, id: ResourceId) -> Result<Option<T>> {
        self.backend
            .get(T::RESOURCE_TYPE, id)
            .await?
            .map(ResourceRecord::into_resource)
            .transpose()
    }

    /// Point lookup by id and version.
    pub async fn get_with_version<T: Resource>(
        &self,
        id: VersionedResourceId,
    ) -> Result<Option<T>> {
        self.backend
            .get_with_version(T::RESOURCE_TYPE, id)
            .await?
            .map(ResourceRecord::into_resource)
            .transpose()
    }

    /// Lookup by secret token. Only token-bearing resources qualify.
    pub async fn get_by_token<T: TokenBearing>(&self, token: &ApiToken) -> Result<Option<T>> {
        if token.is_empty() {
            return Ok(None);
        }
        self.backend
            .get_by_token(T::RESOURCE_TYPE, &token.digest())
            .await?
            .map(ResourceRecord::into_resource)
            .transpose()
    }

    /// Compare-and-swap update. On success the in-memory version is bumped
    /// to match the store.
    pub async fn update<T: Resource>(
        &self,
        value: &mut T,
        id: VersionedResourceId,
    ) -> Result<bool> {
        let record = ResourceRecord::from_resource(value)?;
        let applied = self.backend.update(&record, id).await?;
        if applied {
            let meta = value.meta_mut();
            meta.id = id.id;
            meta.version = id.version.next();
        }
        Ok(applied)
    }

    /// Compare-and-swap delete. Soft for every type except those that
    /// opt out via [`Resource::SOFT_DELETE`].
    pub async fn delete<T: Resource>(&self, id: VersionedResourceId) -> Result<bool> {
        let mode = if T::SOFT_DELETE {
            DeleteMode::Soft
        } else {
            DeleteMode::Hard
        };
        self.backend.delete(T::RESOURCE_TYPE, id, mode).await
    }

    /// Filtered, paginated listing.
    pub async fn find<T: Resource>(
        &self,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<T>> {
        self.backend
            .find(T::RESOURCE_TYPE, selector, pagination)
            .await?
            .into_iter()
            .map(ResourceRecord::into_resource)
            .collect()
    }

    /// Distinct labels in use.
    pub async fn list_labels(&self, pagination: Pagination) -> Result<Vec<ResourceLabel>> {
        self.backend.list_labels(pagination).await
    }
}
