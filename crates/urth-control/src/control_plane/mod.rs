// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The lifecycle service.
//!
//! [`ControlPlane`] is what a transport layer calls into. It owns no
//! background tasks: every operation runs to completion in the caller's
//! task, does at most one compare-and-swap against the store, and for
//! submit one call to the scheduler. Concurrency safety comes entirely from
//! the store's version guard.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use urth_control::{ChannelScheduler, ControlPlane};
//! use urth_core::{MemoryStore, Store};
//!
//! let (scheduler, queue) = ChannelScheduler::new(64);
//! let control = ControlPlane::builder()
//!     .store(Store::new(Arc::new(MemoryStore::new())))
//!     .scheduler(Arc::new(scheduler))
//!     .build()?;
//! ```

mod artifacts;
mod results;
mod runners;
mod scenarios;

pub use results::{Claim, RunReport, SubmitRequest, Submitted};
pub use runners::RunnerRegistration;

use std::sync::Arc;

use anyhow::Result as AnyResult;
use urth_core::kind::{KindRegistry, Payload};
use urth_core::manifest::{Manifest, ObjectMeta};
use urth_core::model::standard_registry;
use urth_core::resource::{Resource, VersionedResourceId};
use urth_core::store::{Pagination, ResourceLabel, Store};

use crate::error::{Error, Result};
use crate::scheduler::Scheduler;

/// Builder for creating a [`ControlPlane`].
#[derive(Default)]
pub struct ControlPlaneBuilder {
    store: Option<Store>,
    registry: Option<Arc<KindRegistry>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl std::fmt::Debug for ControlPlaneBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneBuilder")
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("registry", &self.registry)
            .field(
                "scheduler",
                &self.scheduler.as_ref().map(|s| s.scheduler_type()),
            )
            .finish()
    }
}

impl ControlPlaneBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resource store (required).
    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the kind registry.
    ///
    /// Default: [`standard_registry`], the resource kinds plus the built-in
    /// probe kinds.
    pub fn registry(mut self, registry: Arc<KindRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the scheduler. Without one, submit persists the run and
    /// dispatches nothing.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build the control plane.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> AnyResult<ControlPlane> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;

        Ok(ControlPlane {
            store,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(standard_registry())),
            scheduler: self.scheduler,
        })
    }
}

/// Lifecycle service for scenarios, runners, results and artifacts.
#[derive(Clone)]
pub struct ControlPlane {
    store: Store,
    registry: Arc<KindRegistry>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("store", &"...")
            .field("registry", &self.registry)
            .field(
                "scheduler",
                &self.scheduler.as_ref().map(|s| s.scheduler_type()),
            )
            .finish()
    }
}

impl ControlPlane {
    /// Create a new builder for configuring the control plane.
    pub fn builder() -> ControlPlaneBuilder {
        ControlPlaneBuilder::new()
    }

    /// The kind registry manifests are resolved against.
    pub fn registry(&self) -> &Arc<KindRegistry> {
        &self.registry
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Whether submitted runs are dispatched.
    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Distinct labels in use by live resources.
    pub async fn list_labels(&self, pagination: Pagination) -> Result<Vec<ResourceLabel>> {
        Ok(self.store.list_labels(pagination).await?)
    }

    /// Render a stored resource as a manifest.
    pub fn manifest_of<T>(&self, resource: &T) -> Result<Manifest>
    where
        T: Resource,
        T::Spec: Payload,
    {
        Ok(urth_core::model::to_manifest(&self.registry, resource)?)
    }

    /// Decode a manifest into a named payload of type `T`.
    fn decode_manifest<T: Payload>(&self, manifest: Manifest) -> Result<(ObjectMeta, T)> {
        let (metadata, payload) = manifest.into_payload::<T>(&self.registry)?;
        if metadata.name.trim().is_empty() {
            return Err(Error::InvalidRequest("metadata.name is required".to_string()));
        }
        Ok((metadata, payload))
    }

    /// Fetch a resource that must exist.
    async fn require<T: Resource>(&self, id: urth_core::ResourceId) -> Result<T> {
        self.store
            .get::<T>(id)
            .await?
            .ok_or(Error::NotFound {
                resource_type: T::RESOURCE_TYPE,
                id,
            })
    }

    /// Explain why a write at `id` did not apply.
    async fn write_rejected<T: Resource>(&self, id: VersionedResourceId) -> Error {
        match self.store.get::<T>(id.id).await {
            Ok(Some(_)) => Error::VersionConflict {
                resource_type: T::RESOURCE_TYPE,
                id,
            },
            Ok(None) => Error::NotFound {
                resource_type: T::RESOURCE_TYPE,
                id: id.id,
            },
            Err(e) => e.into(),
        }
    }

    /// Fetch the exact revision `id`, distinguishing missing from stale.
    async fn require_version<T: Resource>(&self, id: VersionedResourceId) -> Result<T> {
        match self.store.get_with_version::<T>(id).await? {
            Some(resource) => Ok(resource),
            None => Err(self.write_rejected::<T>(id).await),
        }
    }

    /// CAS-update or explain why not.
    async fn update_at<T: Resource>(
        &self,
        resource: &mut T,
        id: VersionedResourceId,
    ) -> Result<()> {
        if self.store.update(resource, id).await? {
            Ok(())
        } else {
            Err(self.write_rejected::<T>(id).await)
        }
    }

    /// CAS-delete or explain why not.
    async fn delete_at<T: Resource>(&self, id: VersionedResourceId) -> Result<()> {
        if self.store.delete::<T>(id).await? {
            Ok(())
        } else {
            Err(self.write_rejected::<T>(id).await)
        }
    }
}

/// Page size a caller effectively asked for, under the cap `max`.
fn effective_limit(pagination: Pagination, max: u32) -> usize {
    pagination.clamp(max).limit as usize
}
