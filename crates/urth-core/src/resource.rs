// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource identity and metadata shared by every persisted entity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::labels::Labels;

/// Store-assigned resource id. Never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic-concurrency counter, bumped by the store on every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    /// The version after one successful mutation.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An `(id, version)` pair addressing one revision of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedResourceId {
    /// Resource id.
    pub id: ResourceId,
    /// Expected version.
    pub version: Version,
}

impl VersionedResourceId {
    /// Build from raw parts.
    pub fn new(id: u64, version: u64) -> Self {
        Self {
            id: ResourceId(id),
            version: Version(version),
        }
    }
}

impl fmt::Display for VersionedResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.id, self.version)
    }
}

/// Metadata common to all resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    /// Store-assigned id; zero until created.
    pub id: ResourceId,
    /// Current version; zero until created.
    pub version: Version,
    /// Name, unique among live resources of the same type.
    pub name: String,
    /// Labels used for selection and lineage.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last successful mutation.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Deleted resources are invisible to reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ResourceMeta {
    /// Metadata for a resource that has not been stored yet.
    pub fn new(name: impl Into<String>, labels: Labels) -> Self {
        let now = Utc::now();
        Self {
            id: ResourceId::default(),
            version: Version::default(),
            name: name.into(),
            labels,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// The `(id, version)` of this revision.
    pub fn versioned_id(&self) -> VersionedResourceId {
        VersionedResourceId {
            id: self.id,
            version: self.version,
        }
    }
}

/// A typed resource persisted through the store.
///
/// Concrete entities pair [`ResourceMeta`] with a serializable spec.
/// Secrets are kept out of the spec and persisted only as a digest in the
/// store's token column.
pub trait Resource: Sized + Send + Sync {
    /// Storage partition name, e.g. `scenarios`.
    const RESOURCE_TYPE: &'static str;

    /// Whether delete leaves a tombstone (`true`) or removes the row.
    const SOFT_DELETE: bool = true;

    /// Payload persisted in the spec column.
    type Spec: Serialize + DeserializeOwned + Send + Sync;

    /// Shared metadata.
    fn meta(&self) -> &ResourceMeta;

    /// Mutable shared metadata.
    fn meta_mut(&mut self) -> &mut ResourceMeta;

    /// The spec.
    fn spec(&self) -> &Self::Spec;

    /// Digest of the resource's secret token, if any.
    fn token_hash(&self) -> Option<&str> {
        None
    }

    /// Reassemble from stored parts.
    fn from_parts(meta: ResourceMeta, spec: Self::Spec, token_hash: Option<String>) -> Self;
}

/// Resources that may be looked up by their secret token.
pub trait TokenBearing: Resource {}

/// Type-erased resource as handled by store backends.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Storage partition.
    pub resource_type: String,
    /// Shared metadata.
    pub meta: ResourceMeta,
    /// Serialized spec.
    pub spec: serde_json::Value,
    /// Digest of the secret token.
    pub token_hash: Option<String>,
}

impl ResourceRecord {
    /// Erase a typed resource.
    pub fn from_resource<T: Resource>(resource: &T) -> Result<Self> {
        Ok(Self {
            resource_type: T::RESOURCE_TYPE.to_string(),
            meta: resource.meta().clone(),
            spec: serde_json::to_value(resource.spec())?,
            token_hash: resource.token_hash().map(str::to_string),
        })
    }

    /// Restore the typed resource.
    pub fn into_resource<T: Resource>(self) -> Result<T> {
        if self.resource_type != T::RESOURCE_TYPE {
            return Err(StoreError::Corrupt {
                id: self.meta.id,
                details: format!(
                    "expected resource type '{}', found '{}'",
                    T::RESOURCE_TYPE,
                    self.resource_type
                ),
            });
        }
        let spec = serde_json::from_value(self.spec)?;
        Ok(T::from_parts(self.meta, spec, self.token_hash))
    }
}
