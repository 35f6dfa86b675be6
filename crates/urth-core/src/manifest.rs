// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire envelopes.
//!
//! [`Manifest`] is the resource envelope
//! `{apiVersion?, kind, metadata: {name, labels?}, spec}` and
//! [`ProbeManifest`] is the probe envelope `{kind, timeout?, spec}`.
//! Both decode in two steps: serde reads the envelope with an untyped spec,
//! then the spec is resolved against a [`KindRegistry`]. JSON and YAML share
//! the second step, so both formats produce identical values.
//!
//! Resolution rules:
//! - absent, `null` or `{}` spec decodes to `None`;
//! - an unregistered kind keeps the spec as an untyped value;
//! - a registered kind whose spec does not fit is a `TypeMismatch`;
//! - a spec without a kind is `MissingKind`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kind::{Kind, KindError, KindRegistry, Payload, Result, Spec};
use crate::labels::Labels;
use crate::resource::{ResourceId, ResourceMeta, Version};

/// Envelope metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Resource name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Store id, present on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<ResourceId>,
    /// Store version, present on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// Labels.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl ObjectMeta {
    /// Metadata with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// True if nothing is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.uid.is_none()
            && self.version.is_none()
            && self.labels.is_empty()
    }
}

impl From<&ResourceMeta> for ObjectMeta {
    fn from(meta: &ResourceMeta) -> Self {
        Self {
            name: meta.name.clone(),
            uid: Some(meta.id),
            version: Some(meta.version),
            labels: meta.labels.clone(),
        }
    }
}

/// Resource envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Optional API version tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Discriminator for `spec`.
    #[serde(default, skip_serializing_if = "Kind::is_empty")]
    pub kind: Kind,
    /// Name and labels.
    #[serde(default, skip_serializing_if = "ObjectMeta::is_empty")]
    pub metadata: ObjectMeta,
    /// Kind-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Spec>,
}

impl Manifest {
    /// Wrap a payload, taking its kind from the registry.
    pub fn from_payload<T: Payload>(
        registry: &KindRegistry,
        metadata: ObjectMeta,
        payload: T,
    ) -> Result<Self> {
        let kind = registry
            .kind_of_type::<T>()
            .cloned()
            .ok_or_else(|| KindError::UnknownKind(Kind::from(std::any::type_name::<T>())))?;
        Ok(Self {
            api_version: None,
            kind,
            metadata,
            spec: Some(Spec::typed(payload)),
        })
    }

    /// Resolve the spec against the registry, tolerating unknown kinds.
    pub fn resolve(mut self, registry: &KindRegistry) -> Result<Self> {
        self.spec = registry.resolve(self.kind.as_str(), self.spec.take())?;
        Ok(self)
    }

    /// Decode JSON.
    pub fn from_json(input: &str, registry: &KindRegistry) -> Result<Self> {
        serde_json::from_str::<Self>(input)?.resolve(registry)
    }

    /// Decode YAML.
    pub fn from_yaml(input: &str, registry: &KindRegistry) -> Result<Self> {
        serde_yaml::from_str::<Self>(input)?.resolve(registry)
    }

    /// Encode JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Extract a typed payload of the kind registered for `T`.
    ///
    /// A missing spec yields `T::default()`.
    pub fn into_payload<T: Payload>(self, registry: &KindRegistry) -> Result<(ObjectMeta, T)> {
        let expected = registry
            .kind_of_type::<T>()
            .ok_or_else(|| KindError::UnknownKind(Kind::from(std::any::type_name::<T>())))?;
        if *expected != self.kind {
            return Err(KindError::UnexpectedKind {
                expected: expected.clone(),
                found: self.kind,
            });
        }

        let payload = match registry.resolve_strict(self.kind.as_str(), self.spec)? {
            None => T::default(),
            Some(spec) => spec.downcast::<T>().map_err(|_| KindError::UnexpectedKind {
                expected: expected.clone(),
                found: self.kind.clone(),
            })?,
        };
        Ok((self.metadata, payload))
    }
}

/// Probe envelope carried by scenarios and jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeManifest {
    /// Probe kind, e.g. `http`.
    #[serde(default, skip_serializing_if = "Kind::is_empty")]
    pub kind: Kind,
    /// Execution timeout, in milliseconds on the wire.
    #[serde(
        default,
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    /// Kind-specific probe payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Spec>,
}

impl ProbeManifest {
    /// Probe manifest for a typed payload, taking its kind from the registry.
    pub fn from_payload<T: Payload>(registry: &KindRegistry, payload: T) -> Result<Self> {
        let kind = registry
            .kind_of_type::<T>()
            .cloned()
            .ok_or_else(|| KindError::UnknownKind(Kind::from(std::any::type_name::<T>())))?;
        Ok(Self {
            kind,
            timeout: None,
            spec: Some(Spec::typed(payload)),
        })
    }

    /// Resolve the spec in place, tolerating unknown kinds.
    pub fn resolve(&mut self, registry: &KindRegistry) -> Result<()> {
        self.spec = registry.resolve(self.kind.as_str(), self.spec.take())?;
        Ok(())
    }

    /// Resolve the spec in place; an unknown kind is an error.
    pub fn resolve_strict(&mut self, registry: &KindRegistry) -> Result<()> {
        self.spec = registry.resolve_strict(self.kind.as_str(), self.spec.take())?;
        Ok(())
    }

    /// Decode JSON.
    pub fn from_json(input: &str, registry: &KindRegistry) -> Result<Self> {
        let mut manifest: Self = serde_json::from_str(input)?;
        manifest.resolve(registry)?;
        Ok(manifest)
    }

    /// Decode YAML.
    pub fn from_yaml(input: &str, registry: &KindRegistry) -> Result<Self> {
        let mut manifest: Self = serde_yaml::from_str(input)?;
        manifest.resolve(registry)?;
        Ok(manifest)
    }

    /// Encode JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
