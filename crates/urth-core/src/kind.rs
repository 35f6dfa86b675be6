// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kind registry and dynamically typed payloads.
//!
//! A [`Kind`] is the string discriminator carried by every manifest. The
//! [`KindRegistry`] maps kinds to concrete payload types and back, so the
//! envelope codec can stay ignorant of the payload shapes it transports.
//!
//! The registry is an ordinary value. It is populated at startup through
//! `&mut self` methods and then shared behind an `Arc`, which makes
//! registration after startup impossible without an explicit rebuild.

use std::any::{Any, TypeId};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while resolving kinds and decoding payloads.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KindError {
    /// No payload type is registered for the kind.
    #[error("unknown kind '{0}'")]
    UnknownKind(Kind),

    /// A spec was supplied without a kind to resolve it.
    #[error("manifest has a spec but no kind")]
    MissingKind,

    /// The kind is known but the payload does not fit its shape.
    #[error("spec does not match kind '{kind}': {source}")]
    TypeMismatch {
        /// The kind the payload was decoded as.
        kind: Kind,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest carries a different kind than the caller expects.
    #[error("expected kind '{expected}', found '{found}'")]
    UnexpectedKind {
        /// Kind registered for the requested type.
        expected: Kind,
        /// Kind carried by the manifest.
        found: Kind,
    },

    /// JSON encode or decode failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encode or decode failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for kind resolution.
pub type Result<T> = std::result::Result<T, KindError>;

/// String discriminator selecting a payload shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    /// Create a kind from any string-like value.
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// The kind as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no kind is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Kind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Kind {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Kind {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A payload type that can be registered under a kind.
///
/// Implementors use their own serde representation on the wire. Payloads
/// that embed other manifests override [`Payload::resolve_nested`] so the
/// inner specs are resolved with the same registry.
pub trait Payload:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static
{
    /// Resolve specs nested inside this payload.
    fn resolve_nested(&mut self, registry: &KindRegistry) -> Result<()> {
        let _ = registry;
        Ok(())
    }
}

/// Object-safe view of a [`Payload`].
pub trait DynPayload: fmt::Debug + Send + Sync + 'static {
    /// Borrow as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into a boxed [`Any`] for owned downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Serialize with the payload's own serde representation.
    fn to_value(&self) -> serde_json::Result<Value>;

    /// Borrow as a type-erased serializable value.
    fn as_serialize(&self) -> &dyn erased_serde::Serialize;

    /// Clone into a new box.
    fn clone_box(&self) -> Box<dyn DynPayload>;

    /// Compare with another payload of possibly different type.
    fn eq_dyn(&self, other: &dyn DynPayload) -> bool;

    /// Dynamic entry point for [`Payload::resolve_nested`].
    fn resolve_nested_dyn(&mut self, registry: &KindRegistry) -> Result<()>;
}

impl<T: Payload> DynPayload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn as_serialize(&self) -> &dyn erased_serde::Serialize {
        self
    }

    fn clone_box(&self) -> Box<dyn DynPayload> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn DynPayload) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn resolve_nested_dyn(&mut self, registry: &KindRegistry) -> Result<()> {
        self.resolve_nested(registry)
    }
}

/// A manifest spec: either resolved to a registered type, or kept as a
/// generic JSON value when its kind is not registered.
///
/// Deserialization always produces [`Spec::Untyped`]; resolution against a
/// registry happens in a second step.
pub enum Spec {
    /// Payload decoded into its registered type.
    Typed(Box<dyn DynPayload>),
    /// Payload whose kind is not registered.
    Untyped(Value),
}

impl Spec {
    /// Wrap a typed payload.
    pub fn typed<T: Payload>(payload: T) -> Self {
        Self::Typed(Box::new(payload))
    }

    /// Borrow the payload as `T` if it was resolved to that type.
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        match self {
            Self::Typed(payload) => payload.as_any().downcast_ref::<T>(),
            Self::Untyped(_) => None,
        }
    }

    /// Take the payload as `T`, handing the spec back on mismatch.
    pub fn downcast<T: Payload>(self) -> std::result::Result<T, Self> {
        match self {
            Self::Typed(payload) if payload.as_any().is::<T>() => payload
                .into_any()
                .downcast::<T>()
                .map(|boxed| *boxed)
                .map_err(|_| Self::Untyped(Value::Null)),
            other => Err(other),
        }
    }

    /// True if the spec was resolved to a registered type.
    pub fn is_typed(&self) -> bool {
        matches!(self, Self::Typed(_))
    }

    /// Render as a JSON value.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Typed(payload) => payload.to_value(),
            Self::Untyped(value) => Ok(value.clone()),
        }
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typed(payload) => f.debug_tuple("Typed").field(payload).finish(),
            Self::Untyped(value) => f.debug_tuple("Untyped").field(value).finish(),
        }
    }
}

impl Clone for Spec {
    fn clone(&self) -> Self {
        match self {
            Self::Typed(payload) => Self::Typed(payload.clone_box()),
            Self::Untyped(value) => Self::Untyped(value.clone()),
        }
    }
}

impl PartialEq for Spec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Typed(a), Self::Typed(b)) => a.eq_dyn(b.as_ref()),
            (Self::Untyped(a), Self::Untyped(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Spec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Typed(payload) => erased_serde::serialize(payload.as_serialize(), serializer),
            Self::Untyped(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Spec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::Untyped)
    }
}

type DecodeFn = fn(Value) -> serde_json::Result<Box<dyn DynPayload>>;
type ZeroFn = fn() -> Box<dyn DynPayload>;

fn decode_payload<T: Payload>(value: Value) -> serde_json::Result<Box<dyn DynPayload>> {
    serde_json::from_value::<T>(value).map(|payload| Box::new(payload) as Box<dyn DynPayload>)
}

fn zero_payload<T: Payload>() -> Box<dyn DynPayload> {
    Box::new(T::default())
}

#[derive(Clone)]
struct KindEntry {
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn,
    zero: ZeroFn,
}

/// Bidirectional map between kinds and payload types.
#[derive(Clone, Default)]
pub struct KindRegistry {
    by_kind: HashMap<Kind, KindEntry>,
    by_type: HashMap<TypeId, Kind>,
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self
            .by_kind
            .iter()
            .map(|(kind, entry)| (kind.as_str(), entry.type_name))
            .collect();
        kinds.sort_unstable();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}

impl KindRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `kind`.
    ///
    /// Registering a kind twice replaces the earlier entry. The reverse
    /// mapping of `T` points at the most recent kind it was registered under.
    pub fn register<T: Payload>(&mut self, kind: impl Into<Kind>) -> &mut Self {
        let kind = kind.into();
        let type_id = TypeId::of::<T>();

        if let Some(previous) = self.by_kind.get(&kind)
            && previous.type_id != type_id
            && self.by_type.get(&previous.type_id) == Some(&kind)
        {
            self.by_type.remove(&previous.type_id);
        }

        self.by_kind.insert(
            kind.clone(),
            KindEntry {
                type_id,
                type_name: std::any::type_name::<T>(),
                decode: decode_payload::<T>,
                zero: zero_payload::<T>,
            },
        );
        self.by_type.insert(type_id, kind);
        self
    }

    /// Remove a kind. Returns false if it was not registered.
    pub fn unregister(&mut self, kind: &str) -> bool {
        let Some(entry) = self.by_kind.remove(kind) else {
            return false;
        };

        if self.by_type.get(&entry.type_id).map(Kind::as_str) == Some(kind) {
            self.by_type.remove(&entry.type_id);
            // Another kind may still map to the same type.
            if let Some((other, _)) = self
                .by_kind
                .iter()
                .find(|(_, other)| other.type_id == entry.type_id)
            {
                self.by_type.insert(entry.type_id, other.clone());
            }
        }
        true
    }

    /// True if `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&Kind> {
        let mut kinds: Vec<_> = self.by_kind.keys().collect();
        kinds.sort_unstable();
        kinds
    }

    /// A fresh zero value of the type registered for `kind`.
    pub fn instance_of(&self, kind: &str) -> Result<Box<dyn DynPayload>> {
        self.by_kind
            .get(kind)
            .map(|entry| (entry.zero)())
            .ok_or_else(|| KindError::UnknownKind(Kind::from(kind)))
    }

    /// The kind registered for the runtime type of `payload`.
    pub fn kind_of(&self, payload: &dyn DynPayload) -> Option<&Kind> {
        self.by_type.get(&Any::type_id(payload.as_any()))
    }

    /// The kind registered for `T`.
    pub fn kind_of_type<T: Payload>(&self) -> Option<&Kind> {
        self.by_type.get(&TypeId::of::<T>())
    }

    /// Resolve a spec against `kind`, tolerating unknown kinds.
    ///
    /// - an absent, null or empty spec resolves to `None`;
    /// - an unregistered kind keeps the spec as an untyped value;
    /// - a registered kind must decode into its type, else `TypeMismatch`.
    pub fn resolve(&self, kind: &str, spec: Option<Spec>) -> Result<Option<Spec>> {
        self.resolve_inner(kind, spec, false)
    }

    /// Like [`KindRegistry::resolve`], but an unregistered kind is an error.
    pub fn resolve_strict(&self, kind: &str, spec: Option<Spec>) -> Result<Option<Spec>> {
        self.resolve_inner(kind, spec, true)
    }

    fn resolve_inner(&self, kind: &str, spec: Option<Spec>, strict: bool) -> Result<Option<Spec>> {
        let value = match spec {
            None => return Ok(None),
            Some(Spec::Untyped(value)) if is_empty_value(&value) => return Ok(None),
            Some(Spec::Typed(payload)) => {
                if strict && self.kind_of(payload.as_ref()).map(Kind::as_str) != Some(kind) {
                    return Err(KindError::UnknownKind(Kind::from(kind)));
                }
                return Ok(Some(Spec::Typed(payload)));
            }
            Some(Spec::Untyped(value)) => value,
        };

        if kind.is_empty() {
            return Err(KindError::MissingKind);
        }

        let Some(entry) = self.by_kind.get(kind) else {
            if strict {
                return Err(KindError::UnknownKind(Kind::from(kind)));
            }
            return Ok(Some(Spec::Untyped(value)));
        };

        let mut payload = (entry.decode)(value).map_err(|source| KindError::TypeMismatch {
            kind: Kind::from(kind),
            source,
        })?;
        payload.resolve_nested_dyn(self)?;

        Ok(Some(Spec::Typed(payload)))
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
