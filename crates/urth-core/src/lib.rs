// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Urth Core - Resource Model for Synthetic Monitoring
//!
//! This crate holds everything the control plane persists and exchanges:
//! polymorphic manifests, label selectors, and a versioned resource store
//! with compare-and-swap writes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      urth-control (ControlPlane)                         │
//! │          submit / claim / complete, runner auth, listings                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                                              │
//!           │ typed CRUD                                   │ manifests
//!           ▼                                              ▼
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │   store::Store        │                    │   manifest / kind           │
//! │  (CAS on version)     │                    │  (KindRegistry, Spec)       │
//! └───────────────────────┘                    └─────────────────────────────┘
//!           │
//!           ▼
//! ┌───────────────────────┐     ┌───────────────────────┐
//! │  SqliteStore          │     │  MemoryStore          │
//! │  (selector -> SQL)    │     │  (selector in-memory) │
//! └───────────────────────┘     └───────────────────────┘
//! ```
//!
//! # Kinds and manifests
//!
//! A [`Manifest`] is an envelope whose `kind` names the shape of its `spec`.
//! The [`KindRegistry`] maps kinds to Rust types. Decoding always yields an
//! untyped spec first; [`Manifest::resolve`] then turns it into the
//! registered type. Unknown kinds stay untyped, so manifests written by a
//! newer peer still load. Probe manifests nested inside scenarios resolve
//! through the same registry.
//!
//! # Selectors
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `key` / `!key` | key present / absent |
//! | `key=v`, `key==v`, `key!=v` | equality; `!=` requires the key |
//! | `key in (a,b)`, `key notin (a,b)` | set membership; `notin` matches a missing key |
//! | `key>n`, `key<n` | numeric comparison |
//!
//! The in-memory evaluator and the SQL translation agree on every input.
//!
//! # Store
//!
//! Every mutation carries the version it expects. A stale version is not an
//! error: the write simply does not apply and the caller sees `false`.

#![warn(missing_docs)]

pub mod error;
pub mod kind;
pub mod labels;
pub mod manifest;
pub mod migrations;
pub mod model;
pub mod probes;
pub mod resource;
pub mod selector;
pub mod store;
pub mod token;

pub use error::StoreError;
pub use kind::{DynPayload, Kind, KindError, KindRegistry, Payload, Spec};
pub use labels::{Labels, merge_labels};
pub use manifest::{Manifest, ObjectMeta, ProbeManifest};
pub use model::{
    Artifact, ArtifactSpec, JobStatus, ResultSpec, RunOutcome, RunResult, Runner, RunnerSpec,
    Scenario, ScenarioSpec, standard_registry,
};
pub use resource::{
    Resource, ResourceId, ResourceMeta, ResourceRecord, TokenBearing, Version, VersionedResourceId,
};
pub use selector::{LabelSelector, Operator, Requirement, Selector, SelectorError};
pub use store::{
    DeleteMode, MemoryStore, Pagination, ResourceLabel, ResourceStore, SqliteStore, Store,
};
pub use token::ApiToken;
