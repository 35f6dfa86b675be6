// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Urth Control - Scenario Run Lifecycle
//!
//! This crate drives synthetic-monitoring runs: it creates results for
//! scenarios, hands jobs to a scheduler, lets exactly one runner claim each
//! run, and accepts the outcome only from the holder of the claim token.
//!
//! # Lifecycle
//!
//! | Operation | Transition | Fails with |
//! |-----------|------------|------------|
//! | [`ControlPlane::submit`] | new → `pending` | `NotFound`, `Forbidden`, `DispatchFailure` |
//! | [`ControlPlane::claim`] | `pending` → `running` | `Unauthorized`, `VersionConflict` |
//! | [`ControlPlane::complete`] | `running` → end | `NotFound`, `Unauthorized`, `VersionConflict` |
//!
//! Submit is `Forbidden` for an inactive scenario. Claim is `Unauthorized`
//! for a missing revision, a run that is already claimed, or a run that is no
//! longer `pending`. Complete is `Unauthorized` for a wrong token or a run that
//! already left `running`, and finishes the run as `completed` or `errored`.
//!
//! Expiry of runs that are never claimed or never completed is left to an
//! external reaper using the same versioned writes.
//!
//! # Runners
//!
//! Runners authenticate with the id token minted at creation
//! ([`ControlPlane::auth_runner`]). Jobs are routed with
//! [`Job::accepts_runner`], which checks requirements in both directions.
//!
//! # Dispatch
//!
//! [`Scheduler`] abstracts the queue. [`ChannelScheduler`] is the in-process
//! implementation; without a scheduler, submit only persists.

#![warn(missing_docs)]

pub mod config;
pub mod control_plane;
pub mod error;
pub mod scheduler;

pub use config::{Config, ConfigError};
pub use control_plane::{
    Claim, ControlPlane, ControlPlaneBuilder, RunReport, RunnerRegistration, SubmitRequest,
    Submitted,
};
pub use error::{Error, Result};
pub use scheduler::{ChannelScheduler, Job, JobQueue, QueuedTask, RunId, Scheduler, SchedulerError};
