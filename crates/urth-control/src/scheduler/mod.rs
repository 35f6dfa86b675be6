// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scheduler trait definitions.
//!
//! Defines the interface between the lifecycle service and whatever
//! distributes work to runners. The service only ever sees the returned
//! [`RunId`]; queue internals stay behind the trait.

mod channel;

pub use channel::{ChannelScheduler, JobQueue, SchedulerStats};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use urth_core::kind::{self, KindRegistry};
use urth_core::labels::Labels;
use urth_core::manifest::ProbeManifest;
use urth_core::resource::VersionedResourceId;
use urth_core::selector::{self, LabelSelector};

/// Topic of scenario run tasks.
pub const TOPIC_SCENARIO_RUN: &str = "scenario:run";

/// Errors from scheduler operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    /// The scheduler has been closed.
    #[error("Scheduler is closed")]
    Closed,

    /// The job could not be encoded.
    #[error("Failed to serialize job: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The queue refused the job.
    #[error("Job rejected: {0}")]
    Rejected(String),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Opaque id of a dispatched run, for logging and correlation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work item handed to a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Result this run reports into.
    pub result: VersionedResourceId,
    /// Name of that result.
    pub result_name: String,
    /// Scenario name.
    pub scenario_name: String,
    /// Scenario revision being run.
    pub scenario: VersionedResourceId,
    /// Merged labels of the result.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Labels a runner must carry to take the job.
    #[serde(default, skip_serializing_if = "LabelSelector::is_empty")]
    pub requirements: LabelSelector,
    /// Cron-like schedule of the scenario.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Probe to execute.
    pub probe: ProbeManifest,
    /// Ask the runner to keep its working directory.
    #[serde(default)]
    pub keep_directory: bool,
}

impl Job {
    /// Two-way routing check.
    ///
    /// The runner's labels must satisfy the job's requirements, and the
    /// job's labels must satisfy the runner's requirements.
    pub fn accepts_runner(
        &self,
        runner_labels: &Labels,
        runner_requirements: &LabelSelector,
    ) -> selector::Result<bool> {
        Ok(self.requirements.to_selector()?.matches(runner_labels)
            && runner_requirements.to_selector()?.matches(&self.labels))
    }
}

/// A job as it travels through a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    /// Run id assigned at dispatch.
    pub id: RunId,
    /// Routing topic.
    pub topic: String,
    /// JSON-encoded [`Job`].
    pub payload: Vec<u8>,
}

impl QueuedTask {
    /// Encode a job for the queue.
    pub fn encode(job: &Job) -> Result<Self> {
        Ok(Self {
            id: RunId::new(),
            topic: TOPIC_SCENARIO_RUN.to_string(),
            payload: serde_json::to_vec(job)?,
        })
    }

    /// Decode the job, resolving its probe strictly.
    ///
    /// A runner cannot execute a probe it does not know, so an
    /// unregistered probe kind is an error here.
    pub fn decode(&self, registry: &KindRegistry) -> kind::Result<Job> {
        let mut job: Job = serde_json::from_slice(&self.payload)?;
        job.probe.resolve_strict(registry)?;
        Ok(job)
    }
}

/// Trait for job schedulers.
///
/// Implementations own message format, durability and redelivery. The
/// lifecycle service never retries a failed `schedule`.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Scheduler type identifier (e.g., "channel")
    fn scheduler_type(&self) -> &'static str;

    /// Hand a job to the queue.
    async fn schedule(&self, job: &Job) -> Result<RunId>;

    /// Release the scheduler's resources. Idempotent.
    async fn close(&self) -> Result<()>;
}
