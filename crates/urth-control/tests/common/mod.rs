// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for urth-control integration tests.
//!
//! Provides TestContext for setting up a store, a scheduler and the control
//! plane, plus manifest builders.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use urth_control::control_plane::ControlPlane;
use urth_control::scheduler::{
    self, ChannelScheduler, Job, JobQueue, RunId, Scheduler, SchedulerError,
};
use urth_core::kind::KindRegistry;
use urth_core::labels::Labels;
use urth_core::manifest::{Manifest, ObjectMeta, ProbeManifest};
use urth_core::model::{RunnerSpec, ScenarioSpec, standard_registry};
use urth_core::probes::HttpProbeSpec;
use urth_core::selector::LabelSelector;
use urth_core::store::{MemoryStore, SqliteStore, Store};

/// Test context that wires a store, an optional queue and the control plane.
pub struct TestContext {
    pub control: ControlPlane,
    pub registry: Arc<KindRegistry>,
    pub scheduler: Option<Arc<ChannelScheduler>>,
    pub queue: Option<JobQueue>,
}

impl TestContext {
    /// In-memory store with an in-process queue.
    pub fn new() -> Self {
        Self::with_store(Store::new(Arc::new(MemoryStore::new())), true)
    }

    /// In-memory store and no scheduler.
    pub fn without_scheduler() -> Self {
        Self::with_store(Store::new(Arc::new(MemoryStore::new())), false)
    }

    /// Custom in-memory store and no scheduler.
    pub fn with_memory_store(store: MemoryStore) -> Self {
        Self::with_store(Store::new(Arc::new(store)), false)
    }

    /// In-memory SQLite store with an in-process queue.
    pub async fn sqlite() -> Self {
        let backend = SqliteStore::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite store");
        Self::with_store(Store::new(Arc::new(backend)), true)
    }

    /// Control plane over `store` with a custom scheduler.
    pub fn with_scheduler(store: Store, scheduler: Arc<dyn Scheduler>) -> ControlPlane {
        ControlPlane::builder()
            .store(store)
            .registry(Arc::new(standard_registry()))
            .scheduler(scheduler)
            .build()
            .expect("Failed to build control plane")
    }

    fn with_store(store: Store, dispatch: bool) -> Self {
        let registry = Arc::new(standard_registry());
        let mut builder = ControlPlane::builder().store(store).registry(registry.clone());

        let (scheduler, queue) = if dispatch {
            let (scheduler, queue) = ChannelScheduler::new(16);
            let scheduler = Arc::new(scheduler);
            builder = builder.scheduler(scheduler.clone());
            (Some(scheduler), Some(queue))
        } else {
            (None, None)
        };

        Self {
            control: builder.build().expect("Failed to build control plane"),
            registry,
            scheduler,
            queue,
        }
    }

    /// Take the next queued job, decoded.
    pub fn next_job(&mut self) -> Option<Job> {
        let task = self.queue.as_mut()?.try_recv()?;
        Some(task.decode(&self.registry).expect("queued job decodes"))
    }

    /// A `scenarios` manifest with an HTTP probe.
    pub fn scenario_manifest(&self, name: &str, labels: Labels, is_active: bool) -> Manifest {
        let mut probe = ProbeManifest::from_payload(
            &self.registry,
            HttpProbeSpec {
                follow_redirects: true,
                script: "GET https://example.com/ HTTP/1.1\n".to_string(),
            },
        )
        .expect("http probe is registered");
        probe.timeout = Some(Duration::from_secs(10));

        let spec = ScenarioSpec {
            description: format!("{name} check"),
            requirements: LabelSelector::default(),
            schedule: Some("*/5 * * * *".to_string()),
            is_active,
            probe,
        };
        Manifest::from_payload(&self.registry, meta(name, labels), spec)
            .expect("scenarios is registered")
    }

    /// A `runners` manifest.
    pub fn runner_manifest(&self, name: &str, labels: Labels, is_active: bool) -> Manifest {
        let spec = RunnerSpec {
            description: format!("{name} runner"),
            is_active,
            ..Default::default()
        };
        Manifest::from_payload(&self.registry, meta(name, labels), spec)
            .expect("runners is registered")
    }
}

/// Envelope metadata with a name and labels.
pub fn meta(name: &str, labels: Labels) -> ObjectMeta {
    ObjectMeta {
        name: name.to_string(),
        labels,
        ..Default::default()
    }
}

/// Scheduler that refuses every job.
#[derive(Default)]
pub struct FailingScheduler {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Scheduler for FailingScheduler {
    fn scheduler_type(&self) -> &'static str {
        "failing"
    }

    async fn schedule(&self, _job: &Job) -> scheduler::Result<RunId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SchedulerError::Rejected("broker unavailable".to_string()))
    }

    async fn close(&self) -> scheduler::Result<()> {
        Ok(())
    }
}
