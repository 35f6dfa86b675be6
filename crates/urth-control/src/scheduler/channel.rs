// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process scheduler backed by a bounded tokio channel.
//!
//! Used by the standalone daemon and by tests. A full queue rejects the job
//! rather than blocking the submitting caller.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use super::{Job, QueuedTask, Result, RunId, Scheduler, SchedulerError};

/// Counters of a [`ChannelScheduler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs accepted by the queue.
    pub dispatched: u64,
    /// Jobs refused (queue full, closed, or unencodable).
    pub rejected: u64,
}

/// Scheduler that hands jobs to a [`JobQueue`] in the same process.
pub struct ChannelScheduler {
    sender: Mutex<Option<mpsc::Sender<QueuedTask>>>,
    dispatched: AtomicU64,
    rejected: AtomicU64,
}

impl std::fmt::Debug for ChannelScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ChannelScheduler {
    /// Create a scheduler and the queue it feeds.
    pub fn new(capacity: usize) -> (Self, JobQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let scheduler = Self {
            sender: Mutex::new(Some(tx)),
            dispatched: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        };
        (scheduler, JobQueue { receiver: rx })
    }

    /// Dispatch counters.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn reject(&self, err: SchedulerError) -> SchedulerError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        err
    }
}

#[async_trait]
impl Scheduler for ChannelScheduler {
    fn scheduler_type(&self) -> &'static str {
        "channel"
    }

    async fn schedule(&self, job: &Job) -> Result<RunId> {
        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or_else(|| self.reject(SchedulerError::Closed))?;

        let task = QueuedTask::encode(job).map_err(|e| self.reject(e))?;
        let run_id = task.id;

        sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                self.reject(SchedulerError::Rejected("queue is full".to_string()))
            }
            mpsc::error::TrySendError::Closed(_) => self.reject(SchedulerError::Closed),
        })?;

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(run_id = %run_id, result = %job.result, "Job queued");
        Ok(run_id)
    }

    async fn close(&self) -> Result<()> {
        if self.sender.lock().await.take().is_some() {
            info!(stats = ?self.stats(), "Channel scheduler closed");
        }
        Ok(())
    }
}

/// Receiving end of a [`ChannelScheduler`].
#[derive(Debug)]
pub struct JobQueue {
    receiver: mpsc::Receiver<QueuedTask>,
}

impl JobQueue {
    /// Next task, or `None` once the scheduler is closed and drained.
    pub async fn recv(&mut self) -> Option<QueuedTask> {
        self.receiver.recv().await
    }

    /// Next task if one is ready.
    pub fn try_recv(&mut self) -> Option<QueuedTask> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urth_core::manifest::ProbeManifest;
    use urth_core::resource::VersionedResourceId;
    use urth_core::standard_registry;

    fn job(result_id: u64) -> Job {
        Job {
            result: VersionedResourceId::new(result_id, 1),
            result_name: format!("run-{result_id}"),
            scenario_name: "web".into(),
            scenario: VersionedResourceId::new(1, 1),
            labels: Default::default(),
            requirements: Default::default(),
            schedule: None,
            probe: ProbeManifest::default(),
            keep_directory: true,
        }
    }

    #[tokio::test]
    async fn test_schedule_and_receive() {
        let (scheduler, mut queue) = ChannelScheduler::new(4);
        assert_eq!(scheduler.scheduler_type(), "channel");

        let run_id = scheduler.schedule(&job(1)).await.expect("schedules");
        let task = queue.recv().await.expect("task queued");
        assert_eq!(task.id, run_id);

        let decoded = task.decode(&standard_registry()).expect("decodes");
        assert_eq!(decoded, job(1));
        assert_eq!(scheduler.stats().dispatched, 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let (scheduler, _queue) = ChannelScheduler::new(1);
        scheduler.schedule(&job(1)).await.expect("first fits");

        let err = scheduler.schedule(&job(2)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Rejected(_)), "{err:?}");
        assert_eq!(
            scheduler.stats(),
            SchedulerStats {
                dispatched: 1,
                rejected: 1
            }
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (scheduler, mut queue) = ChannelScheduler::new(4);
        scheduler.schedule(&job(1)).await.expect("schedules");

        scheduler.close().await.expect("closes");
        scheduler.close().await.expect("closes again");

        assert!(matches!(
            scheduler.schedule(&job(2)).await,
            Err(SchedulerError::Closed)
        ));

        // Already queued work drains before the queue reports closed.
        assert!(queue.recv().await.is_some());
        assert!(queue.recv().await.is_none());
    }
}
