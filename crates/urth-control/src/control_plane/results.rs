// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle: submit, claim and complete.
//!
//! ```text
//! submit            claim                 complete
//!   ──► pending ──────────► running ──────────► completed | errored
//!          │  (mints token)        (checks token)
//!          └──► errored   (dispatch failed)
//! ```
//!
//! The claim token works like a lease: whoever holds it may report the
//! outcome, and it is minted under the same write that moves the run to
//! `running`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use urth_core::labels::{LABEL_RUNNER_UID, LABEL_SCENARIO_UID, Labels, merge_labels};
use urth_core::model::{JobStatus, RunOutcome, RunResult, Runner, ResultSpec, Scenario};
use urth_core::resource::{Resource, ResourceId, ResourceMeta, VersionedResourceId};
use urth_core::selector::{Operator, Requirement, Selector};
use urth_core::store::Pagination;
use urth_core::token::ApiToken;

use super::ControlPlane;
use crate::error::{Error, Result};
use crate::scheduler::{Job, RunId};

/// Prefix marking a caller-supplied name as a placeholder.
const MANUAL_RUN_PREFIX: &str = "manual-";

/// Request to run a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Run name. Empty or `manual-...` gets a generated name.
    #[serde(default)]
    pub name: String,
    /// Extra labels for the run.
    #[serde(default)]
    pub labels: Labels,
    /// Request time; defaults to now.
    #[serde(default)]
    pub time_started: Option<DateTime<Utc>>,
    /// Ask the runner to keep its working directory.
    #[serde(default)]
    pub keep_directory: bool,
}

/// Outcome of a submit.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    /// The stored run.
    pub result: RunResult,
    /// Dispatch id, if a scheduler is attached.
    pub run_id: Option<RunId>,
}

/// Outcome of a successful claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    /// Token required to complete the run.
    pub token: ApiToken,
    /// Revision of the run after the claim.
    pub result: VersionedResourceId,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// What happened.
    pub outcome: RunOutcome,
    /// When the run ended; defaults to now.
    #[serde(default)]
    pub time_ended: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Terminal status for this report.
    pub fn status(&self) -> JobStatus {
        match self.outcome {
            RunOutcome::Errored => JobStatus::Errored,
            _ => JobStatus::Completed,
        }
    }
}

fn run_name(requested: String, scenario: &Scenario) -> String {
    if requested.is_empty() || requested.starts_with(MANUAL_RUN_PREFIX) {
        format!(
            "{}-v{}-{}",
            scenario.meta.name,
            scenario.meta.version,
            Uuid::new_v4().simple()
        )
    } else {
        requested
    }
}

fn scenario_link(id: ResourceId) -> Labels {
    Labels::from([(LABEL_SCENARIO_UID.to_string(), id.to_string())])
}

impl ControlPlane {
    /// Request a new run of scenario `scenario_id`.
    ///
    /// The run is stored as `pending` and then dispatched. If dispatch fails
    /// the run is marked `errored` on a best-effort basis and the dispatch
    /// error is returned.
    #[instrument(skip(self, request), fields(scenario_id = %scenario_id))]
    pub async fn submit(
        &self,
        scenario_id: ResourceId,
        request: SubmitRequest,
    ) -> Result<Submitted> {
        let scenario = self.get_scenario(scenario_id).await?;
        if !scenario.spec.is_active {
            return Err(Error::Forbidden(format!(
                "scenario {} is not active",
                scenario.meta.name
            )));
        }

        let name = run_name(request.name, &scenario);
        let labels = merge_labels([
            &scenario.meta.labels,
            &request.labels,
            &scenario_link(scenario_id),
        ]);

        let mut result = RunResult {
            meta: ResourceMeta::new(name, labels),
            spec: ResultSpec {
                scenario_id: scenario.meta.versioned_id(),
                status: JobStatus::Pending,
                time_started: Some(request.time_started.unwrap_or_else(Utc::now)),
                ..Default::default()
            },
            update_token_hash: None,
        };
        self.store.create(&mut result).await?;
        info!(result_id = %result.meta.id, name = %result.meta.name, "Run submitted");

        let Some(scheduler) = &self.scheduler else {
            return Ok(Submitted { result, run_id: None });
        };

        let job = Job {
            result: result.meta.versioned_id(),
            result_name: result.meta.name.clone(),
            scenario_name: scenario.meta.name.clone(),
            scenario: scenario.meta.versioned_id(),
            labels: result.meta.labels.clone(),
            requirements: scenario.spec.requirements.clone(),
            schedule: scenario.spec.schedule.clone(),
            probe: scenario.spec.probe.clone(),
            keep_directory: request.keep_directory,
        };

        match scheduler.schedule(&job).await {
            Ok(run_id) => {
                info!(result_id = %result.meta.id, run_id = %run_id, "Run dispatched");
                Ok(Submitted {
                    result,
                    run_id: Some(run_id),
                })
            }
            Err(dispatch_err) => {
                warn!(result_id = %result.meta.id, error = %dispatch_err, "Dispatch failed");
                let id = result.meta.versioned_id();
                result.spec.status = JobStatus::Errored;
                match self.store.update(&mut result, id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(result_id = %id, "Could not mark run errored: version moved")
                    }
                    Err(e) => warn!(result_id = %id, error = %e, "Could not mark run errored"),
                }
                Err(Error::DispatchFailure(dispatch_err))
            }
        }
    }

    /// Run by id.
    pub async fn get_result(&self, id: ResourceId) -> Result<RunResult> {
        self.require::<RunResult>(id).await
    }

    /// Runs of scenario `scenario_id` matching `selector`, oldest first.
    pub async fn list_results(
        &self,
        scenario_id: ResourceId,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<RunResult>> {
        let selector = selector.clone().with(Requirement::new(
            LABEL_SCENARIO_UID,
            Operator::Equals,
            [scenario_id.to_string()],
        )?);
        Ok(self.store.find::<RunResult>(&selector, pagination).await?)
    }

    /// Claim the pending run at revision `id` for `runner`.
    ///
    /// Only `pending` runs can be claimed. At most one claim succeeds: a
    /// run with a token is never re-claimed, and concurrent claims race on
    /// the version. Losers see `Unauthorized`
    /// or `VersionConflict`.
    #[instrument(skip(self, runner), fields(result_id = %id, runner_id = %runner.meta.id))]
    pub async fn claim(&self, id: VersionedResourceId, runner: &Runner) -> Result<Claim> {
        let Some(mut result) = self.store.get_with_version::<RunResult>(id).await? else {
            warn!("Claim rejected: no run at this version");
            return Err(Error::Unauthorized(format!("no run at {id}")));
        };
        if result.update_token_hash.is_some() {
            warn!("Claim rejected: run already claimed");
            return Err(Error::Unauthorized(format!("run {} is already claimed", id.id)));
        }
        if result.spec.status != JobStatus::Pending {
            warn!(status = %result.spec.status, "Claim rejected: run is not pending");
            return Err(Error::Unauthorized(format!(
                "run {} is {}",
                id.id, result.spec.status
            )));
        }

        let token = ApiToken::generate();
        let system = Labels::from([
            (LABEL_SCENARIO_UID.to_string(), result.spec.scenario_id.id.to_string()),
            (LABEL_RUNNER_UID.to_string(), runner.meta.id.to_string()),
        ]);
        result.meta.labels = merge_labels([&result.meta.labels, &runner.meta.labels, &system]);
        result.spec.status = JobStatus::Running;
        result.spec.runner_id = Some(runner.meta.versioned_id());
        result.update_token_hash = Some(token.digest());

        if !self.store.update(&mut result, id).await? {
            warn!("Claim lost the version race");
            return Err(Error::VersionConflict {
                resource_type: RunResult::RESOURCE_TYPE,
                id,
            });
        }

        info!(version = %result.meta.version, "Run claimed");
        Ok(Claim {
            token,
            result: result.meta.versioned_id(),
        })
    }

    /// Report the outcome of the run at revision `id`.
    ///
    /// `token` must be the one returned by the claim. A stale `id` is a
    /// version conflict; a run that already left `running` rejects the
    /// token as spent.
    #[instrument(skip(self, token, report), fields(result_id = %id, outcome = ?report.outcome))]
    pub async fn complete(
        &self,
        id: VersionedResourceId,
        token: &ApiToken,
        report: RunReport,
    ) -> Result<RunResult> {
        let mut result = self.require::<RunResult>(id.id).await?;

        let authorized = result
            .update_token_hash
            .as_deref()
            .is_some_and(|digest| token.matches_digest(digest));
        if !authorized {
            warn!("Completion rejected: token mismatch");
            return Err(Error::Unauthorized(format!("invalid token for run {}", id.id)));
        }

        if result.meta.version != id.version {
            return Err(Error::VersionConflict {
                resource_type: RunResult::RESOURCE_TYPE,
                id,
            });
        }

        // The token is spent once the run leaves `running`.
        if result.spec.status != JobStatus::Running {
            warn!(status = %result.spec.status, "Completion rejected: run is not running");
            return Err(Error::Unauthorized(format!(
                "run {} is {}",
                id.id, result.spec.status
            )));
        }

        let status = report.status();
        if result.spec.time_ended.is_none() {
            result.spec.time_ended = Some(report.time_ended.unwrap_or_else(Utc::now));
        }
        result.spec.status = status;
        result.spec.outcome = Some(report.outcome);

        if !self.store.update(&mut result, id).await? {
            return Err(Error::VersionConflict {
                resource_type: RunResult::RESOURCE_TYPE,
                id,
            });
        }

        info!(status = %status, version = %result.meta.version, "Run completed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urth_core::model::ScenarioSpec;

    fn scenario(name: &str, version: u64) -> Scenario {
        let mut meta = ResourceMeta::new(name, Labels::new());
        meta.version = urth_core::Version(version);
        Scenario {
            meta,
            spec: ScenarioSpec::default(),
        }
    }

    #[test]
    fn test_run_name_generation() {
        let s = scenario("web", 3);

        let test_cases = ["", "manual-", "manual-run-1"];
        for requested in test_cases {
            let name = run_name(requested.to_string(), &s);
            assert!(name.starts_with("web-v3-"), "{name}");
            assert_eq!(name.len(), "web-v3-".len() + 32, "{name}");
        }

        assert_eq!(run_name("nightly".into(), &s), "nightly");
    }

    #[test]
    fn test_report_status() {
        let report = |outcome| RunReport {
            outcome,
            time_ended: None,
        };
        assert_eq!(report(RunOutcome::Success).status(), JobStatus::Completed);
        assert_eq!(report(RunOutcome::Failed).status(), JobStatus::Completed);
        assert_eq!(report(RunOutcome::Errored).status(), JobStatus::Errored);
    }
}
