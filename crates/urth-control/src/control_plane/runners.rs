// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner operations and runner authentication.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use urth_core::labels::Labels;
use urth_core::manifest::Manifest;
use urth_core::model::{Runner, RunnerSpec};
use urth_core::resource::{ResourceId, ResourceMeta, VersionedResourceId};
use urth_core::selector::Selector;
use urth_core::store::Pagination;
use urth_core::token::ApiToken;

use super::ControlPlane;
use crate::error::{Error, Result};

/// What a runner reports when it authenticates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerRegistration {
    /// Whether the runner is accepting work.
    #[serde(default)]
    pub is_online: bool,
    /// Labels describing the running instance (host, version, ...).
    #[serde(default)]
    pub instance_labels: Labels,
}

/// Runners as returned by listings never carry their token digest.
fn without_secret(mut runner: Runner) -> Runner {
    runner.id_token_hash = None;
    runner
}

impl ControlPlane {
    /// Create a runner from a `runners` manifest.
    ///
    /// Returns the minted id token. This is the only time the raw token is
    /// available; the store keeps just its digest.
    #[instrument(skip(self, manifest), fields(name = %manifest.metadata.name))]
    pub async fn create_runner(&self, manifest: Manifest) -> Result<(Runner, ApiToken)> {
        let (metadata, spec) = self.decode_manifest::<RunnerSpec>(manifest)?;
        spec.requirements.to_selector()?;

        let token = ApiToken::generate();
        let mut runner = Runner {
            meta: ResourceMeta::new(metadata.name, metadata.labels),
            spec,
            id_token_hash: Some(token.digest()),
        };
        self.store.create(&mut runner).await?;

        info!(runner_id = %runner.meta.id, "Runner created");
        Ok((without_secret(runner), token))
    }

    /// Runner by id.
    pub async fn get_runner(&self, id: ResourceId) -> Result<Runner> {
        self.require::<Runner>(id).await.map(without_secret)
    }

    /// Runners matching `selector`, oldest first.
    pub async fn list_runners(
        &self,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<Runner>> {
        Ok(self
            .store
            .find::<Runner>(selector, pagination)
            .await?
            .into_iter()
            .map(without_secret)
            .collect())
    }

    /// Replace name, labels and spec of the runner revision `id`. The id
    /// token is kept.
    #[instrument(skip(self, manifest), fields(runner_id = %id))]
    pub async fn update_runner(
        &self,
        id: VersionedResourceId,
        manifest: Manifest,
    ) -> Result<Runner> {
        let (metadata, spec) = self.decode_manifest::<RunnerSpec>(manifest)?;
        spec.requirements.to_selector()?;

        let mut runner = self.require_version::<Runner>(id).await?;
        runner.meta.name = metadata.name;
        runner.meta.labels = metadata.labels;
        runner.spec = spec;
        self.update_at(&mut runner, id).await?;

        info!(version = %runner.meta.version, "Runner updated");
        Ok(without_secret(runner))
    }

    /// Soft-delete the runner revision `id`. Its token stops working.
    #[instrument(skip(self), fields(runner_id = %id))]
    pub async fn delete_runner(&self, id: VersionedResourceId) -> Result<()> {
        self.delete_at::<Runner>(id).await?;
        info!("Runner deleted");
        Ok(())
    }

    /// Authenticate a runner by its id token and record its registration.
    ///
    /// Unknown tokens are `Unauthorized`; inactive runners are `Forbidden`.
    #[instrument(skip(self, token, registration), fields(is_online = registration.is_online))]
    pub async fn auth_runner(
        &self,
        token: &ApiToken,
        registration: RunnerRegistration,
    ) -> Result<Runner> {
        let Some(mut runner) = self.store.get_by_token::<Runner>(token).await? else {
            warn!("Runner authentication failed: unknown token");
            return Err(Error::Unauthorized("invalid runner token".to_string()));
        };

        if !runner.spec.is_active {
            warn!(runner_id = %runner.meta.id, "Inactive runner attempted to authenticate");
            return Err(Error::Forbidden(format!("runner {} is not active", runner.meta.name)));
        }

        let id = runner.meta.versioned_id();
        runner.spec.is_online = registration.is_online;
        runner.spec.instance_labels = registration.instance_labels;
        self.update_at(&mut runner, id).await?;

        info!(runner_id = %runner.meta.id, "Runner authenticated");
        Ok(without_secret(runner))
    }
}
