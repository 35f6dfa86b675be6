// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scenario operations.

use tracing::{info, instrument};

use urth_core::kind::Payload;
use urth_core::manifest::{Manifest, ProbeManifest};
use urth_core::model::{Scenario, ScenarioSpec};
use urth_core::resource::{ResourceId, ResourceMeta, VersionedResourceId};
use urth_core::selector::Selector;
use urth_core::store::Pagination;

use super::{ControlPlane, effective_limit};
use crate::error::Result;

impl ControlPlane {
    /// Resolve the nested probe of a stored scenario, tolerating unknown
    /// probe kinds.
    fn resolve_scenario(&self, mut scenario: Scenario) -> Result<Scenario> {
        scenario.spec.resolve_nested(&self.registry)?;
        Ok(scenario)
    }

    /// Create a scenario from a `scenarios` manifest.
    #[instrument(skip(self, manifest), fields(name = %manifest.metadata.name))]
    pub async fn create_scenario(&self, manifest: Manifest) -> Result<Scenario> {
        let (metadata, spec) = self.decode_manifest::<ScenarioSpec>(manifest)?;
        spec.requirements.to_selector()?;

        let mut scenario = Scenario {
            meta: ResourceMeta::new(metadata.name, metadata.labels),
            spec,
        };
        self.store.create(&mut scenario).await?;

        info!(
            scenario_id = %scenario.meta.id,
            probe_kind = %scenario.spec.probe.kind,
            is_active = scenario.spec.is_active,
            "Scenario created"
        );
        Ok(scenario)
    }

    /// Scenario by id.
    pub async fn get_scenario(&self, id: ResourceId) -> Result<Scenario> {
        let scenario = self.require::<Scenario>(id).await?;
        self.resolve_scenario(scenario)
    }

    /// Scenarios matching `selector`, oldest first.
    pub async fn list_scenarios(
        &self,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<Scenario>> {
        self.store
            .find::<Scenario>(selector, pagination)
            .await?
            .into_iter()
            .map(|scenario| self.resolve_scenario(scenario))
            .collect()
    }

    /// Active scenarios matching `selector`.
    ///
    /// Activity is part of the spec rather than the labels, so this pages
    /// through the store and applies offset and limit to active scenarios
    /// only.
    pub async fn list_runnable_scenarios(
        &self,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<Scenario>> {
        let limit = effective_limit(pagination, self.store.max_page_size());
        let mut skip = pagination.offset as usize;
        let mut runnable = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = self
                .store
                .find::<Scenario>(selector, Pagination::new(offset, 0))
                .await?;
            let fetched = page.len();

            for scenario in page.into_iter().filter(|s| s.spec.is_active) {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                runnable.push(self.resolve_scenario(scenario)?);
                if runnable.len() == limit {
                    return Ok(runnable);
                }
            }

            if fetched == 0 {
                return Ok(runnable);
            }
            offset = offset.saturating_add(fetched as u32);
        }
    }

    /// Replace name, labels and spec of the scenario revision `id`.
    #[instrument(skip(self, manifest), fields(scenario_id = %id))]
    pub async fn update_scenario(
        &self,
        id: VersionedResourceId,
        manifest: Manifest,
    ) -> Result<Scenario> {
        let (metadata, spec) = self.decode_manifest::<ScenarioSpec>(manifest)?;
        spec.requirements.to_selector()?;

        let mut scenario = self.require_version::<Scenario>(id).await?;
        scenario.meta.name = metadata.name;
        scenario.meta.labels = metadata.labels;
        scenario.spec = spec;
        self.update_at(&mut scenario, id).await?;

        info!(version = %scenario.meta.version, "Scenario updated");
        Ok(scenario)
    }

    /// Replace only the probe of the scenario revision `id`.
    #[instrument(skip(self, probe), fields(scenario_id = %id, probe_kind = %probe.kind))]
    pub async fn update_scenario_probe(
        &self,
        id: VersionedResourceId,
        mut probe: ProbeManifest,
    ) -> Result<Scenario> {
        probe.resolve(&self.registry)?;

        let mut scenario = self.require_version::<Scenario>(id).await?;
        scenario.spec.probe = probe;
        self.update_at(&mut scenario, id).await?;

        info!(version = %scenario.meta.version, "Scenario probe updated");
        Ok(scenario)
    }

    /// Soft-delete the scenario revision `id`.
    #[instrument(skip(self), fields(scenario_id = %id))]
    pub async fn delete_scenario(&self, id: VersionedResourceId) -> Result<()> {
        self.delete_at::<Scenario>(id).await?;
        info!("Scenario deleted");
        Ok(())
    }
}
