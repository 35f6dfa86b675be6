// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Artifact operations.

use tracing::{info, instrument};

use urth_core::labels::LABEL_ARTIFACT_KIND;
use urth_core::manifest::Manifest;
use urth_core::model::{Artifact, ArtifactSpec};
use urth_core::probes;
use urth_core::resource::{ResourceId, ResourceMeta, VersionedResourceId};
use urth_core::selector::Selector;
use urth_core::store::Pagination;

use super::ControlPlane;
use crate::error::Result;

impl ControlPlane {
    /// Store an artifact from an `artifacts` manifest.
    ///
    /// An empty mime type is filled in from the content type of the probe
    /// kind named by the `urth/artifact.kind` label.
    #[instrument(skip(self, manifest), fields(name = %manifest.metadata.name))]
    pub async fn create_artifact(&self, manifest: Manifest) -> Result<Artifact> {
        let (metadata, mut spec) = self.decode_manifest::<ArtifactSpec>(manifest)?;

        if spec.mime_type.is_empty()
            && let Some(mime) = metadata
                .labels
                .get(LABEL_ARTIFACT_KIND)
                .and_then(|kind| probes::content_type(kind))
        {
            spec.mime_type = mime.to_string();
        }

        let mut artifact = Artifact {
            meta: ResourceMeta::new(metadata.name, metadata.labels),
            spec,
        };
        self.store.create(&mut artifact).await?;

        info!(
            artifact_id = %artifact.meta.id,
            size = artifact.spec.content.len(),
            mime_type = %artifact.spec.mime_type,
            "Artifact stored"
        );
        Ok(artifact)
    }

    /// Artifact by id, with content.
    pub async fn get_artifact(&self, id: ResourceId) -> Result<Artifact> {
        self.require::<Artifact>(id).await
    }

    /// Artifacts matching `selector`, oldest first, without content.
    pub async fn list_artifacts(
        &self,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<Artifact>> {
        Ok(self
            .store
            .find::<Artifact>(selector, pagination)
            .await?
            .into_iter()
            .map(|mut artifact| {
                artifact.spec.content = Vec::new();
                artifact
            })
            .collect())
    }

    /// Remove the artifact revision `id` for good.
    #[instrument(skip(self), fields(artifact_id = %id))]
    pub async fn delete_artifact(&self, id: VersionedResourceId) -> Result<()> {
        self.delete_at::<Artifact>(id).await?;
        info!("Artifact deleted");
        Ok(())
    }
}
