// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scenarios, runners, results and artifacts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::{self, KindRegistry, Payload};
use crate::labels::Labels;
use crate::manifest::{Manifest, ObjectMeta, ProbeManifest};
use crate::probes;
use crate::resource::{Resource, ResourceMeta, TokenBearing, VersionedResourceId};
use crate::selector::LabelSelector;

/// Kind of [`ScenarioSpec`] manifests.
pub const KIND_SCENARIO: &str = "scenarios";
/// Kind of [`RunnerSpec`] manifests.
pub const KIND_RUNNER: &str = "runners";
/// Kind of [`ResultSpec`] manifests.
pub const KIND_RESULT: &str = "results";
/// Kind of [`ArtifactSpec`] manifests.
pub const KIND_ARTIFACT: &str = "artifacts";

/// Register the four resource kinds.
pub fn register_resource_kinds(registry: &mut KindRegistry) {
    registry
        .register::<ScenarioSpec>(KIND_SCENARIO)
        .register::<RunnerSpec>(KIND_RUNNER)
        .register::<ResultSpec>(KIND_RESULT)
        .register::<ArtifactSpec>(KIND_ARTIFACT);
}

/// A registry with the resource kinds and the built-in probe kinds.
pub fn standard_registry() -> KindRegistry {
    let mut registry = KindRegistry::new();
    register_resource_kinds(&mut registry);
    probes::register_probe_kinds(&mut registry);
    registry
}

/// Render a resource as a manifest. The kind comes from the registry.
pub fn to_manifest<T>(registry: &KindRegistry, resource: &T) -> kind::Result<Manifest>
where
    T: Resource,
    T::Spec: Payload,
{
    Manifest::from_payload(
        registry,
        ObjectMeta::from(resource.meta()),
        resource.spec().clone(),
    )
}

macro_rules! impl_resource {
    ($ty:ty, $spec:ty, $resource_type:literal) => {
        impl_resource!($ty, $spec, $resource_type, soft_delete = true);
    };
    ($ty:ty, $spec:ty, $resource_type:literal, soft_delete = $soft:literal) => {
        impl Resource for $ty {
            const RESOURCE_TYPE: &'static str = $resource_type;
            const SOFT_DELETE: bool = $soft;
            type Spec = $spec;

            fn meta(&self) -> &ResourceMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut ResourceMeta {
                &mut self.meta
            }

            fn spec(&self) -> &Self::Spec {
                &self.spec
            }

            fn from_parts(
                meta: ResourceMeta,
                spec: Self::Spec,
                _token_hash: Option<String>,
            ) -> Self {
                Self { meta, spec }
            }
        }
    };
}

// ============================================================================
// Scenarios
// ============================================================================

/// Definition of a check to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Labels a runner must carry to take this scenario.
    #[serde(default, skip_serializing_if = "LabelSelector::is_empty")]
    pub requirements: LabelSelector,
    /// Cron-like run schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Inactive scenarios are never dispatched.
    #[serde(default)]
    pub is_active: bool,
    /// The probe to execute.
    #[serde(default)]
    pub probe: ProbeManifest,
}

impl Payload for ScenarioSpec {
    fn resolve_nested(&mut self, registry: &KindRegistry) -> kind::Result<()> {
        self.probe.resolve(registry)
    }
}

/// A stored scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Metadata.
    pub meta: ResourceMeta,
    /// Definition.
    pub spec: ScenarioSpec,
}

impl_resource!(Scenario, ScenarioSpec, "scenarios");

// ============================================================================
// Runners
// ============================================================================

/// A worker that claims and executes scenario probes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSpec {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Labels a scenario must carry for this runner to take it.
    #[serde(default, skip_serializing_if = "LabelSelector::is_empty")]
    pub requirements: LabelSelector,
    /// Inactive runners may not authenticate.
    #[serde(default)]
    pub is_active: bool,
    /// Reported by the runner on auth.
    #[serde(default)]
    pub is_online: bool,
    /// Labels reported by the running instance.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub instance_labels: Labels,
}

impl Payload for RunnerSpec {}

/// A stored runner. The id token is kept only as a digest.
#[derive(Debug, Clone, PartialEq)]
pub struct Runner {
    /// Metadata.
    pub meta: ResourceMeta,
    /// Definition and last registration.
    pub spec: RunnerSpec,
    /// Digest of the runner's id token.
    pub id_token_hash: Option<String>,
}

impl Resource for Runner {
    const RESOURCE_TYPE: &'static str = "runners";
    type Spec = RunnerSpec;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }

    fn token_hash(&self) -> Option<&str> {
        self.id_token_hash.as_deref()
    }

    fn from_parts(meta: ResourceMeta, spec: Self::Spec, token_hash: Option<String>) -> Self {
        Self {
            meta,
            spec,
            id_token_hash: token_hash,
        }
    }
}

impl TokenBearing for Runner {}

// ============================================================================
// Results
// ============================================================================

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for a runner.
    #[default]
    Pending,
    /// Claimed by a runner.
    Running,
    /// Timed out before completion.
    Expired,
    /// Finished and reported.
    Completed,
    /// Failed to dispatch or finished with an error.
    Errored,
}

impl JobStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Expired => "expired",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }

    /// True for completed, errored and expired.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Expired)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe outcome as reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The check passed.
    Success,
    /// The check ran and failed.
    Failed,
    /// The probe itself errored.
    Errored,
    /// The run was canceled.
    Canceled,
    /// The probe exceeded its timeout.
    Timeout,
}

/// One execution of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSpec {
    /// Scenario revision this run executes.
    pub scenario_id: VersionedResourceId,
    /// Runner that claimed the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<VersionedResourceId>,
    /// Lifecycle state.
    #[serde(default)]
    pub status: JobStatus,
    /// When the run was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ended: Option<DateTime<Utc>>,
    /// Reported outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

impl Payload for ResultSpec {}

/// A stored run. The update token is kept only as a digest.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Metadata.
    pub meta: ResourceMeta,
    /// State.
    pub spec: ResultSpec,
    /// Digest of the claim token; set exactly once, on claim.
    pub update_token_hash: Option<String>,
}

impl Resource for RunResult {
    const RESOURCE_TYPE: &'static str = "results";
    type Spec = ResultSpec;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }

    fn token_hash(&self) -> Option<&str> {
        self.update_token_hash.as_deref()
    }

    fn from_parts(meta: ResourceMeta, spec: Self::Spec, token_hash: Option<String>) -> Self {
        Self {
            meta,
            spec,
            update_token_hash: token_hash,
        }
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Evidence produced by a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSpec {
    /// Garbage-collection deadline. `None` pins the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
    /// Relation, e.g. `log` or `har`.
    #[serde(default)]
    pub rel: String,
    /// Mime type of `content`.
    #[serde(default)]
    pub mime_type: String,
    /// Blob content, base64 on the wire.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<u8>,
}

impl Payload for ArtifactSpec {}

impl ArtifactSpec {
    /// True once `expire_time` has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_time.is_some_and(|t| t <= now)
    }
}

/// A stored artifact. Deleting one removes the row.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Metadata.
    pub meta: ResourceMeta,
    /// Content and expiry.
    pub spec: ArtifactSpec,
}

// Artifacts are hard-deleted.
impl_resource!(Artifact, ArtifactSpec, "artifacts", soft_delete = false);

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::Spec;
    use crate::labels::labels;
    use crate::probes::{
        HarProbeSpec, HttpProbeSpec, PuppeteerProbeSpec, PyPuppeteerProbeSpec, RestProbeSpec,
        TcpProbeSpec,
    };
    use std::collections::BTreeSet;
    use crate::resource::ResourceRecord;
    use crate::selector::{Operator, SelectorRequirement};
    use std::time::Duration;

    fn scenario_spec(registry: &KindRegistry) -> ScenarioSpec {
        let mut probe = ProbeManifest::from_payload(
            registry,
            HttpProbeSpec {
                follow_redirects: true,
                script: "GET https://example.com HTTP/1.1\n".into(),
            },
        )
        .expect("registered");
        probe.timeout = Some(Duration::from_secs(30));

        ScenarioSpec {
            description: "homepage".into(),
            requirements: LabelSelector {
                match_labels: labels([("region", "eu")]),
                match_selector: vec![SelectorRequirement {
                    key: "os".into(),
                    operator: Operator::In,
                    values: vec!["linux".into()],
                }],
            },
            schedule: Some("*/5 * * * *".into()),
            is_active: true,
            probe,
        }
    }

    #[test]
    fn test_every_registered_kind_round_trips() {
        let registry = standard_registry();
        let now = Utc::now();
        let meta = ObjectMeta {
            name: "sample".into(),
            labels: labels([("team", "sre")]),
            ..Default::default()
        };

        let manifests = vec![
            Manifest::from_payload(&registry, meta.clone(), scenario_spec(&registry)),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                RunnerSpec {
                    description: "edge".into(),
                    is_active: true,
                    instance_labels: labels([("os", "linux")]),
                    ..Default::default()
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                ResultSpec {
                    scenario_id: VersionedResourceId::new(1, 2),
                    status: JobStatus::Completed,
                    time_started: Some(now),
                    time_ended: Some(now),
                    outcome: Some(RunOutcome::Success),
                    ..Default::default()
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                ArtifactSpec {
                    expire_time: Some(now),
                    rel: "log".into(),
                    mime_type: "text/plain".into(),
                    content: b"hello".to_vec(),
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                TcpProbeSpec {
                    net: "tcp".into(),
                    host: "example.com".into(),
                    port: 443,
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                HttpProbeSpec {
                    follow_redirects: false,
                    script: "GET https://example.com/health HTTP/1.1\n".into(),
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                RestProbeSpec {
                    follow_redirects: true,
                    script: "POST https://api.example.com/v1/ping\n{\"ok\": true}\n".into(),
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                HarProbeSpec {
                    follow_redirects: true,
                    script: r#"{"log":{"version":"1.2","entries":[]}}"#.into(),
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                PuppeteerProbeSpec {
                    port: Some(9222),
                    script: "await page.goto('https://example.com');\n".into(),
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                PuppeteerProbeSpec {
                    port: None,
                    script: "await page.title();\n".into(),
                },
            ),
            Manifest::from_payload(
                &registry,
                meta.clone(),
                PyPuppeteerProbeSpec {
                    script: "await page.goto('https://example.com')\n".into(),
                },
            ),
        ];

        let mut covered = BTreeSet::new();
        for manifest in manifests {
            let manifest = manifest.expect("registered");
            assert!(matches!(manifest.spec, Some(Spec::Typed(_))), "{} is typed", manifest.kind);
            covered.insert(manifest.kind.clone());
            let json = manifest.to_json().expect("encodes json");
            assert_eq!(
                Manifest::from_json(&json, &registry).expect("decodes json"),
                manifest,
                "json round trip of {}",
                manifest.kind
            );
            let yaml = manifest.to_yaml().expect("encodes yaml");
            assert_eq!(
                Manifest::from_yaml(&yaml, &registry).expect("decodes yaml"),
                manifest,
                "yaml round trip of {}",
                manifest.kind
            );
        }

        let registered: BTreeSet<_> = registry.kinds().into_iter().cloned().collect();
        assert_eq!(covered, registered);
    }

    #[test]
    fn test_scenario_probe_resolves_nested() {
        let registry = standard_registry();
        let json = r#"{
            "kind": "scenarios",
            "metadata": {"name": "ping"},
            "spec": {
                "isActive": true,
                "probe": {
                    "kind": "tcp",
                    "timeout": 1000,
                    "spec": {"net": "tcp", "host": "db", "port": 5432}
                }
            }
        }"#;

        let manifest = Manifest::from_json(json, &registry).expect("decodes");
        let (_, spec) = manifest.into_payload::<ScenarioSpec>(&registry).expect("typed");
        let probe = spec
            .probe
            .spec
            .as_ref()
            .and_then(Spec::downcast_ref::<TcpProbeSpec>)
            .expect("tcp probe");
        assert_eq!(probe.port, 5432);
        assert_eq!(spec.probe.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_scenario_with_unknown_probe_kind() {
        let registry = standard_registry();
        let json =
            r#"{"kind":"scenarios","spec":{"probe":{"kind":"lighthouse","spec":{"url":"x"}}}}"#;
        let manifest = Manifest::from_json(json, &registry).expect("lenient");
        let (_, spec) = manifest.into_payload::<ScenarioSpec>(&registry).expect("typed");
        assert!(matches!(spec.probe.spec, Some(Spec::Untyped(_))));
    }

    #[test]
    fn test_runner_token_survives_record_round_trip() {
        let runner = Runner {
            meta: ResourceMeta::new("edge-1", Labels::new()),
            spec: RunnerSpec::default(),
            id_token_hash: Some("abc".into()),
        };
        let record = ResourceRecord::from_resource(&runner).expect("erases");
        assert_eq!(record.resource_type, "runners");
        assert_eq!(record.token_hash.as_deref(), Some("abc"));
        // The digest lives outside the spec.
        assert!(record.spec.get("idTokenHash").is_none());

        let restored: Runner = record.into_resource().expect("restores");
        assert_eq!(restored, runner);
    }

    #[test]
    fn test_record_type_mismatch() {
        let scenario = Scenario {
            meta: ResourceMeta::new("s", Labels::new()),
            spec: ScenarioSpec::default(),
        };
        let record = ResourceRecord::from_resource(&scenario).expect("erases");
        assert!(record.into_resource::<Artifact>().is_err());
    }

    #[test]
    fn test_artifact_content_is_base64() {
        let spec = ArtifactSpec {
            rel: "log".into(),
            mime_type: "text/plain".into(),
            content: b"hi".to_vec(),
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).expect("encodes");
        assert_eq!(json["content"], "aGk=");
        assert!(!spec.is_expired(Utc::now()));
    }

    #[test]
    fn test_job_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).expect("encodes"),
            r#""completed""#
        );
        assert!(JobStatus::Expired.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
