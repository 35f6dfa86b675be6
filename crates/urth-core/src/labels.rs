// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource labels and the well-known keys managed by the control plane.

use std::collections::BTreeMap;

/// Free-form string labels attached to a resource.
pub type Labels = BTreeMap<String, String>;

/// Prefix reserved for labels managed by urth itself.
pub const LABELS_PREFIX: &str = "urth/";

/// Name of the scenario a result was produced for.
pub const LABEL_SCENARIO_NAME: &str = "urth/scenario.name";
/// Id of the scenario a result was produced for. Always set by the system.
pub const LABEL_SCENARIO_UID: &str = "urth/scenario.uid";
/// Version of the scenario a result was produced for.
pub const LABEL_SCENARIO_VERSION: &str = "urth/scenario.version";
/// Probe kind of the scenario.
pub const LABEL_SCENARIO_KIND: &str = "urth/scenario.kind";

/// Name of the runner that claimed a result.
pub const LABEL_RUNNER_NAME: &str = "urth/runner.name";
/// Id of the runner that claimed a result.
pub const LABEL_RUNNER_UID: &str = "urth/runner.uid";

/// Lifecycle state of a result.
pub const LABEL_RESULT_STATE: &str = "urth/result.state";

/// Probe kind that produced an artifact.
pub const LABEL_ARTIFACT_KIND: &str = "urth/artifact.kind";
/// Mime type of an artifact.
pub const LABEL_ARTIFACT_MIME: &str = "urth/artifact.mime";

/// Merge label sets left to right. Later sets win on key collision.
pub fn merge_labels<'a>(sets: impl IntoIterator<Item = &'a Labels>) -> Labels {
    let mut merged = Labels::new();
    for set in sets {
        merged.extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Build labels from key/value pairs.
pub fn labels<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Labels
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_later_wins() {
        let base = labels([("key", "value"), ("env", "dev")]);
        let caller = labels([("env", "prod"), ("team", "sre")]);
        let system = labels([(LABEL_SCENARIO_UID, "7"), ("env", "system")]);

        let merged = merge_labels([&base, &caller, &system]);

        assert_eq!(merged.len(), 4);
        assert_eq!(merged["key"], "value");
        assert_eq!(merged["team"], "sre");
        assert_eq!(merged["env"], "system");
        assert_eq!(merged[LABEL_SCENARIO_UID], "7");
    }

    #[test]
    fn test_merge_empty() {
        let merged = merge_labels(std::iter::empty());
        assert!(merged.is_empty());
    }
}
