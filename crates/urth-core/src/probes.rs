// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in probe payloads.
//!
//! Only the payload shapes live here. Executing a probe is the runner's job.

use serde::{Deserialize, Serialize};

use crate::kind::{KindRegistry, Payload};

/// Plain TCP dial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpProbeSpec {
    /// Network: `tcp`, `tcp4`, `tcp6`, `udp`...
    #[serde(default)]
    pub net: String,
    /// Target host.
    pub host: String,
    /// Target port.
    pub port: u16,
}

impl Payload for TcpProbeSpec {}

/// Raw HTTP request replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProbeSpec {
    /// Follow 3xx responses.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub follow_redirects: bool,
    /// Script body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl Payload for HttpProbeSpec {}

/// REST call sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestProbeSpec {
    /// Follow 3xx responses.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub follow_redirects: bool,
    /// Script body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl Payload for RestProbeSpec {}

/// HAR file replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarProbeSpec {
    /// Follow 3xx responses.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub follow_redirects: bool,
    /// Script body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl Payload for HarProbeSpec {}

/// Browser automation script (JavaScript).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PuppeteerProbeSpec {
    /// Remote debugging port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Script body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl Payload for PuppeteerProbeSpec {}

/// Browser automation script (Python).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PyPuppeteerProbeSpec {
    /// Script body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl Payload for PyPuppeteerProbeSpec {}

/// `(kind, content type)` of every built-in probe.
const PROBE_CONTENT_TYPES: &[(&str, &str)] = &[
    ("tcp", "text/plain"),
    ("http", "application/http"),
    ("rest", "application/http"),
    ("har", "application/json"),
    ("puppeteer", "text/javascript"),
    ("pypuppeteer", "text/x-python"),
];

/// Register the built-in probe kinds.
pub fn register_probe_kinds(registry: &mut KindRegistry) {
    registry
        .register::<TcpProbeSpec>("tcp")
        .register::<HttpProbeSpec>("http")
        .register::<RestProbeSpec>("rest")
        .register::<HarProbeSpec>("har")
        .register::<PuppeteerProbeSpec>("puppeteer")
        .register::<PyPuppeteerProbeSpec>("pypuppeteer");
}

/// Mime type of the scripts and artifacts of a probe kind.
pub fn content_type(kind: &str) -> Option<&'static str> {
    PROBE_CONTENT_TYPES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_probe_kind_has_content_type() {
        let mut registry = KindRegistry::new();
        register_probe_kinds(&mut registry);

        for kind in registry.kinds() {
            assert!(content_type(kind.as_str()).is_some(), "{kind}");
        }
        assert_eq!(content_type("har"), Some("application/json"));
        assert_eq!(content_type("lighthouse"), None);
    }

    #[test]
    fn test_http_spec_omits_defaults() {
        let spec = HttpProbeSpec {
            follow_redirects: false,
            script: "GET / HTTP/1.1".into(),
        };
        assert_eq!(
            serde_json::to_string(&spec).expect("encodes"),
            r#"{"script":"GET / HTTP/1.1"}"#
        );
    }
}
