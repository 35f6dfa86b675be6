// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The in-memory evaluator and the SQL translation must select the same
//! resources for every selector.

use std::sync::Arc;

use urth_core::labels::{Labels, labels};
use urth_core::resource::{ResourceMeta, ResourceRecord};
use urth_core::store::{MemoryStore, Pagination, ResourceStore, SqliteStore};
use urth_core::Selector;

fn fixtures() -> Vec<(&'static str, Labels)> {
    vec![
        ("web-prod", labels([("env", "prod"), ("tier", "web"), ("replicas", "3")])),
        ("web-dev", labels([("env", "dev"), ("tier", "web"), ("replicas", "1")])),
        ("db-prod", labels([("env", "prod"), ("tier", "db"), ("load", "0.75")])),
        ("batch", labels([("env", "staging"), ("replicas", "many")])),
        ("bare", Labels::new()),
        ("deprecated", labels([("env", "prod"), ("deprecated", ""), ("load", "0.25")])),
    ]
}

const SELECTORS: &[&str] = &[
    "",
    "env",
    "!env",
    "env=prod",
    "env==prod",
    "env!=prod",
    "tier!=web",
    "env in (prod,staging)",
    "env notin (prod)",
    "tier notin (web,db)",
    "replicas>2",
    "replicas<3",
    "replicas>1.5",
    "load<0.5",
    "load>0",
    "replicas>many",
    "env=prod,!deprecated",
    "env in (prod),tier in (web,db),replicas>0",
    "deprecated=",
];

async fn seed(store: &dyn ResourceStore) {
    for (name, labels) in fixtures() {
        store
            .create(ResourceRecord {
                resource_type: "scenarios".into(),
                meta: ResourceMeta::new(name, labels),
                spec: serde_json::json!({}),
                token_hash: None,
            })
            .await
            .expect("Failed to seed");
    }
}

async fn names(store: &dyn ResourceStore, selector: &Selector) -> Vec<String> {
    store
        .find("scenarios", selector, Pagination::default())
        .await
        .expect("find should succeed")
        .into_iter()
        .map(|record| record.meta.name)
        .collect()
}

#[tokio::test]
async fn test_memory_and_sqlite_agree() {
    let memory: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
    let sqlite: Arc<dyn ResourceStore> = Arc::new(
        SqliteStore::connect("sqlite::memory:")
            .await
            .expect("Failed to create SQLite store"),
    );
    seed(memory.as_ref()).await;
    seed(sqlite.as_ref()).await;

    for input in SELECTORS {
        let selector = Selector::parse(input).expect("fixture selectors parse");

        let expected: Vec<String> = fixtures()
            .into_iter()
            .filter(|(_, labels)| selector.matches(labels))
            .map(|(name, _)| name.to_string())
            .collect();

        assert_eq!(names(memory.as_ref(), &selector).await, expected, "memory: {input}");
        assert_eq!(names(sqlite.as_ref(), &selector).await, expected, "sqlite: {input}");
    }
}

#[tokio::test]
async fn test_known_selections() {
    let store = MemoryStore::new();
    seed(&store).await;

    let test_cases: &[(&str, &[&str])] = &[
        ("tier!=web", &["db-prod"]),
        ("tier notin (web)", &["db-prod", "batch", "bare", "deprecated"]),
        ("replicas>2", &["web-prod"]),
        ("replicas>1.5", &[]),
        ("load<0.5", &["deprecated"]),
        ("env=prod,!deprecated", &["web-prod", "db-prod"]),
    ];

    for (input, expected) in test_cases {
        let selector = Selector::parse(input).expect("parses");
        assert_eq!(names(&store, &selector).await, *expected, "{input}");
    }
}
