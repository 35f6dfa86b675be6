// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store.
//!
//! Implements the full versioned contract with the in-memory selector
//! evaluator. Used by tests and by embedded, single-process deployments.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::resource::{ResourceId, ResourceRecord, Version, VersionedResourceId};
use crate::selector::Selector;

use super::{DEFAULT_MAX_PAGE_SIZE, DeleteMode, Pagination, ResourceLabel, ResourceStore};

#[derive(Debug, Default)]
struct MemoryState {
    last_id: u64,
    rows: BTreeMap<ResourceId, ResourceRecord>,
}

impl MemoryState {
    fn live(&self, resource_type: &str, id: ResourceId) -> Option<&ResourceRecord> {
        self.rows
            .get(&id)
            .filter(|row| row.resource_type == resource_type && row.meta.deleted_at.is_none())
    }

    fn name_taken(&self, resource_type: &str, name: &str, except: Option<ResourceId>) -> bool {
        self.rows.values().any(|row| {
            row.resource_type == resource_type
                && row.meta.deleted_at.is_none()
                && row.meta.name == name
                && Some(row.meta.id) != except
        })
    }
}

/// Store backed by a mutex-guarded map.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    max_page_size: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_max_page_size(DEFAULT_MAX_PAGE_SIZE)
    }

    /// Create an empty store with a custom page size cap.
    pub fn with_max_page_size(max_page_size: u32) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_page_size,
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    async fn create(&self, mut record: ResourceRecord) -> Result<ResourceRecord> {
        let mut state = self.state.lock().await;
        if state.name_taken(&record.resource_type, &record.meta.name, None) {
            return Err(StoreError::AlreadyExists {
                resource_type: record.resource_type,
                name: record.meta.name,
            });
        }

        state.last_id += 1;
        let now = Utc::now();
        record.meta.id = ResourceId(state.last_id);
        record.meta.version = Version(1);
        record.meta.created_at = now;
        record.meta.updated_at = now;
        record.meta.deleted_at = None;

        state.rows.insert(record.meta.id, record.clone());
        Ok(record)
    }

    async fn get(&self, resource_type: &str, id: ResourceId) -> Result<Option<ResourceRecord>> {
        let state = self.state.lock().await;
        Ok(state.live(resource_type, id).cloned())
    }

    async fn get_with_version(
        &self,
        resource_type: &str,
        id: VersionedResourceId,
    ) -> Result<Option<ResourceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .live(resource_type, id.id)
            .filter(|row| row.meta.version == id.version)
            .cloned())
    }

    async fn get_by_token(
        &self,
        resource_type: &str,
        token_hash: &str,
    ) -> Result<Option<ResourceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .find(|row| {
                row.resource_type == resource_type
                    && row.meta.deleted_at.is_none()
                    && row.token_hash.as_deref() == Some(token_hash)
            })
            .cloned())
    }

    async fn update(&self, record: &ResourceRecord, id: VersionedResourceId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let current = match state.live(&record.resource_type, id.id) {
            Some(row) if row.meta.version == id.version => row,
            _ => return Ok(false),
        };
        if current.meta.name != record.meta.name
            && state.name_taken(&record.resource_type, &record.meta.name, Some(id.id))
        {
            return Err(StoreError::AlreadyExists {
                resource_type: record.resource_type.clone(),
                name: record.meta.name.clone(),
            });
        }

        if let Some(row) = state.rows.get_mut(&id.id) {
            row.meta.name = record.meta.name.clone();
            row.meta.labels = record.meta.labels.clone();
            row.meta.version = id.version.next();
            row.meta.updated_at = Utc::now();
            row.spec = record.spec.clone();
            row.token_hash = record.token_hash.clone();
        }
        Ok(true)
    }

    async fn delete(
        &self,
        resource_type: &str,
        id: VersionedResourceId,
        mode: DeleteMode,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state
            .live(resource_type, id.id)
            .is_none_or(|row| row.meta.version != id.version)
        {
            return Ok(false);
        }

        match mode {
            DeleteMode::Hard => {
                state.rows.remove(&id.id);
            }
            DeleteMode::Soft => {
                if let Some(row) = state.rows.get_mut(&id.id) {
                    let now = Utc::now();
                    row.meta.deleted_at = Some(now);
                    row.meta.updated_at = now;
                    row.meta.version = id.version.next();
                }
            }
        }
        Ok(true)
    }

    async fn find(
        &self,
        resource_type: &str,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<ResourceRecord>> {
        let page = pagination.clamp(self.max_page_size);
        let state = self.state.lock().await;

        let mut rows: Vec<&ResourceRecord> = state
            .rows
            .values()
            .filter(|row| {
                row.resource_type == resource_type
                    && row.meta.deleted_at.is_none()
                    && selector.matches(&row.meta.labels)
            })
            .collect();
        rows.sort_by_key(|row| (row.meta.created_at, row.meta.id));

        Ok(rows
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn list_labels(&self, pagination: Pagination) -> Result<Vec<ResourceLabel>> {
        let page = pagination.clamp(self.max_page_size);
        let state = self.state.lock().await;

        let labels: BTreeSet<ResourceLabel> = state
            .rows
            .values()
            .filter(|row| row.meta.deleted_at.is_none())
            .flat_map(|row| row.meta.labels.iter())
            .map(|(key, value)| ResourceLabel {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        Ok(labels
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{Labels, labels};
    use crate::resource::ResourceMeta;
    use serde_json::json;

    fn record(name: &str, labels: Labels) -> ResourceRecord {
        ResourceRecord {
            resource_type: "scenarios".into(),
            meta: ResourceMeta::new(name, labels),
            spec: json!({"isActive": true}),
            token_hash: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = MemoryStore::new();
        let a = store.create(record("a", Labels::new())).await.expect("create");
        let b = store.create(record("b", Labels::new())).await.expect("create");

        assert_eq!(a.meta.versioned_id(), VersionedResourceId::new(1, 1));
        assert_eq!(b.meta.id, ResourceId(2));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = MemoryStore::new();
        store.create(record("a", Labels::new())).await.expect("create");
        let err = store.create(record("a", Labels::new())).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_stale_update_is_not_applied() {
        let store = MemoryStore::new();
        let created = store.create(record("a", Labels::new())).await.expect("create");
        let v1 = created.meta.versioned_id();

        let mut changed = created.clone();
        changed.spec = json!({"isActive": false});
        assert!(store.update(&changed, v1).await.expect("update"));

        let mut stale = created.clone();
        stale.spec = json!({"description": "lost"});
        assert!(!store.update(&stale, v1).await.expect("update"));

        let stored = store.get("scenarios", v1.id).await.expect("get").expect("found");
        assert_eq!(stored.meta.version, Version(2));
        assert_eq!(stored.spec, json!({"isActive": false}));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_row() {
        let store = MemoryStore::new();
        let created = store.create(record("a", Labels::new())).await.expect("create");
        let id = created.meta.versioned_id();

        assert!(!store
            .delete("scenarios", VersionedResourceId::new(1, 7), DeleteMode::Soft)
            .await
            .expect("delete"));
        assert!(store.delete("scenarios", id, DeleteMode::Soft).await.expect("delete"));
        assert!(store.get("scenarios", id.id).await.expect("get").is_none());

        // The name is free again once the holder is deleted.
        store.create(record("a", Labels::new())).await.expect("create");
    }

    #[tokio::test]
    async fn test_find_filters_and_paginates() {
        let store = MemoryStore::with_max_page_size(2);
        for (name, env) in [("a", "prod"), ("b", "dev"), ("c", "prod"), ("d", "prod")] {
            store.create(record(name, labels([("env", env)]))).await.expect("create");
        }

        let prod = Selector::parse("env=prod").expect("parses");
        let page = store
            .find("scenarios", &prod, Pagination::new(0, 0))
            .await
            .expect("find");
        let names: Vec<_> = page.iter().map(|r| r.meta.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);

        let next = store
            .find("scenarios", &prod, Pagination::new(2, 10))
            .await
            .expect("find");
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].meta.name, "d");

        let other = store
            .find("runners", &Selector::everything(), Pagination::default())
            .await
            .expect("find");
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_list_labels_is_distinct() {
        let store = MemoryStore::new();
        store.create(record("a", labels([("env", "prod")]))).await.expect("create");
        store
            .create(record("b", labels([("env", "prod"), ("tier", "web")])))
            .await
            .expect("create");

        let labels = store.list_labels(Pagination::default()).await.expect("labels");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].key, "env");
        assert_eq!(labels[1].key, "tier");
    }
}
