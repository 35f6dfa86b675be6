// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed store.
//!
//! All resource types share the `resources` table. Labels live in
//! `resource_labels` so selectors translate to indexed subqueries.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::labels::Labels;
use crate::migrations;
use crate::resource::{ResourceId, ResourceMeta, ResourceRecord, Version, VersionedResourceId};
use crate::selector::{Number, Selector, sql::push_selector};

use super::{DEFAULT_MAX_PAGE_SIZE, DeleteMode, Pagination, ResourceLabel, ResourceStore};

const SELECT_RESOURCES: &str = "SELECT r.id, r.resource_type, r.name, r.version, r.spec, \
     r.token_hash, r.created_at, r.updated_at, r.deleted_at FROM resources r";

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: i64,
    resource_type: String,
    name: String,
    version: i64,
    spec: String,
    token_hash: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl ResourceRow {
    fn into_record(self, labels: Labels) -> Result<ResourceRecord> {
        let id = ResourceId(self.id as u64);
        let spec = serde_json::from_str(&self.spec).map_err(|e| StoreError::Corrupt {
            id,
            details: format!("spec is not valid JSON: {e}"),
        })?;
        Ok(ResourceRecord {
            resource_type: self.resource_type,
            meta: ResourceMeta {
                id,
                version: Version(self.version as u64),
                name: self.name,
                labels,
                created_at: self.created_at,
                updated_at: self.updated_at,
                deleted_at: self.deleted_at,
            },
            spec,
            token_hash: self.token_hash,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LabelRow {
    owner_id: i64,
    key: String,
    value: String,
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_page_size: u32,
}

impl SqliteStore {
    /// Create a store over an existing, already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// Override the server-side page size cap.
    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Connect to `url` and run migrations.
    ///
    /// Missing parent directories of a file database are created.
    /// In-memory databases get a single connection, since every connection
    /// would otherwise see its own empty database.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        if !in_memory {
            create_parent_dir(url)?;
        }
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        migrations::run_sqlite(&pool).await?;
        debug!(url = %url, "SQLite store ready");
        Ok(Self::new(pool))
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&format!("sqlite:{}?mode=rwc", path.as_ref().to_string_lossy())).await
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn live(resource_type: &str) -> QueryBuilder<'static, Sqlite> {
        let mut builder = QueryBuilder::new(SELECT_RESOURCES);
        builder.push(" WHERE r.resource_type = ");
        builder.push_bind(resource_type.to_string());
        builder.push(" AND r.deleted_at IS NULL");
        builder
    }

    async fn fetch(&self, mut builder: QueryBuilder<'_, Sqlite>) -> Result<Vec<ResourceRecord>> {
        // Rows and labels come from one snapshot so a concurrent update
        // cannot pair a revision with another revision's labels.
        let mut tx = self.pool.begin().await?;
        let rows: Vec<ResourceRow> = builder.build_query_as().fetch_all(&mut *tx).await?;
        if rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let mut labels = labels_of(&mut tx, rows.iter().map(|row| row.id)).await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|row| {
                let owned = labels.remove(&row.id).unwrap_or_default();
                row.into_record(owned)
            })
            .collect()
    }

    async fn fetch_optional(
        &self,
        builder: QueryBuilder<'_, Sqlite>,
    ) -> Result<Option<ResourceRecord>> {
        Ok(self.fetch(builder).await?.into_iter().next())
    }
}

async fn labels_of(
    conn: &mut SqliteConnection,
    ids: impl Iterator<Item = i64>,
) -> Result<HashMap<i64, Labels>> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT owner_id, key, value FROM resource_labels WHERE owner_id IN (",
    );
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows: Vec<LabelRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
    let mut labels: HashMap<i64, Labels> = HashMap::new();
    for row in rows {
        labels.entry(row.owner_id).or_default().insert(row.key, row.value);
    }
    Ok(labels)
}

/// Create the directory holding the database file of a `sqlite:` URL.
fn create_parent_dir(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = Path::new(path.split('?').next().unwrap_or_default());
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
    }
    Ok(())
}

async fn insert_labels(conn: &mut SqliteConnection, owner_id: i64, labels: &Labels) -> Result<()> {
    for (key, value) in labels {
        let (int_value, float_value) = match Number::parse(value) {
            Some(Number::Int(n)) => (Some(n), None),
            Some(Number::Float(n)) => (None, Some(n)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO resource_labels (owner_id, key, value, int_value, float_value)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(key)
        .bind(value)
        .bind(int_value)
        .bind(float_value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn delete_labels(conn: &mut SqliteConnection, owner_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM resource_labels WHERE owner_id = ?")
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Translate a unique-index violation into [`StoreError::AlreadyExists`].
fn name_conflict(err: sqlx::Error, record: &ResourceRecord) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists {
            resource_type: record.resource_type.clone(),
            name: record.meta.name.clone(),
        },
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl ResourceStore for SqliteStore {
    fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    async fn create(&self, mut record: ResourceRecord) -> Result<ResourceRecord> {
        let now = Utc::now();
        let spec = serde_json::to_string(&record.spec)?;

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO resources
                (resource_type, name, version, spec, token_hash, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.resource_type)
        .bind(&record.meta.name)
        .bind(&spec)
        .bind(&record.token_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| name_conflict(e, &record))?
        .last_insert_rowid();

        insert_labels(&mut tx, id, &record.meta.labels).await?;
        tx.commit().await?;

        record.meta.id = ResourceId(id as u64);
        record.meta.version = Version(1);
        record.meta.created_at = now;
        record.meta.updated_at = now;
        record.meta.deleted_at = None;
        debug!(
            resource_type = %record.resource_type,
            id = %record.meta.id,
            name = %record.meta.name,
            "Resource created"
        );
        Ok(record)
    }

    async fn get(&self, resource_type: &str, id: ResourceId) -> Result<Option<ResourceRecord>> {
        let mut builder = Self::live(resource_type);
        builder.push(" AND r.id = ");
        builder.push_bind(id.0 as i64);
        self.fetch_optional(builder).await
    }

    async fn get_with_version(
        &self,
        resource_type: &str,
        id: VersionedResourceId,
    ) -> Result<Option<ResourceRecord>> {
        let mut builder = Self::live(resource_type);
        builder.push(" AND r.id = ");
        builder.push_bind(id.id.0 as i64);
        builder.push(" AND r.version = ");
        builder.push_bind(id.version.0 as i64);
        self.fetch_optional(builder).await
    }

    async fn get_by_token(
        &self,
        resource_type: &str,
        token_hash: &str,
    ) -> Result<Option<ResourceRecord>> {
        let mut builder = Self::live(resource_type);
        builder.push(" AND r.token_hash = ");
        builder.push_bind(token_hash.to_string());
        builder.push(" LIMIT 1");
        self.fetch_optional(builder).await
    }

    async fn update(&self, record: &ResourceRecord, id: VersionedResourceId) -> Result<bool> {
        let spec = serde_json::to_string(&record.spec)?;
        let owner_id = id.id.0 as i64;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE resources
            SET name = ?, spec = ?, token_hash = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND resource_type = ? AND version = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&record.meta.name)
        .bind(&spec)
        .bind(&record.token_hash)
        .bind(Utc::now())
        .bind(owner_id)
        .bind(&record.resource_type)
        .bind(id.version.0 as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| name_conflict(e, record))?;

        if result.rows_affected() == 0 {
            debug!(resource_type = %record.resource_type, id = %id, "Update lost version race");
            return Ok(false);
        }

        delete_labels(&mut tx, owner_id).await?;
        insert_labels(&mut tx, owner_id, &record.meta.labels).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete(
        &self,
        resource_type: &str,
        id: VersionedResourceId,
        mode: DeleteMode,
    ) -> Result<bool> {
        let owner_id = id.id.0 as i64;
        let mut tx = self.pool.begin().await?;

        let result = match mode {
            DeleteMode::Soft => {
                let now = Utc::now();
                sqlx::query(
                    r#"
                    UPDATE resources
                    SET deleted_at = ?, updated_at = ?, version = version + 1
                    WHERE id = ? AND resource_type = ? AND version = ? AND deleted_at IS NULL
                    "#,
                )
                .bind(now)
                .bind(now)
                .bind(owner_id)
                .bind(resource_type)
                .bind(id.version.0 as i64)
                .execute(&mut *tx)
                .await?
            }
            DeleteMode::Hard => {
                sqlx::query(
                    r#"
                    DELETE FROM resources
                    WHERE id = ? AND resource_type = ? AND version = ? AND deleted_at IS NULL
                    "#,
                )
                .bind(owner_id)
                .bind(resource_type)
                .bind(id.version.0 as i64)
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Ok(false);
        }
        if mode == DeleteMode::Hard {
            delete_labels(&mut tx, owner_id).await?;
        }
        tx.commit().await?;
        debug!(resource_type = %resource_type, id = %id, ?mode, "Resource deleted");
        Ok(true)
    }

    async fn find(
        &self,
        resource_type: &str,
        selector: &Selector,
        pagination: Pagination,
    ) -> Result<Vec<ResourceRecord>> {
        let page = pagination.clamp(self.max_page_size);
        let mut builder = Self::live(resource_type);
        push_selector(&mut builder, "r.id", selector)?;
        builder.push(" ORDER BY r.created_at ASC, r.id ASC LIMIT ");
        builder.push_bind(i64::from(page.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(page.offset));
        self.fetch(builder).await
    }

    async fn list_labels(&self, pagination: Pagination) -> Result<Vec<ResourceLabel>> {
        let page = pagination.clamp(self.max_page_size);
        let labels = sqlx::query_as::<_, ResourceLabel>(
            r#"
            SELECT DISTINCT l.key, l.value
            FROM resource_labels l
            JOIN resources r ON r.id = l.owner_id
            WHERE r.deleted_at IS NULL
            ORDER BY l.key ASC, l.value ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await?;
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::labels;
    use serde_json::json;

    /// Create an in-memory SQLite store for testing.
    async fn test_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite store")
    }

    fn record(resource_type: &str, name: &str, labels: Labels) -> ResourceRecord {
        ResourceRecord {
            resource_type: resource_type.into(),
            meta: ResourceMeta::new(name, labels),
            spec: json!({"description": name}),
            token_hash: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = test_store().await;
        let created = store
            .create(record("scenarios", "web", labels([("env", "prod")])))
            .await
            .expect("Failed to create");

        assert_eq!(created.meta.versioned_id(), VersionedResourceId::new(1, 1));

        let fetched = store
            .get("scenarios", created.meta.id)
            .await
            .expect("Query should succeed")
            .expect("Resource should exist");
        assert_eq!(fetched.meta.name, "web");
        assert_eq!(fetched.meta.labels, labels([("env", "prod")]));
        assert_eq!(fetched.spec, json!({"description": "web"}));

        // Types partition the id space.
        assert!(store.get("runners", created.meta.id).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = test_store().await;
        store
            .create(record("scenarios", "web", Labels::new()))
            .await
            .expect("Failed to create");
        let err = store
            .create(record("scenarios", "web", Labels::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }), "{err:?}");

        // Same name under a different type is fine.
        store
            .create(record("runners", "web", Labels::new()))
            .await
            .expect("Failed to create");
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let store = test_store().await;
        let created = store
            .create(record("scenarios", "web", labels([("env", "prod")])))
            .await
            .expect("Failed to create");
        let v1 = created.meta.versioned_id();

        let mut changed = created.clone();
        changed.meta.labels = labels([("env", "dev")]);
        assert!(store.update(&changed, v1).await.expect("update"));
        assert!(!store.update(&changed, v1).await.expect("update"));

        let stored = store
            .get_with_version("scenarios", VersionedResourceId::new(1, 2))
            .await
            .expect("query")
            .expect("v2 should exist");
        assert_eq!(stored.meta.labels, labels([("env", "dev")]));
        assert!(store.get_with_version("scenarios", v1).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn test_reads_pair_spec_with_its_own_labels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::from_path(dir.path().join("urth.db"))
            .await
            .expect("Failed to open");
        let mut current = store
            .create(ResourceRecord {
                spec: json!({"rev": "0"}),
                ..record("scenarios", "web", labels([("rev", "0")]))
            })
            .await
            .expect("Failed to create");
        let id = current.meta.id;

        let writer = async {
            for rev in 1..=20 {
                let mut next = current.clone();
                next.spec = json!({"rev": rev.to_string()});
                next.meta.labels = labels([("rev", rev.to_string())]);
                assert!(store.update(&next, current.meta.versioned_id()).await.expect("update"));
                next.meta.version = current.meta.version.next();
                current = next;
            }
        };
        let reader = async {
            for _ in 0..40 {
                let seen = store
                    .get("scenarios", id)
                    .await
                    .expect("query")
                    .expect("resource should exist");
                assert_eq!(
                    seen.spec["rev"].as_str(),
                    seen.meta.labels.get("rev").map(String::as_str)
                );
            }
        };
        tokio::join!(writer, reader);
    }

    #[tokio::test]
    async fn test_get_by_token() {
        let store = test_store().await;
        let mut runner = record("runners", "edge", Labels::new());
        runner.token_hash = Some("abc123".into());
        store.create(runner).await.expect("Failed to create");

        let found = store
            .get_by_token("runners", "abc123")
            .await
            .expect("query")
            .expect("runner should exist");
        assert_eq!(found.meta.name, "edge");
        assert!(store.get_by_token("runners", "other").await.expect("query").is_none());
    }

    #[tokio::test]
    async fn test_soft_and_hard_delete() {
        let store = test_store().await;
        let soft = store
            .create(record("scenarios", "web", labels([("env", "prod")])))
            .await
            .expect("Failed to create");
        let hard = store
            .create(record("artifacts", "log", labels([("kind", "log")])))
            .await
            .expect("Failed to create");

        assert!(
            store
                .delete("scenarios", soft.meta.versioned_id(), DeleteMode::Soft)
                .await
                .expect("delete")
        );
        assert!(
            store
                .delete("artifacts", hard.meta.versioned_id(), DeleteMode::Hard)
                .await
                .expect("delete")
        );
        assert!(store.get("scenarios", soft.meta.id).await.expect("query").is_none());
        assert!(store.get("artifacts", hard.meta.id).await.expect("query").is_none());

        // Deleted resources do not contribute labels and free their names.
        assert!(store.list_labels(Pagination::default()).await.expect("labels").is_empty());
        store
            .create(record("scenarios", "web", Labels::new()))
            .await
            .expect("name should be free");
    }

    #[tokio::test]
    async fn test_find_with_selector() {
        let store = test_store().await.with_max_page_size(10);
        for (name, replicas) in [("a", "1"), ("b", "3"), ("c", "x"), ("d", "5")] {
            store
                .create(record("scenarios", name, labels([("replicas", replicas)])))
                .await
                .expect("Failed to create");
        }

        let selector = Selector::parse("replicas>2").expect("parses");
        let found = store
            .find("scenarios", &selector, Pagination::default())
            .await
            .expect("find");
        let names: Vec<_> = found.iter().map(|r| r.meta.name.as_str()).collect();
        assert_eq!(names, ["b", "d"]);

        let page = store
            .find("scenarios", &Selector::everything(), Pagination::new(1, 2))
            .await
            .expect("find");
        let names: Vec<_> = page.iter().map(|r| r.meta.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
    }

    #[tokio::test]
    async fn test_from_path_creates_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("urth.db");

        let store = SqliteStore::from_path(&path).await.expect("Failed to open");
        store
            .create(record("scenarios", "web", Labels::new()))
            .await
            .expect("Failed to create");
        assert!(path.exists());
    }
}
