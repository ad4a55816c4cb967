use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::TenancyError;
use crate::query::{FindArgs, PaginatedDocs, Where};
use crate::store::{Document, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Find,
    FindById,
    Create,
    Update,
    UpdateById,
    Delete,
    FindVersions,
    FindVersionById,
    RestoreVersion,
}

/// One recorded call against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub collection: String,
    pub filter: Option<Where>,
    pub id: Option<String>,
}

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Document>>,
    versions: HashMap<String, Vec<Document>>,
    versioned: HashSet<String>,
    failing: HashMap<String, String>,
    last_stamp: Option<DateTime<Utc>>,
}

/// In-memory document store for tests and development.
///
/// Rows keep insertion order. Versioned collections get a version row on
/// every write. Every call is logged so tests can count queries, and a
/// collection can be switched into failure mode to exercise error paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    calls: Arc<RwLock<Vec<StoreCall>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a version history for `collection`.
    pub fn with_versions(self, collection: impl Into<String>) -> Self {
        self.enable_versions(collection);
        self
    }

    pub fn enable_versions(&self, collection: impl Into<String>) {
        self.tables.write().versioned.insert(collection.into());
    }

    /// Make every subsequent call against `collection` fail with `message`.
    pub fn fail_collection(&self, collection: impl Into<String>, message: impl Into<String>) {
        self.tables
            .write()
            .failing
            .insert(collection.into(), message.into());
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().clone()
    }

    pub fn count(&self, op: StoreOp, collection: &str) -> usize {
        self.calls
            .read()
            .iter()
            .filter(|c| c.op == op && c.collection == collection)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.write().clear();
    }

    /// Snapshot of a collection's live rows.
    pub fn rows(&self, collection: &str) -> Vec<Document> {
        self.tables
            .read()
            .rows
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn version_rows(&self, collection: &str) -> Vec<Document> {
        self.tables
            .read()
            .versions
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, op: StoreOp, collection: &str, filter: Option<&Where>, id: Option<&str>) -> Result<()> {
        self.calls.write().push(StoreCall {
            op,
            collection: collection.to_string(),
            filter: filter.cloned(),
            id: id.map(String::from),
        });

        match self.tables.read().failing.get(collection) {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }

    fn not_found(collection: &str, id: &str) -> anyhow::Error {
        TenancyError::not_found(format!("No record '{id}' in '{collection}'")).into_anyhow()
    }
}

impl Tables {
    /// Strictly increasing timestamps so `-updatedAt` ordering is total.
    fn stamp(&mut self) -> Value {
        let now = Utc::now();
        let next = match self.last_stamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(next);
        Value::String(next.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn snapshot(&mut self, collection: &str, row: &Document) {
        if !self.versioned.contains(collection) {
            return;
        }
        let mut version = Document::new();
        version.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        version.insert("parent".into(), row.get("id").cloned().unwrap_or(Value::Null));
        version.insert("version".into(), Value::Object(row.clone()));
        version.insert("createdAt".into(), row.get("updatedAt").cloned().unwrap_or(Value::Null));
        version.insert("updatedAt".into(), row.get("updatedAt").cloned().unwrap_or(Value::Null));
        self.versions
            .entry(collection.to_string())
            .or_default()
            .push(version);
    }
}

fn merge(target: &mut Document, data: Document) {
    for (k, v) in data {
        if k == "id" {
            continue;
        }
        target.insert(k, v);
    }
}

/// Order by `field` or `-field`. Ties keep the newest row first.
fn sort_rows(rows: &mut [Document], sort: Option<&str>) {
    let Some(sort) = sort else {
        return;
    };
    let (field, descending) = match sort.strip_prefix('-') {
        Some(f) => (f, true),
        None => (sort, false),
    };

    rows.reverse();
    rows.sort_by(|a, b| {
        let ord = compare(a.get(field), b.get(field));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, args: FindArgs) -> Result<PaginatedDocs> {
        self.record(StoreOp::Find, collection, Some(&args.filter), None)?;

        let mut matched: Vec<Document> = self
            .tables
            .read()
            .rows
            .get(collection)
            .map(|rows| rows.iter().filter(|r| args.filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        sort_rows(&mut matched, args.sort.as_deref());

        Ok(PaginatedDocs::paginate(matched, &args))
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.record(StoreOp::FindById, collection, None, Some(id))?;

        Ok(self.tables.read().rows.get(collection).and_then(|rows| {
            rows.iter()
                .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
                .cloned()
        }))
    }

    async fn create(&self, collection: &str, data: Document) -> Result<Document> {
        self.record(StoreOp::Create, collection, None, None)?;

        let mut tables = self.tables.write();
        let mut row = data;
        if !matches!(row.get("id"), Some(Value::String(s)) if !s.is_empty()) {
            row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        let now = tables.stamp();
        row.insert("createdAt".into(), now.clone());
        row.insert("updatedAt".into(), now);

        tables
            .rows
            .entry(collection.to_string())
            .or_default()
            .push(row.clone());
        tables.snapshot(collection, &row);

        Ok(row)
    }

    async fn update(&self, collection: &str, filter: Where, data: Document) -> Result<Vec<Document>> {
        self.record(StoreOp::Update, collection, Some(&filter), None)?;

        let mut tables = self.tables.write();
        let now = tables.stamp();
        let mut updated = Vec::new();
        if let Some(rows) = tables.rows.get_mut(collection) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                merge(row, data.clone());
                row.insert("updatedAt".into(), now.clone());
                updated.push(row.clone());
            }
        }
        for row in &updated {
            tables.snapshot(collection, row);
        }

        Ok(updated)
    }

    async fn update_by_id(&self, collection: &str, id: &str, data: Document) -> Result<Document> {
        self.record(StoreOp::UpdateById, collection, None, Some(id))?;

        let mut tables = self.tables.write();
        let now = tables.stamp();
        let row = tables
            .rows
            .get_mut(collection)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| Self::not_found(collection, id))?;
        merge(row, data);
        row.insert("updatedAt".into(), now);
        let row = row.clone();
        tables.snapshot(collection, &row);

        Ok(row)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<Document> {
        self.record(StoreOp::Delete, collection, None, Some(id))?;

        let mut tables = self.tables.write();
        let rows = tables
            .rows
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(collection, id))?;
        let pos = rows
            .iter()
            .position(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| Self::not_found(collection, id))?;

        Ok(rows.remove(pos))
    }

    async fn find_versions(&self, collection: &str, args: FindArgs) -> Result<PaginatedDocs> {
        self.record(StoreOp::FindVersions, collection, Some(&args.filter), None)?;

        let mut matched: Vec<Document> = self
            .tables
            .read()
            .versions
            .get(collection)
            .map(|rows| rows.iter().filter(|r| args.filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        sort_rows(&mut matched, args.sort.as_deref());

        Ok(PaginatedDocs::paginate(matched, &args))
    }

    async fn find_version_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.record(StoreOp::FindVersionById, collection, None, Some(id))?;

        Ok(self.tables.read().versions.get(collection).and_then(|rows| {
            rows.iter()
                .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
                .cloned()
        }))
    }

    async fn restore_version(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.record(StoreOp::RestoreVersion, collection, None, Some(id))?;

        let mut tables = self.tables.write();
        let version = tables.versions.get(collection).and_then(|rows| {
            rows.iter()
                .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
                .cloned()
        });
        let Some(version) = version else {
            return Ok(None);
        };
        let Some(parent) = version.get("parent").and_then(Value::as_str).map(String::from) else {
            return Ok(None);
        };
        let mut snapshot = match version.get("version") {
            Some(Value::Object(o)) => o.clone(),
            _ => Document::new(),
        };
        snapshot.remove("createdAt");

        let now = tables.stamp();
        let rows = tables.rows.entry(collection.to_string()).or_default();
        let existing = rows
            .iter()
            .position(|r| r.get("id").and_then(Value::as_str) == Some(parent.as_str()));
        let restored = match existing {
            Some(pos) => {
                let row = &mut rows[pos];
                merge(row, snapshot);
                row.insert("updatedAt".into(), now);
                row.clone()
            }
            None => {
                let mut row = snapshot;
                row.insert("id".into(), Value::String(parent));
                row.insert("createdAt".into(), now.clone());
                row.insert("updatedAt".into(), now);
                rows.push(row.clone());
                row
            }
        };
        tables.snapshot(collection, &restored);

        Ok(Some(restored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn versions_sort_newest_first() {
        let store = MemoryStore::new().with_versions("settings");
        let row = store.create("settings", doc(json!({ "title": "one" }))).await.unwrap();
        let id = row["id"].as_str().unwrap().to_string();
        store
            .update_by_id("settings", &id, doc(json!({ "title": "two" })))
            .await
            .unwrap();

        let page = store
            .find_versions("settings", FindArgs::all().sort("-updatedAt"))
            .await
            .unwrap();
        assert_eq!(page.total_docs, 2);
        assert_eq!(page.docs[0]["version"]["title"], "two");
    }

    #[tokio::test]
    async fn restore_writes_the_snapshot_back() {
        let store = MemoryStore::new().with_versions("settings");
        let row = store.create("settings", doc(json!({ "title": "one" }))).await.unwrap();
        let id = row["id"].as_str().unwrap().to_string();
        let first = store.version_rows("settings")[0]["id"].as_str().unwrap().to_string();
        store
            .update_by_id("settings", &id, doc(json!({ "title": "two" })))
            .await
            .unwrap();

        let restored = store.restore_version("settings", &first).await.unwrap().unwrap();
        assert_eq!(restored["title"], "one");
        assert_eq!(restored["id"], json!(id));
        assert!(store.restore_version("settings", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_collection_errors_but_is_logged() {
        let store = MemoryStore::new();
        store.fail_collection("tenants", "database unavailable");
        let err = store.find("tenants", FindArgs::all()).await.unwrap_err();
        assert!(err.to_string().contains("database unavailable"));
        assert_eq!(store.count(StoreOp::Find, "tenants"), 1);
    }

    #[tokio::test]
    async fn versions_are_kept_only_once_enabled() {
        let store = MemoryStore::new();
        store.create("settings", doc(json!({ "title": "one" }))).await.unwrap();
        assert!(store.version_rows("settings").is_empty());

        store.enable_versions("settings");
        store.create("settings", doc(json!({ "title": "two" }))).await.unwrap();
        let versions = store.version_rows("settings");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0]["version"]["title"], "two");
    }
}
