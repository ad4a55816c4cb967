use async_trait::async_trait;
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use crate::query::{FindArgs, PaginatedDocs, Where};

/// A stored document.
pub type Document = Map<String, Value>;

/// The document store the tenancy core runs against.
///
/// Collections are addressed by slug. Version operations address the
/// version history of a versioned collection; a version row carries the
/// snapshot under `version` and the live row's id under `parent`.
///
/// All methods have default implementations that return
/// "Method not implemented", so a store can override only
/// what it actually supports.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, _args: FindArgs) -> Result<PaginatedDocs> {
        Err(anyhow!("Method not implemented: find ({collection})"))
    }

    async fn find_by_id(&self, collection: &str, _id: &str) -> Result<Option<Document>> {
        Err(anyhow!("Method not implemented: find_by_id ({collection})"))
    }

    async fn create(&self, collection: &str, _data: Document) -> Result<Document> {
        Err(anyhow!("Method not implemented: create ({collection})"))
    }

    /// Apply `data` over every row matching `filter`.
    async fn update(&self, collection: &str, _filter: Where, _data: Document) -> Result<Vec<Document>> {
        Err(anyhow!("Method not implemented: update ({collection})"))
    }

    async fn update_by_id(&self, collection: &str, _id: &str, _data: Document) -> Result<Document> {
        Err(anyhow!("Method not implemented: update_by_id ({collection})"))
    }

    async fn delete(&self, collection: &str, _id: &str) -> Result<Document> {
        Err(anyhow!("Method not implemented: delete ({collection})"))
    }

    async fn find_versions(&self, collection: &str, _args: FindArgs) -> Result<PaginatedDocs> {
        Err(anyhow!("Method not implemented: find_versions ({collection})"))
    }

    async fn find_version_by_id(&self, collection: &str, _id: &str) -> Result<Option<Document>> {
        Err(anyhow!("Method not implemented: find_version_by_id ({collection})"))
    }

    /// Write a version's snapshot back to its live row. `None` when the version is unknown.
    async fn restore_version(&self, collection: &str, _id: &str) -> Result<Option<Document>> {
        Err(anyhow!("Method not implemented: restore_version ({collection})"))
    }
}
