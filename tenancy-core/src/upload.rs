//! Tenant-prefixed URLs for upload collections under path isolation.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::hooks::{CollectionHook, HookContext, HookStage};
use crate::policies::Scope;
use crate::store::Document;
use crate::tenant::id_of;

/// Rewrites `url` (and `sizes.*.url`) to `{server_url}/{slug}{static_url}/{filename}`.
pub struct TenantUploadUrls {
    scope: Scope,
    static_url: String,
}

impl TenantUploadUrls {
    pub fn new(scope: Scope, static_url: impl Into<String>) -> Self {
        Self {
            scope,
            static_url: static_url.into(),
        }
    }

    /// Absolute static URLs (a CDN, say) are left alone.
    fn is_relative(&self) -> bool {
        self.static_url.starts_with('/')
    }

    fn url_for(&self, slug: &str, filename: &str) -> String {
        format!(
            "{}/{}{}/{}",
            self.scope.options.server_url.trim_end_matches('/'),
            slug,
            self.static_url,
            filename
        )
    }

    pub async fn rewrite(&self, doc: &mut Document) -> Result<()> {
        if !self.is_relative() {
            return Ok(());
        }
        let Some(tenant_id) = doc.get("tenant").and_then(id_of) else {
            return Ok(());
        };
        let slug = match doc.get("tenant") {
            Some(Value::Object(t)) if t.contains_key("slug") => {
                t.get("slug").and_then(Value::as_str).map(String::from)
            }
            _ => self
                .scope
                .store
                .find_by_id(&self.scope.options.tenant_collection, &tenant_id)
                .await?
                .and_then(|t| t.get("slug").and_then(Value::as_str).map(String::from)),
        };
        let Some(slug) = slug else {
            return Ok(());
        };

        if let Some(filename) = doc.get("filename").and_then(Value::as_str) {
            let url = self.url_for(&slug, filename);
            doc.insert("url".into(), Value::String(url));
        }
        if let Some(Value::Object(sizes)) = doc.get_mut("sizes") {
            for size in sizes.values_mut() {
                let Some(size) = size.as_object_mut() else { continue };
                let Some(filename) = size.get("filename").and_then(Value::as_str) else {
                    continue;
                };
                let url = self.url_for(&slug, filename);
                size.insert("url".into(), Value::String(url));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionHook for TenantUploadUrls {
    async fn run(&self, _stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        if let Some(doc) = ctx.doc.as_mut() {
            self.rewrite(doc).await?;
        }
        Ok(())
    }
}
