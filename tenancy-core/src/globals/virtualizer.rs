use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::draft::requested_draft;
use super::GlobalNames;
use crate::errors::TenancyError;
use crate::hooks::{CollectionHook, HookContext, HookStage};
use crate::policies::Scope;
use crate::query::{FindArgs, PaginatedDocs, Where};
use crate::request::RequestContext;
use crate::store::Document;
use crate::tenant::TenantId;

/// `page`, `limit` and `depth` for version listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionQuery {
    pub page: usize,
    pub limit: usize,
    pub depth: usize,
}

impl Default for VersionQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            depth: 1,
        }
    }
}

impl VersionQuery {
    /// Each value is read from the query string, then the body, defaulted on
    /// its own and clamped to at least 1.
    pub fn from_request(ctx: &RequestContext) -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: usize| {
            ctx.param_value(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map(|n| n.max(1) as usize)
                .unwrap_or(default)
        };
        Self {
            page: read("page", defaults.page),
            limit: read("limit", defaults.limit),
            depth: read("depth", defaults.depth),
        }
    }
}

/// Routes reads and writes of one global to the requesting tenant's row.
pub struct GlobalVirtualizer {
    scope: Scope,
    slug: String,
    names: GlobalNames,
}

impl GlobalVirtualizer {
    pub fn new(scope: Scope, slug: impl Into<String>, names: GlobalNames) -> Self {
        Self {
            scope,
            slug: slug.into(),
            names,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn collection(&self) -> &str {
        &self.names.collection
    }

    pub fn type_name(&self) -> &str {
        &self.names.type_name
    }

    fn tenant(&self, ctx: &RequestContext) -> Result<TenantId> {
        ctx.resolve_tenant_id()
            .ok_or_else(|| TenancyError::tenant_undetermined(&self.slug).into_anyhow())
    }

    /// The tenant's row, resolved against the published version when the
    /// live row is a draft and draft content was not asked for.
    ///
    /// `draft: None` infers the intent from the request.
    pub async fn get(&self, ctx: &RequestContext, draft: Option<bool>) -> Result<Option<Document>> {
        let tenant = self.tenant(ctx)?;
        let draft = match draft {
            Some(d) => d,
            None => requested_draft(ctx, &self.names.type_name)?,
        };

        let found = self
            .scope
            .store
            .find(
                self.collection(),
                FindArgs::new(Where::equals("tenant", tenant.as_str()))
                    .depth(0)
                    .limit(1)
                    .without_pagination(),
            )
            .await?;
        let Some(row) = found.docs.into_iter().next() else {
            return Ok(None);
        };

        if draft || row.get("_status").and_then(Value::as_str) != Some("draft") {
            return Ok(Some(row));
        }

        let published = self
            .scope
            .store
            .find_versions(
                self.collection(),
                FindArgs::new(
                    Where::equals("version.tenant", tenant.as_str())
                        .and(Where::equals("version._status", "published")),
                )
                .limit(1)
                .sort("-updatedAt"),
            )
            .await?;

        let version = published
            .docs
            .into_iter()
            .next()
            .and_then(|v| v.get("version").and_then(Value::as_object).cloned());
        Ok(Some(version.unwrap_or(row)))
    }

    /// Before-read: the tenant's row, created empty on first access.
    pub async fn read(&self, ctx: &RequestContext) -> Result<Document> {
        if let Some(row) = self.get(ctx, None).await? {
            return Ok(row);
        }
        let tenant = self.tenant(ctx)?;
        debug!(global = %self.slug, tenant = %tenant, "initializing global row");

        let mut data = Document::new();
        data.insert("tenant".into(), Value::String(tenant.0));
        self.scope.store.create(self.collection(), data).await
    }

    /// Before-change: create or update the tenant's row with `data`.
    /// The stored `tenant` always comes from the request.
    pub async fn write(&self, ctx: &RequestContext, data: Document) -> Result<Document> {
        let tenant = self.tenant(ctx)?;
        let existing = self.get(ctx, Some(true)).await?;

        let mut data = data;
        data.insert("tenant".into(), Value::String(tenant.0.clone()));

        match existing {
            None => {
                debug!(global = %self.slug, tenant = %tenant, "creating global row");
                self.scope.store.create(self.collection(), data).await
            }
            Some(row) => {
                let updated = self
                    .scope
                    .store
                    .update(
                        self.collection(),
                        Where::equals("tenant", tenant.as_str()),
                        data,
                    )
                    .await?;
                Ok(updated.into_iter().next().unwrap_or(row))
            }
        }
    }

    /// After-change: the row as just written, drafts included.
    pub async fn after_change(&self, ctx: &RequestContext) -> Result<Option<Document>> {
        self.get(ctx, Some(true)).await
    }

    pub async fn versions(&self, ctx: &RequestContext) -> Result<PaginatedDocs> {
        let tenant = self.tenant(ctx)?;
        let query = VersionQuery::from_request(ctx);
        self.scope
            .store
            .find_versions(
                self.collection(),
                FindArgs::new(Where::equals("version.tenant", tenant.as_str()))
                    .page(query.page)
                    .limit(query.limit)
                    .depth(query.depth)
                    .sort("-updatedAt"),
            )
            .await
    }

    pub async fn version_by_id(&self, id: &str) -> Result<Option<Document>> {
        self.scope
            .store
            .find_version_by_id(self.collection(), id)
            .await
    }

    pub async fn restore_version(&self, id: &str) -> Result<Option<Document>> {
        self.scope.store.restore_version(self.collection(), id).await
    }
}

/// Read and change hooks of a global, redirected through its virtualizer.
pub struct GlobalHooks {
    virtualizer: Arc<GlobalVirtualizer>,
}

impl GlobalHooks {
    pub fn new(virtualizer: Arc<GlobalVirtualizer>) -> Self {
        Self { virtualizer }
    }
}

#[async_trait]
impl CollectionHook for GlobalHooks {
    async fn run(&self, stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        match stage {
            HookStage::BeforeRead => {
                ctx.doc = Some(self.virtualizer.read(&ctx.request).await?);
            }
            HookStage::BeforeChange => {
                let data = ctx.data.take().unwrap_or_default();
                self.virtualizer.write(&ctx.request, data).await?;
                // The singleton itself is never written.
                ctx.data = Some(Document::new());
            }
            HookStage::AfterChange => {
                ctx.doc = self.virtualizer.after_change(&ctx.request).await?;
            }
            _ => {}
        }
        Ok(())
    }
}
