//! Collection operations run through the transformed configuration:
//! access first, then hooks around the store call.

use anyhow::Result;

use super::Tenancy;
use crate::access::AccessResult;
use crate::errors::TenancyError;
use crate::hooks::{ChangeOperation, HookContext, HookStage};
use crate::policies::Operation;
use crate::query::{FindArgs, PaginatedDocs, Where};
use crate::request::RequestContext;
use crate::store::Document;

const FORBIDDEN: &str = "You are not allowed to perform this action.";

/// Fold an access result into a filter; `None` means nothing is visible.
fn narrow(access: AccessResult, filter: Where) -> Option<Where> {
    match access {
        AccessResult::Allow(false) => None,
        AccessResult::Allow(true) => Some(filter),
        AccessResult::Where(scope) if filter == Where::All => Some(scope),
        AccessResult::Where(scope) => Some(scope.and(filter)),
    }
}

fn permits(access: &AccessResult, doc: &Document) -> bool {
    match access {
        AccessResult::Allow(b) => *b,
        AccessResult::Where(w) => w.matches(doc),
    }
}

fn forbidden() -> anyhow::Error {
    TenancyError::forbidden(FORBIDDEN).into_anyhow()
}

impl Tenancy {
    pub async fn find(&self, collection: &str, ctx: &RequestContext, args: FindArgs) -> Result<PaginatedDocs> {
        let config = self.require(collection)?;
        let access = self.access(collection, Operation::Read, ctx).await?;
        let Some(filter) = narrow(access, args.filter.clone()) else {
            return Ok(PaginatedDocs {
                limit: args.limit.unwrap_or(10),
                page: 1,
                total_pages: 1,
                ..PaginatedDocs::default()
            });
        };

        let mut page = self
            .store()
            .find(collection, FindArgs { filter, ..args })
            .await?;
        for doc in page.docs.iter_mut() {
            let mut hook_ctx = HookContext::new(ctx.clone(), collection).with_doc(std::mem::take(doc));
            config.hooks.run(HookStage::AfterRead, &mut hook_ctx).await?;
            *doc = hook_ctx.doc.unwrap_or_default();
        }
        Ok(page)
    }

    pub async fn find_by_id(&self, collection: &str, ctx: &RequestContext, id: &str) -> Result<Option<Document>> {
        let config = self.require(collection)?;
        let access = self.access(collection, Operation::Read, ctx).await?;
        if access.is_denied() {
            return Ok(None);
        }
        let Some(doc) = self.store().find_by_id(collection, id).await? else {
            return Ok(None);
        };
        if !permits(&access, &doc) {
            return Ok(None);
        }

        let mut hook_ctx = HookContext::new(ctx.clone(), collection).with_doc(doc);
        config.hooks.run(HookStage::AfterRead, &mut hook_ctx).await?;
        Ok(hook_ctx.doc)
    }

    pub async fn create(&self, collection: &str, ctx: &RequestContext, data: Document) -> Result<Document> {
        let config = self.require(collection)?;
        if self.access(collection, Operation::Create, ctx).await?.is_denied() {
            return Err(forbidden());
        }

        let mut hook_ctx = HookContext::new(ctx.clone(), collection)
            .with_operation(ChangeOperation::Create)
            .with_data(data);
        config.hooks.run(HookStage::BeforeChange, &mut hook_ctx).await?;

        let created = self
            .store()
            .create(collection, hook_ctx.data.take().unwrap_or_default())
            .await?;
        hook_ctx.doc = Some(created.clone());
        config.hooks.run(HookStage::AfterChange, &mut hook_ctx).await?;
        Ok(hook_ctx.doc.unwrap_or(created))
    }

    pub async fn update(&self, collection: &str, ctx: &RequestContext, id: &str, data: Document) -> Result<Document> {
        let config = self.require(collection)?;
        let access = self.access(collection, Operation::Update, ctx).await?;
        if access.is_denied() {
            return Err(forbidden());
        }
        let existing = self
            .store()
            .find_by_id(collection, id)
            .await?
            .ok_or_else(|| TenancyError::not_found(format!("No record '{id}' in '{collection}'")).into_anyhow())?;
        if !permits(&access, &existing) {
            return Err(forbidden());
        }

        let mut hook_ctx = HookContext::new(ctx.clone(), collection)
            .with_operation(ChangeOperation::Update)
            .with_id(id)
            .with_original_doc(existing)
            .with_data(data);
        config.hooks.run(HookStage::BeforeChange, &mut hook_ctx).await?;

        let updated = self
            .store()
            .update_by_id(collection, id, hook_ctx.data.take().unwrap_or_default())
            .await?;
        hook_ctx.doc = Some(updated.clone());
        config.hooks.run(HookStage::AfterChange, &mut hook_ctx).await?;
        Ok(hook_ctx.doc.unwrap_or(updated))
    }

    pub async fn delete(&self, collection: &str, ctx: &RequestContext, id: &str) -> Result<Document> {
        let config = self.require(collection)?;
        let access = self.access(collection, Operation::Delete, ctx).await?;
        if access.is_denied() {
            return Err(forbidden());
        }
        let existing = self
            .store()
            .find_by_id(collection, id)
            .await?
            .ok_or_else(|| TenancyError::not_found(format!("No record '{id}' in '{collection}'")).into_anyhow())?;
        if !permits(&access, &existing) {
            return Err(forbidden());
        }

        let mut hook_ctx = HookContext::new(ctx.clone(), collection)
            .with_id(id)
            .with_doc(existing);
        config.hooks.run(HookStage::BeforeDelete, &mut hook_ctx).await?;

        self.store().delete(collection, id).await
    }

    /// Run the before-login hooks of an auth collection for `user`.
    pub async fn login(&self, collection: &str, ctx: &RequestContext, user: Document) -> Result<()> {
        let config = self.require(collection)?;
        let mut hook_ctx = HookContext::new(ctx.clone(), collection).with_doc(user);
        config.hooks.run(HookStage::BeforeLogin, &mut hook_ctx).await
    }

    /// Read a global. Tenant-scoped globals resolve to the caller's row.
    pub async fn read_global(&self, slug: &str, ctx: &RequestContext) -> Result<Document> {
        let hooks = self.global_hooks(slug).ok_or_else(|| unknown_global(slug))?;
        let mut hook_ctx = HookContext::new(ctx.clone(), slug);
        hooks.run(HookStage::BeforeRead, &mut hook_ctx).await?;
        Ok(hook_ctx.doc.unwrap_or_default())
    }

    /// Write a global. Returns the tenant's row after the change.
    pub async fn update_global(&self, slug: &str, ctx: &RequestContext, data: Document) -> Result<Document> {
        let hooks = self.global_hooks(slug).ok_or_else(|| unknown_global(slug))?;
        let mut hook_ctx = HookContext::new(ctx.clone(), slug)
            .with_operation(ChangeOperation::Update)
            .with_data(data);
        hooks.run(HookStage::BeforeChange, &mut hook_ctx).await?;
        hooks.run(HookStage::AfterChange, &mut hook_ctx).await?;
        Ok(hook_ctx.doc.unwrap_or_default())
    }
}

fn unknown_global(slug: &str) -> anyhow::Error {
    TenancyError::not_found(format!("Unknown global '{slug}'")).into_anyhow()
}
