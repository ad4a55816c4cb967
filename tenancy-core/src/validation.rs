//! Field rules for tenant rows and user rows, plus tenant stamping for resources.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::errors::TenancyError;
use crate::hooks::{ChangeOperation, CollectionHook, HookContext, HookStage};
use crate::policies::Scope;
use crate::query::{FindArgs, Where};
use crate::request::RequestContext;
use crate::store::Document;
use crate::tenant::{id_of, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldViolation {
    #[error("Slug is required")]
    SlugRequired,
    #[error("Slug cannot contain space characters")]
    SlugWhitespace,
    #[error("Value must be unique")]
    SlugTaken,
    #[error("Cannot relate to itself")]
    SelfParent,
    #[error("Cannot assign parent to root tenant")]
    RootParent,
    #[error("Cannot relate to a descendant")]
    DescendantParent,
    #[error("Required")]
    Required,
    #[error("Unauthorized")]
    Unauthorized,
}

impl FieldViolation {
    pub fn into_error(self, field: &str) -> anyhow::Error {
        TenancyError::invalid_field(field, self.to_string()).into_anyhow()
    }
}

pub type FieldCheck = std::result::Result<(), FieldViolation>;

pub fn validate_slug(slug: Option<&str>) -> FieldCheck {
    match slug {
        None | Some("") => Err(FieldViolation::SlugRequired),
        Some(s) if s.chars().any(char::is_whitespace) => Err(FieldViolation::SlugWhitespace),
        Some(_) => Ok(()),
    }
}

/// No other tenant row may carry `slug`. `id` is the row being updated.
pub async fn validate_slug_unique(scope: &Scope, id: Option<&TenantId>, slug: &str) -> Result<FieldCheck> {
    let mut filter = Where::equals("slug", slug);
    if let Some(id) = id {
        filter = filter.and(Where::not_equals("id", id.as_str()));
    }
    let taken = scope
        .store
        .find(
            &scope.options.tenant_collection,
            FindArgs::new(filter).depth(0).limit(1).without_pagination(),
        )
        .await?;
    Ok(if taken.docs.is_empty() {
        Ok(())
    } else {
        Err(FieldViolation::SlugTaken)
    })
}

/// Parent rules for a tenant row.
///
/// `id` and `current_parent` describe the stored row on update and are
/// `None` on create.
pub async fn validate_parent(
    scope: &Scope,
    ctx: &RequestContext,
    id: Option<&TenantId>,
    current_parent: Option<&TenantId>,
    value: Option<&TenantId>,
) -> Result<FieldCheck> {
    if let (Some(id), Some(value)) = (id, value) {
        if id == value {
            return Ok(Err(FieldViolation::SelfParent));
        }
    }

    let existing = scope
        .store
        .find(&scope.options.tenant_collection, FindArgs::all().limit(1))
        .await?;
    if existing.total_docs == 0 && value.is_none() {
        return Ok(Ok(()));
    }

    // An existing root stays a root.
    if id.is_some() && current_parent.is_none() {
        return Ok(match value {
            Some(_) => Err(FieldViolation::RootParent),
            None => Ok(()),
        });
    }

    let Some(value) = value else {
        return Ok(Err(FieldViolation::Required));
    };

    if let Some(id) = id {
        if scope.authorizes(Some(id), value).await? {
            return Ok(Err(FieldViolation::DescendantParent));
        }
    }

    if !scope.authorizes(ctx.user_tenant_id().as_ref(), value).await? {
        return Ok(Err(FieldViolation::Unauthorized));
    }
    Ok(Ok(()))
}

/// Tenant rules for a user row.
pub async fn validate_user_tenant(
    scope: &Scope,
    ctx: &RequestContext,
    value: Option<&TenantId>,
) -> Result<FieldCheck> {
    // First-user bootstrap.
    let Some(user) = ctx.user.as_ref() else {
        return Ok(Ok(()));
    };
    let Some(own) = user.tenant_id() else {
        return Ok(Ok(()));
    };
    let Some(value) = value else {
        return Ok(Err(FieldViolation::Required));
    };
    if !scope.authorizes(Some(&own), value).await? {
        return Ok(Err(FieldViolation::Unauthorized));
    }
    Ok(Ok(()))
}

/// Overwrite `tenant` with the tenant the request acts on.
pub fn stamp_tenant(ctx: &RequestContext, data: &mut Document) {
    match ctx.resolve_tenant_id() {
        Some(t) => {
            data.insert("tenant".into(), Value::String(t.0));
        }
        None => {
            data.remove("tenant");
        }
    }
}

fn tenant_field(doc: Option<&Document>, field: &str) -> Option<TenantId> {
    doc.and_then(|d| d.get(field)).and_then(id_of).map(TenantId)
}

/// Before-change checks on the tenant collection: `slug` and `parent`.
pub struct TenantFieldRules {
    scope: Scope,
}

impl TenantFieldRules {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl CollectionHook for TenantFieldRules {
    async fn run(&self, _stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        let Some(data) = ctx.data.as_ref() else {
            return Ok(());
        };
        let updating = ctx.operation == Some(ChangeOperation::Update);

        let id = if updating {
            ctx.id.clone().map(TenantId)
        } else {
            None
        };

        if !updating || data.contains_key("slug") {
            let slug = data.get("slug").and_then(Value::as_str);
            validate_slug(slug).map_err(|v| v.into_error("slug"))?;
            if let Some(slug) = slug {
                validate_slug_unique(&self.scope, id.as_ref(), slug)
                    .await?
                    .map_err(|v| v.into_error("slug"))?;
            }
        }
        let current_parent = tenant_field(ctx.original_doc.as_ref(), "parent");
        let value = if updating && !data.contains_key("parent") {
            current_parent.clone()
        } else {
            tenant_field(Some(data), "parent")
        };

        validate_parent(
            &self.scope,
            &ctx.request,
            id.as_ref(),
            current_parent.as_ref(),
            value.as_ref(),
        )
        .await?
        .map_err(|v| v.into_error("parent"))
    }
}

/// Before-change check on auth collections: the assigned `tenant`.
pub struct UserTenantRule {
    scope: Scope,
}

impl UserTenantRule {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl CollectionHook for UserTenantRule {
    async fn run(&self, _stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        let updating = ctx.operation == Some(ChangeOperation::Update);
        let value = match ctx.data.as_ref() {
            Some(data) if updating && !data.contains_key("tenant") => {
                tenant_field(ctx.original_doc.as_ref(), "tenant")
            }
            data => tenant_field(data, "tenant"),
        };

        validate_user_tenant(&self.scope, &ctx.request, value.as_ref())
            .await?
            .map_err(|v| v.into_error("tenant"))
    }
}

/// Before-change stamping of `tenant` on resource rows.
pub struct StampTenant;

#[async_trait]
impl CollectionHook for StampTenant {
    async fn run(&self, _stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        let request = ctx.request.clone();
        let data = ctx.data.get_or_insert_with(Document::new);
        stamp_tenant(&request, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert_eq!(validate_slug(None), Err(FieldViolation::SlugRequired));
        assert_eq!(validate_slug(Some("")), Err(FieldViolation::SlugRequired));
        assert_eq!(validate_slug(Some("acme corp")), Err(FieldViolation::SlugWhitespace));
        assert_eq!(validate_slug(Some("acme\tcorp")), Err(FieldViolation::SlugWhitespace));
        assert_eq!(validate_slug(Some("acme/eu")), Ok(()));
    }

    #[test]
    fn stamping_overwrites_client_value() {
        let ctx = RequestContext::new().with_tenant(TenantId::new("t1"));
        let mut data = Document::new();
        data.insert("tenant".into(), Value::String("forged".into()));
        stamp_tenant(&ctx, &mut data);
        assert_eq!(data["tenant"], "t1");

        stamp_tenant(&RequestContext::new(), &mut data);
        assert!(!data.contains_key("tenant"));
    }
}
