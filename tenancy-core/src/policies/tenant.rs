use anyhow::Result;
use async_trait::async_trait;

use super::{Operation, Scope};
use crate::access::{limit_access, AccessResult, AccessRule, SharedRule};
use crate::authorized::as_values;
use crate::query::Where;
use crate::request::RequestContext;

/// Access to the tenant collection itself.
///
/// Read and update match rows whose `id` is in the authorized set. Delete
/// matches rows whose `parent` is in it, so a caller can remove sub-tenants
/// but never the tenant it is rooted at.
pub struct TenantPolicy {
    scope: Scope,
    operation: Operation,
    original: Option<SharedRule>,
}

impl TenantPolicy {
    pub fn new(scope: Scope, operation: Operation, original: Option<SharedRule>) -> Self {
        Self {
            scope,
            operation,
            original,
        }
    }

    async fn read_or_update(&self, ctx: &RequestContext) -> Result<AccessResult> {
        let root = if self.scope.is_hierarchical() {
            match ctx.requested_tenant_id() {
                Some(t) => t,
                None => return Ok(AccessResult::DENY),
            }
        } else {
            let Some(user) = ctx.user.as_ref() else {
                return Ok(AccessResult::DENY);
            };
            match user.tenant_id() {
                Some(t) => t,
                // No tenant yet: nothing to scope by.
                None => return Ok(AccessResult::ALLOW),
            }
        };

        let base = self.scope.original(self.original.as_ref(), ctx).await?;
        if base.is_denied() {
            return Ok(base);
        }
        let ids = self.scope.authorized(Some(&root)).await?;
        Ok(limit_access(base, Where::any_of("id", as_values(&ids))))
    }

    async fn delete(&self, ctx: &RequestContext) -> Result<AccessResult> {
        let Some(user_tenant) = ctx.user_tenant_id() else {
            return Ok(AccessResult::DENY);
        };
        let root = if self.scope.is_hierarchical() {
            match ctx.requested_tenant_id() {
                Some(t) => t,
                None => return Ok(AccessResult::DENY),
            }
        } else {
            user_tenant
        };

        let base = self.scope.original(self.original.as_ref(), ctx).await?;
        if base.is_denied() {
            return Ok(base);
        }
        let ids = self.scope.authorized(Some(&root)).await?;
        Ok(limit_access(base, Where::any_of("parent", as_values(&ids))))
    }
}

#[async_trait]
impl AccessRule for TenantPolicy {
    async fn evaluate(&self, ctx: &RequestContext) -> Result<AccessResult> {
        match self.operation {
            Operation::Create => self.scope.original(self.original.as_ref(), ctx).await,
            Operation::Read | Operation::Update => self.read_or_update(ctx).await,
            Operation::Delete => self.delete(ctx).await,
        }
    }
}
