use anyhow::Result;
use async_trait::async_trait;

use super::{Operation, Scope};
use crate::access::{limit_access, AccessResult, AccessRule, SharedRule};
use crate::authorized::as_values;
use crate::query::Where;
use crate::request::RequestContext;

/// Tenant scoping for ordinary tenant-owned collections.
pub struct ResourcePolicy {
    scope: Scope,
    operation: Operation,
    original: Option<SharedRule>,
}

impl ResourcePolicy {
    pub fn new(scope: Scope, operation: Operation, original: Option<SharedRule>) -> Self {
        Self {
            scope,
            operation,
            original,
        }
    }
}

#[async_trait]
impl AccessRule for ResourcePolicy {
    async fn evaluate(&self, ctx: &RequestContext) -> Result<AccessResult> {
        if self.operation == Operation::Create {
            // Hierarchy gates visibility, not creation.
            if !self.scope.is_hierarchical() && ctx.caller_tenant_id().is_none() {
                return Ok(AccessResult::DENY);
            }
            return self.scope.original(self.original.as_ref(), ctx).await;
        }

        let base = self.scope.original(self.original.as_ref(), ctx).await?;
        if base.is_denied() {
            return Ok(base);
        }

        if self.scope.is_hierarchical() {
            let Some(requested) = ctx.requested_tenant_id() else {
                return Ok(AccessResult::DENY);
            };
            let ids = self.scope.authorized(Some(&requested)).await?;
            Ok(limit_access(base, Where::any_of("tenant", as_values(&ids))))
        } else {
            let Some(own) = ctx.caller_tenant_id() else {
                return Ok(AccessResult::DENY);
            };
            Ok(limit_access(base, Where::equals("tenant", own.as_str())))
        }
    }
}
