use anyhow::Result;
use async_trait::async_trait;

use super::{Operation, Scope};
use crate::access::{limit_access, AccessResult, AccessRule, SharedRule};
use crate::authorized::as_values;
use crate::query::Where;
use crate::request::RequestContext;

/// Access to auth-enabled collections. A user can always see its own record.
pub struct UserPolicy {
    scope: Scope,
    operation: Operation,
    original: Option<SharedRule>,
}

impl UserPolicy {
    pub fn new(scope: Scope, operation: Operation, original: Option<SharedRule>) -> Self {
        Self {
            scope,
            operation,
            original,
        }
    }
}

#[async_trait]
impl AccessRule for UserPolicy {
    async fn evaluate(&self, ctx: &RequestContext) -> Result<AccessResult> {
        let hierarchical = self.scope.is_hierarchical();

        if self.operation == Operation::Create {
            if !hierarchical && ctx.caller_tenant_id().is_none() {
                return Ok(AccessResult::DENY);
            }
            return self.scope.original(self.original.as_ref(), ctx).await;
        }

        if !hierarchical {
            let Some(user) = ctx.user.as_ref() else {
                return Ok(AccessResult::DENY);
            };
            if user.tenant_id().is_none() {
                return Ok(AccessResult::ALLOW);
            }
        }

        let base = self.scope.original(self.original.as_ref(), ctx).await?;
        if base.is_denied() {
            return Ok(base);
        }

        let root = if hierarchical {
            ctx.requested_tenant_id()
        } else {
            ctx.user_tenant_id()
        };
        let own_record = ctx.user.as_ref().map(|u| Where::equals("id", u.id.as_str()));

        let condition = match (root, own_record) {
            (Some(root), own) => {
                let ids = self.scope.authorized(Some(&root)).await?;
                let in_tenants = Where::any_of("tenant", as_values(&ids));
                match own {
                    Some(own) => in_tenants.or(own),
                    None => in_tenants,
                }
            }
            (None, Some(own)) => own,
            (None, None) => return Ok(AccessResult::DENY),
        };

        Ok(limit_access(base, condition))
    }
}
