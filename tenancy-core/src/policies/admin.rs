use anyhow::Result;
use async_trait::async_trait;

use super::Scope;
use crate::access::{AccessResult, AccessRule, SharedRule};
use crate::request::RequestContext;

/// Admin panel visibility for auth-enabled collections.
///
/// Under path and domain isolation the user's own tenant must cover the
/// tenant bound to the request before the wrapped rule is consulted.
pub struct AdminPolicy {
    scope: Scope,
    original: Option<SharedRule>,
}

impl AdminPolicy {
    pub fn new(scope: Scope, original: Option<SharedRule>) -> Self {
        Self { scope, original }
    }

    async fn original(&self, ctx: &RequestContext) -> Result<AccessResult> {
        match &self.original {
            Some(rule) => rule.evaluate(ctx).await,
            None => Ok(AccessResult::ALLOW),
        }
    }
}

#[async_trait]
impl AccessRule for AdminPolicy {
    async fn evaluate(&self, ctx: &RequestContext) -> Result<AccessResult> {
        if !self.scope.is_hierarchical() {
            return self.original(ctx).await;
        }

        let Some(requested) = ctx.requested_tenant_id() else {
            return Ok(AccessResult::DENY);
        };
        let allowed = self
            .scope
            .authorizes(ctx.user_tenant_id().as_ref(), &requested)
            .await?;
        if !allowed {
            return Ok(AccessResult::DENY);
        }
        self.original(ctx).await
    }
}
