//! Access policies for each kind of collection.
//!
//! Every policy wraps an optional `original` rule (the collection's own
//! access declaration) and narrows it to the caller's tenants with
//! [`crate::access::limit_access`]. When no `original` is declared,
//! [`DefaultAccess`] stands in for it.

mod admin;
mod resource;
mod tenant;
mod user;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::access::{AccessResult, AccessRule, SharedRule};
use crate::authorized;
use crate::config::TenancyOptions;
use crate::request::RequestContext;
use crate::store::DocumentStore;
use crate::tenant::TenantId;

pub use admin::AdminPolicy;
pub use resource::ResourcePolicy;
pub use tenant::TenantPolicy;
pub use user::UserPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];
}

/// Store and options shared by every policy and hook.
#[derive(Clone)]
pub struct Scope {
    pub store: Arc<dyn DocumentStore>,
    pub options: Arc<TenancyOptions>,
}

impl Scope {
    pub fn new(store: Arc<dyn DocumentStore>, options: TenancyOptions) -> Self {
        Self {
            store,
            options: Arc::new(options),
        }
    }

    pub fn is_hierarchical(&self) -> bool {
        self.options.isolation_strategy.is_hierarchical()
    }

    pub async fn authorized(&self, tenant: Option<&TenantId>) -> Result<Vec<TenantId>> {
        authorized::resolve(self.store.as_ref(), &self.options, tenant).await
    }

    /// Does `root`'s authorized set contain `candidate`?
    pub async fn authorizes(&self, root: Option<&TenantId>, candidate: &TenantId) -> Result<bool> {
        authorized::contains(self.store.as_ref(), &self.options, root, candidate).await
    }

    /// Evaluate the wrapped rule, or the default when none was declared.
    pub(crate) async fn original(
        &self,
        original: Option<&SharedRule>,
        ctx: &RequestContext,
    ) -> Result<AccessResult> {
        match original {
            Some(rule) => rule.evaluate(ctx).await,
            None => DefaultAccess::new(self.clone()).evaluate(ctx).await,
        }
    }
}

/// Stand-in for collections that declare no access rule of their own.
///
/// Anonymous callers are denied. Under path and domain isolation the
/// user's tenant must cover the tenant bound to the request.
pub struct DefaultAccess {
    scope: Scope,
}

impl DefaultAccess {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl AccessRule for DefaultAccess {
    async fn evaluate(&self, ctx: &RequestContext) -> Result<AccessResult> {
        let Some(user) = ctx.user.as_ref() else {
            return Ok(AccessResult::DENY);
        };
        if !self.scope.is_hierarchical() {
            return Ok(AccessResult::ALLOW);
        }
        let Some(requested) = ctx.requested_tenant_id() else {
            return Ok(AccessResult::DENY);
        };
        let allowed = self
            .scope
            .authorizes(user.tenant_id().as_ref(), &requested)
            .await?;
        Ok(AccessResult::Allow(allowed))
    }
}
