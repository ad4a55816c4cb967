//! Side effects of tenant creation, tenant deletion and login.
//!
//! Cascades are plain sequences of store calls: no transaction, and the
//! first failure stops the rest of the sequence.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::TenancyError;
use crate::hooks::{ChangeOperation, CollectionHook, HookContext, HookStage};
use crate::policies::Scope;
use crate::query::{FindArgs, Where};
use crate::store::Document;
use crate::tenant::{id_of, TenantId};

fn doc_id(doc: &Document) -> Option<String> {
    doc.get("id").and_then(id_of)
}

/// After the very first tenant is created, assign it to every existing user.
pub struct AssignFirstTenant {
    scope: Scope,
    auth_collections: Vec<String>,
}

impl AssignFirstTenant {
    pub fn new(scope: Scope, auth_collections: Vec<String>) -> Self {
        Self {
            scope,
            auth_collections,
        }
    }

    pub async fn assign(&self, tenant_id: &TenantId) -> Result<usize> {
        let tenants = self
            .scope
            .store
            .find(&self.scope.options.tenant_collection, FindArgs::all().limit(2))
            .await?;
        if tenants.total_docs != 1 {
            return Ok(0);
        }

        let mut assigned = 0;
        for collection in &self.auth_collections {
            let users = self
                .scope
                .store
                .find(collection, FindArgs::all().without_pagination())
                .await?;
            for user in &users.docs {
                let Some(id) = doc_id(user) else { continue };
                let mut patch = Document::new();
                patch.insert("tenant".into(), Value::String(tenant_id.0.clone()));
                self.scope.store.update_by_id(collection, &id, patch).await?;
                assigned += 1;
            }
        }

        info!(tenant = %tenant_id, users = assigned, "first tenant assigned to existing users");
        Ok(assigned)
    }
}

#[async_trait]
impl CollectionHook for AssignFirstTenant {
    async fn run(&self, _stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        if ctx.operation != Some(ChangeOperation::Create) {
            return Ok(());
        }
        let Some(id) = ctx.doc.as_ref().and_then(doc_id) else {
            return Ok(());
        };
        self.assign(&TenantId(id)).await?;
        Ok(())
    }
}

/// Counts of what a cascade removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub tenants: usize,
    pub users: usize,
}

/// Before a tenant is deleted, delete its sub-tenants and its users.
///
/// The walk is depth-first over the whole subtree; each descendant's users
/// go before the descendant itself.
pub struct CascadeTenantDelete {
    scope: Scope,
    auth_collections: Vec<String>,
}

impl CascadeTenantDelete {
    pub fn new(scope: Scope, auth_collections: Vec<String>) -> Self {
        Self {
            scope,
            auth_collections,
        }
    }

    pub async fn cascade(&self, tenant_id: &TenantId) -> Result<CascadeReport> {
        let mut report = CascadeReport::default();
        let mut seen = HashSet::from([tenant_id.clone()]);

        // (tenant, children already expanded)
        let mut stack: Vec<(TenantId, bool)> = vec![(tenant_id.clone(), false)];
        while let Some((current, expanded)) = stack.pop() {
            if !expanded {
                stack.push((current.clone(), true));
                let children = self
                    .scope
                    .store
                    .find(
                        &self.scope.options.tenant_collection,
                        FindArgs::new(Where::equals("parent", current.as_str())).without_pagination(),
                    )
                    .await?;
                for child in children.docs.iter().filter_map(doc_id).map(TenantId) {
                    if seen.insert(child.clone()) {
                        stack.push((child, false));
                    }
                }
                continue;
            }

            report.users += self.delete_users(&current).await?;
            if &current != tenant_id {
                self.scope
                    .store
                    .delete(&self.scope.options.tenant_collection, current.as_str())
                    .await?;
                report.tenants += 1;
            }
        }

        info!(
            tenant = %tenant_id,
            tenants = report.tenants,
            users = report.users,
            "tenant delete cascaded"
        );
        Ok(report)
    }

    async fn delete_users(&self, tenant_id: &TenantId) -> Result<usize> {
        let mut deleted = 0;
        for collection in &self.auth_collections {
            let users = self
                .scope
                .store
                .find(
                    collection,
                    FindArgs::new(Where::equals("tenant", tenant_id.as_str())).without_pagination(),
                )
                .await?;
            for id in users.docs.iter().filter_map(doc_id) {
                self.scope.store.delete(collection, &id).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl CollectionHook for CascadeTenantDelete {
    async fn run(&self, _stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        let Some(id) = ctx.id.clone() else {
            return Ok(());
        };
        self.cascade(&TenantId(id)).await?;
        Ok(())
    }
}

/// Refuse logins on a tenant outside the user's authorized set.
///
/// Only active under path and domain isolation.
pub struct RestrictLogin {
    scope: Scope,
}

impl RestrictLogin {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl CollectionHook for RestrictLogin {
    async fn run(&self, _stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        if !self.scope.is_hierarchical() {
            return Ok(());
        }

        let request = &ctx.request;
        let user_tenant = request
            .user
            .as_ref()
            .and_then(|u| u.tenant_id())
            .or_else(|| {
                ctx.doc
                    .as_ref()
                    .and_then(|d| d.get("tenant"))
                    .and_then(id_of)
                    .map(TenantId)
            });

        let allowed = match request.requested_tenant_id() {
            Some(requested) => {
                self.scope
                    .authorizes(user_tenant.as_ref(), &requested)
                    .await?
            }
            None => false,
        };

        if !allowed {
            debug!(collection = %ctx.collection, "login refused outside authorized tenants");
            return Err(TenancyError::forbidden("Unauthorized tenant")
                .with_data(json!({ "collection": ctx.collection }))
                .into_anyhow());
        }
        Ok(())
    }
}
