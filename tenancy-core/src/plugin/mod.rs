//! The tenancy plugin.
//!
//! [`Tenancy::configure`] takes the application's collections and globals,
//! classifies each collection, wraps its access rules in the matching
//! policy and attaches the tenancy hooks. The resulting [`Tenancy`] owns
//! the transformed configuration and runs scoped operations against the
//! store.

mod collections;
mod ops;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::access::{fixed, AccessResult, SharedRule};
use crate::config::{IsolationStrategy, TenancyOptions};
use crate::globals::{GlobalHooks, GlobalRegistry, GlobalVirtualizer};
use crate::hooks::{CollectionHooks, HookStage};
use crate::lifecycle::{AssignFirstTenant, CascadeTenantDelete, RestrictLogin};
use crate::policies::{AdminPolicy, Operation, ResourcePolicy, Scope, TenantPolicy, UserPolicy};
use crate::request::RequestContext;
use crate::store::DocumentStore;
use crate::upload::TenantUploadUrls;
use crate::validation::{StampTenant, TenantFieldRules, UserTenantRule};

pub use collections::{AppConfig, CollectionAccess, CollectionConfig, CollectionKind, UploadConfig};

pub struct Tenancy {
    scope: Scope,
    collections: Vec<CollectionConfig>,
    kinds: HashMap<String, CollectionKind>,
    registry: Arc<GlobalRegistry>,
    globals: HashMap<String, Arc<GlobalVirtualizer>>,
    global_hooks: HashMap<String, CollectionHooks>,
}

impl Tenancy {
    pub fn configure(options: TenancyOptions, config: AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        options.validate()?;

        match config
            .collections
            .iter()
            .find(|c| c.slug == options.tenant_collection)
        {
            None => crate::bail_tenancy!(
                bad_request,
                "tenant collection '{}' is not declared",
                options.tenant_collection
            ),
            Some(c) if c.auth => crate::bail_tenancy!(
                bad_request,
                "tenant collection '{}' cannot be an auth collection",
                options.tenant_collection
            ),
            Some(_) => {}
        }

        let scope = Scope::new(store, options);
        let options = scope.options.clone();
        let auth_collections: Vec<String> = config
            .collections
            .iter()
            .filter(|c| c.auth)
            .map(|c| c.slug.clone())
            .collect();

        let mut kinds = HashMap::new();
        let mut collections = Vec::with_capacity(config.collections.len() + config.globals.len());

        for mut collection in config.collections {
            let kind = if collection.slug == options.tenant_collection {
                CollectionKind::Tenants
            } else if options.is_shared_collection(&collection.slug) {
                CollectionKind::Shared
            } else if collection.auth {
                CollectionKind::Users
            } else {
                CollectionKind::Resource
            };

            match kind {
                CollectionKind::Tenants => {
                    wrap_access(&mut collection.access, |op, original| -> SharedRule {
                        Arc::new(TenantPolicy::new(scope.clone(), op, original))
                    });
                    let hooks = &mut collection.hooks;
                    hooks.push(HookStage::BeforeChange, Arc::new(TenantFieldRules::new(scope.clone())));
                    hooks.push(
                        HookStage::AfterChange,
                        Arc::new(AssignFirstTenant::new(scope.clone(), auth_collections.clone())),
                    );
                    hooks.push(
                        HookStage::BeforeDelete,
                        Arc::new(CascadeTenantDelete::new(scope.clone(), auth_collections.clone())),
                    );
                }
                CollectionKind::Users => {
                    wrap_access(&mut collection.access, |op, original| -> SharedRule {
                        Arc::new(UserPolicy::new(scope.clone(), op, original))
                    });
                    let admin = collection.access.admin.take();
                    collection.access.admin = Some(Arc::new(AdminPolicy::new(scope.clone(), admin)));
                    let hooks = &mut collection.hooks;
                    hooks.push(HookStage::BeforeChange, Arc::new(UserTenantRule::new(scope.clone())));
                    hooks.push(HookStage::BeforeLogin, Arc::new(RestrictLogin::new(scope.clone())));
                }
                CollectionKind::Resource => {
                    wrap_access(&mut collection.access, |op, original| -> SharedRule {
                        Arc::new(ResourcePolicy::new(scope.clone(), op, original))
                    });
                    collection.hooks.push(HookStage::BeforeChange, Arc::new(StampTenant));
                    if let Some(upload) = &collection.upload {
                        if options.isolation_strategy == IsolationStrategy::Path {
                            collection.hooks.push(
                                HookStage::AfterRead,
                                Arc::new(TenantUploadUrls::new(scope.clone(), upload.static_url.clone())),
                            );
                        }
                    }
                }
                CollectionKind::Shared | CollectionKind::GlobalRows => {}
            }

            kinds.insert(collection.slug.clone(), kind);
            collections.push(collection);
        }

        let scoped_globals: Vec<_> = config
            .globals
            .iter()
            .filter(|g| !options.is_shared_global(&g.slug))
            .cloned()
            .collect();
        let registry = Arc::new(GlobalRegistry::from_globals(&scoped_globals));

        let mut globals = HashMap::new();
        let mut global_hooks = HashMap::new();
        for global in &scoped_globals {
            let Some(names) = registry.get(&global.slug).cloned() else {
                continue;
            };

            let mut rows = CollectionConfig::new(names.collection.clone());
            rows.hidden = true;
            rows.versions = global.versions;
            for op in Operation::ALL {
                rows.access.set(op, fixed(false));
            }
            rows.access.admin = Some(fixed(false));
            kinds.insert(rows.slug.clone(), CollectionKind::GlobalRows);
            collections.push(rows);

            let virtualizer = Arc::new(GlobalVirtualizer::new(scope.clone(), global.slug.clone(), names));
            let hook = Arc::new(GlobalHooks::new(virtualizer.clone()));
            let mut hooks = CollectionHooks::new();
            hooks.push(HookStage::BeforeRead, hook.clone());
            hooks.push(HookStage::BeforeChange, hook.clone());
            hooks.push(HookStage::AfterChange, hook);

            globals.insert(global.slug.clone(), virtualizer);
            global_hooks.insert(global.slug.clone(), hooks);
        }

        info!(
            strategy = %options.isolation_strategy,
            collections = collections.len(),
            globals = globals.len(),
            "tenancy configured"
        );

        Ok(Self {
            scope,
            collections,
            kinds,
            registry,
            globals,
            global_hooks,
        })
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn options(&self) -> &TenancyOptions {
        &self.scope.options
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.scope.store
    }

    pub fn registry(&self) -> &GlobalRegistry {
        &self.registry
    }

    pub fn collections(&self) -> &[CollectionConfig] {
        &self.collections
    }

    pub fn collection(&self, slug: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.slug == slug)
    }

    /// Collections whose store must keep a version history.
    pub fn versioned_collections(&self) -> impl Iterator<Item = &str> {
        self.collections
            .iter()
            .filter(|c| c.versions)
            .map(|c| c.slug.as_str())
    }

    pub fn kind(&self, slug: &str) -> Option<CollectionKind> {
        self.kinds.get(slug).copied()
    }

    pub fn global(&self, slug: &str) -> Option<Arc<GlobalVirtualizer>> {
        self.globals.get(slug).cloned()
    }

    pub fn global_slugs(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }

    pub fn global_hooks(&self, slug: &str) -> Option<&CollectionHooks> {
        self.global_hooks.get(slug)
    }

    /// Evaluate a collection's access rule. Undeclared rules allow.
    pub async fn access(&self, collection: &str, op: Operation, ctx: &RequestContext) -> Result<AccessResult> {
        let config = self.require(collection)?;
        match config.access.get(op) {
            Some(rule) => rule.evaluate(ctx).await,
            None => Ok(AccessResult::ALLOW),
        }
    }

    pub async fn admin_access(&self, collection: &str, ctx: &RequestContext) -> Result<AccessResult> {
        let config = self.require(collection)?;
        match &config.access.admin {
            Some(rule) => rule.evaluate(ctx).await,
            None => Ok(AccessResult::ALLOW),
        }
    }

    pub(crate) fn require(&self, collection: &str) -> Result<&CollectionConfig> {
        self.collection(collection).ok_or_else(|| {
            crate::errors::TenancyError::not_found(format!("Unknown collection '{collection}'")).into_anyhow()
        })
    }
}

/// Replace each declared rule (or its absence) with `policy(op, original)`.
fn wrap_access<F>(access: &mut CollectionAccess, policy: F)
where
    F: Fn(Operation, Option<SharedRule>) -> SharedRule,
{
    for op in Operation::ALL {
        let original = access.get(op).cloned();
        access.set(op, policy(op, original));
    }
}
