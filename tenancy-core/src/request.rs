//! Per-request context handed to policies, hooks and the globals virtualizer.

use std::collections::HashMap;

use serde_json::Value;

use crate::tenant::{AuthUser, TenantId, TenantRef};

/// Which API surface the request came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiKind {
    #[default]
    Rest,
    GraphQL,
    /// In-process calls (seeding, jobs).
    Local,
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Tenant bound by the binding middleware. Distinct from the user's tenant.
    pub tenant: Option<TenantRef>,
    pub user: Option<AuthUser>,
    pub api: ApiKind,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local() -> Self {
        Self {
            api: ApiKind::Local,
            ..Self::default()
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantRef>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_user(mut self, user: AuthUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_api(mut self, api: ApiKind) -> Self {
        self.api = api;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Tenant bound to the request by the binding middleware.
    pub fn requested_tenant_id(&self) -> Option<TenantId> {
        self.tenant.as_ref().and_then(TenantRef::tenant_id)
    }

    /// Tenant of the authenticated user.
    pub fn user_tenant_id(&self) -> Option<TenantId> {
        self.user.as_ref().and_then(AuthUser::tenant_id)
    }

    /// The caller's own tenant: the user's, falling back to the request-bound one.
    pub fn caller_tenant_id(&self) -> Option<TenantId> {
        self.user_tenant_id().or_else(|| self.requested_tenant_id())
    }

    /// The tenant an operation acts on: the request-bound one, falling back to the user's.
    pub fn resolve_tenant_id(&self) -> Option<TenantId> {
        self.requested_tenant_id().or_else(|| self.user_tenant_id())
    }

    /// Look a value up in the query string first, then in the body.
    pub fn param_value(&self, key: &str) -> Option<String> {
        if let Some(v) = self.query.get(key) {
            return Some(v.clone());
        }
        match self.body.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::Tenant;

    fn tenant(id: &str) -> Tenant {
        Tenant {
            id: TenantId::new(id),
            slug: id.to_string(),
            parent: None,
            domains: vec![],
        }
    }

    #[test]
    fn request_tenant_wins_over_user_tenant_when_resolving() {
        let ctx = RequestContext::new()
            .with_tenant(tenant("bound"))
            .with_user(AuthUser::new("u1", "users").with_tenant(TenantId::new("own")));

        assert_eq!(ctx.resolve_tenant_id(), Some(TenantId::new("bound")));
        assert_eq!(ctx.caller_tenant_id(), Some(TenantId::new("own")));
    }

    #[test]
    fn bare_and_document_tenants_normalize_the_same() {
        let by_id = RequestContext::new().with_tenant(TenantId::new("t1"));
        let by_doc = RequestContext::new().with_tenant(tenant("t1"));
        assert_eq!(by_id.resolve_tenant_id(), by_doc.resolve_tenant_id());
    }

    #[test]
    fn empty_tenant_id_counts_as_absent() {
        let ctx = RequestContext::new().with_tenant(TenantId::new(""));
        assert_eq!(ctx.resolve_tenant_id(), None);
    }

    #[test]
    fn param_value_reads_query_then_body() {
        let ctx = RequestContext::new()
            .with_query("page", "3")
            .with_body(serde_json::json!({ "page": 9, "limit": 4 }));
        assert_eq!(ctx.param_value("page").as_deref(), Some("3"));
        assert_eq!(ctx.param_value("limit").as_deref(), Some("4"));
        assert_eq!(ctx.param_value("depth"), None);
    }
}
