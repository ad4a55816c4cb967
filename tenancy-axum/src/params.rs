use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde_json::Value;
use tenancy_core::{ApiKind, AuthUser, RequestContext, Tenant};

use crate::binding::BoundTenant;

/// Everything handlers need from a request to build a [`RequestContext`].
///
/// The tenant comes from the binding middleware and the user from whatever
/// authentication layer runs upstream (an [`AuthUser`] extension).
#[derive(Debug, Clone, Default)]
pub struct TenancyParams {
    pub tenant: Option<Tenant>,
    pub user: Option<AuthUser>,
    pub query: HashMap<String, String>,
}

impl TenancyParams {
    pub fn from_parts(parts: &Parts) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        Self {
            tenant: parts.extensions.get::<BoundTenant>().map(|b| b.0.clone()),
            user: parts.extensions.get::<AuthUser>().cloned(),
            query,
        }
    }

    /// A REST context; the GraphQL route switches the kind itself.
    pub fn context(&self, body: Value) -> RequestContext {
        let mut ctx = RequestContext::new().with_api(ApiKind::Rest).with_body(body);
        ctx.query = self.query.clone();
        if let Some(tenant) = &self.tenant {
            ctx = ctx.with_tenant(tenant.clone());
        }
        if let Some(user) = &self.user {
            ctx = ctx.with_user(user.clone());
        }
        ctx
    }
}

impl<S> FromRequestParts<S> for TenancyParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
