//! Tenant-binding middleware.
//!
//! Path isolation consumes a leading `/{tenantSlug}` from the URL; domain
//! isolation matches the `Host` header against each tenant's domains. Either
//! the request leaves with a [`BoundTenant`] extension or it is answered with
//! an empty 404.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::HOST, uri::PathAndQuery, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde_json::Value;
use tenancy_core::{Document, DocumentStore, FindArgs, Tenant, TenancyOptions, Where};
use tracing::debug;

use crate::TenancyAxumError;

/// The tenant a request was bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTenant(pub Tenant);

#[derive(Clone)]
pub struct BindingState {
    store: Arc<dyn DocumentStore>,
    options: Arc<TenancyOptions>,
    admin_assets: Regex,
}

impl BindingState {
    pub fn new(store: Arc<dyn DocumentStore>, options: Arc<TenancyOptions>) -> Result<Self> {
        let admin = regex::escape(&options.admin_route);
        let admin_assets = Regex::new(&format!(r"^{admin}(/@|.*\.[^/]+$)"))?;
        Ok(Self {
            store,
            options,
            admin_assets,
        })
    }

    pub fn options(&self) -> &TenancyOptions {
        &self.options
    }

    fn is_admin_asset(&self, path: &str) -> bool {
        self.admin_assets.is_match(path)
    }

    fn is_admin(&self, path: &str) -> bool {
        let admin = self.options.admin_route.as_str();
        path == admin || path.strip_prefix(admin).is_some_and(|rest| rest.starts_with('/'))
    }

    async fn find_tenants(&self, filter: Where, limit: usize) -> Result<Vec<Document>> {
        let page = self
            .store
            .find(
                &self.options.tenant_collection,
                FindArgs::new(filter).depth(0).limit(limit).without_pagination(),
            )
            .await?;
        Ok(page.docs)
    }
}

/// A slug candidate: the decoded slug and the raw prefix it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub slug: String,
    pub prefix: String,
}

/// Slug candidates of `path`, longest first: the first two segments joined
/// by `/`, then the first segment alone.
///
/// `None` when the first segment is empty or a segment is not valid
/// percent-encoded UTF-8.
pub fn slug_candidates(path: &str) -> Option<Vec<Candidate>> {
    let mut segments = path.strip_prefix('/').unwrap_or(path).split('/');
    let first = segments.next().filter(|s| !s.is_empty())?;
    let first_slug = urlencoding::decode(first).ok()?.into_owned();
    let one = Candidate {
        slug: first_slug.clone(),
        prefix: format!("/{first}"),
    };

    match segments.next().filter(|s| !s.is_empty()) {
        Some(second) => {
            let second_slug = urlencoding::decode(second).ok()?;
            let two = Candidate {
                slug: format!("{first_slug}/{second_slug}"),
                prefix: format!("/{first}/{second}"),
            };
            Some(vec![two, one])
        }
        None => Some(vec![one]),
    }
}

/// `uri` with `prefix` removed from its path; the query string is kept.
fn strip_prefix(uri: &Uri, prefix: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix(prefix)?;
    let rest = if rest.is_empty() { "/" } else { rest };
    let path_and_query = match uri.query() {
        Some(q) => format!("{rest}?{q}"),
        None => rest.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Body::empty()).into_response()
}

fn slug_of(doc: &Document) -> Option<&str> {
    doc.get("slug").and_then(Value::as_str)
}

pub async fn path_binding(State(state): State<BindingState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if state.is_admin_asset(&path) {
        return next.run(req).await;
    }
    if state.is_admin(&path) {
        debug!(%path, "admin path is not served under path isolation");
        return not_found();
    }

    let Some(candidates) = slug_candidates(&path) else {
        return not_found();
    };
    let filter = match candidates.as_slice() {
        [one] => Where::equals("slug", one.slug.as_str()),
        many => Where::any_of("slug", many.iter().map(|c| c.slug.as_str())),
    };

    let docs = match state.find_tenants(filter, candidates.len()).await {
        Ok(docs) => docs,
        Err(err) => return TenancyAxumError(err).into_response(),
    };

    // Candidates are ordered longest first.
    let matched = candidates.iter().find_map(|c| {
        docs.iter()
            .find(|d| slug_of(d) == Some(c.slug.as_str()))
            .and_then(Tenant::from_document)
            .map(|tenant| (c, tenant))
    });
    let Some((candidate, tenant)) = matched else {
        debug!(%path, "no tenant for path");
        return not_found();
    };

    let Some(uri) = strip_prefix(req.uri(), &candidate.prefix) else {
        return not_found();
    };
    debug!(tenant = %tenant.id, from = %path, to = %uri.path(), "bound tenant by path");
    *req.uri_mut() = uri;
    req.extensions_mut().insert(BoundTenant(tenant));
    next.run(req).await
}

/// Hostname without its port: the `Host` header, then the URI authority.
pub fn request_host(req: &Request) -> Option<String> {
    let raw = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| req.uri().host().map(String::from))?;

    let host = if raw.starts_with('[') {
        match raw.find(']') {
            Some(end) => raw[..=end].to_string(),
            None => raw,
        }
    } else {
        raw.split(':').next().unwrap_or_default().to_string()
    };
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

pub async fn domain_binding(State(state): State<BindingState>, mut req: Request, next: Next) -> Response {
    let Some(host) = request_host(&req) else {
        return not_found();
    };

    let docs = match state
        .find_tenants(Where::equals("domains.domain", host.as_str()), 1)
        .await
    {
        Ok(docs) => docs,
        Err(err) => return TenancyAxumError(err).into_response(),
    };
    let Some(tenant) = docs.first().and_then(Tenant::from_document) else {
        debug!(%host, "no tenant for host");
        return not_found();
    };

    debug!(tenant = %tenant.id, %host, "bound tenant by domain");
    req.extensions_mut().insert(BoundTenant(tenant));
    next.run(req).await
}
