//! Tenant and user shapes as the core sees them.
//!
//! Requests may carry a tenant either as a bare id or as a full document,
//! on the request itself or on the authenticated user. [`TenantRef`] holds
//! both forms and always normalizes to a [`TenantId`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Document;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A row of the tenant collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    #[serde(default)]
    pub parent: Option<TenantId>,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Tenant {
    /// Read a tenant out of a stored document.
    ///
    /// `parent` may be stored as an id or as a populated tenant document and
    /// `domains` as `[{ "domain": "..." }]` rows.
    pub fn from_document(doc: &Document) -> Option<Tenant> {
        let id = doc.get("id").and_then(id_of)?;
        let slug = doc
            .get("slug")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let parent = doc.get("parent").and_then(id_of).map(TenantId);
        let domains = doc
            .get("domains")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("domain").and_then(Value::as_str).map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Some(Tenant {
            id: TenantId(id),
            slug,
            parent,
            domains,
        })
    }
}

/// A tenant reference in either of the shapes requests carry.
#[derive(Debug, Clone, PartialEq)]
pub enum TenantRef {
    Id(TenantId),
    Doc(Tenant),
}

impl TenantRef {
    pub fn id(&self) -> &TenantId {
        match self {
            TenantRef::Id(id) => id,
            TenantRef::Doc(t) => &t.id,
        }
    }

    /// Normalized id, `None` when the reference is an empty string.
    pub fn tenant_id(&self) -> Option<TenantId> {
        let id = self.id();
        (!id.is_empty()).then(|| id.clone())
    }

    /// Accept either a bare id string or a document with an `id` field.
    pub fn from_value(value: &Value) -> Option<TenantRef> {
        match value {
            Value::String(s) => Some(TenantRef::Id(TenantId(s.clone()))),
            Value::Object(o) => Tenant::from_document(o).map(TenantRef::Doc),
            _ => None,
        }
    }
}

impl From<Tenant> for TenantRef {
    fn from(t: Tenant) -> Self {
        TenantRef::Doc(t)
    }
}

impl From<TenantId> for TenantRef {
    fn from(id: TenantId) -> Self {
        TenantRef::Id(id)
    }
}

/// The authenticated user, as supplied by whatever authentication runs upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    /// Slug of the auth collection this user belongs to.
    pub collection: String,
    pub tenant: Option<TenantRef>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            tenant: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantRef>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant.as_ref().and_then(TenantRef::tenant_id)
    }
}

/// Relationship values are stored as ids or as populated documents.
pub(crate) fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(o) => o.get("id").and_then(id_of),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn domains_are_read_from_rows_only() {
        let doc = json!({
            "id": "t1",
            "slug": "acme",
            "domains": [{ "domain": "acme.example" }, "bare.example", { "other": 1 }]
        });
        let tenant = Tenant::from_document(doc.as_object().unwrap()).unwrap();
        assert_eq!(tenant.domains, vec!["acme.example".to_string()]);
    }
}
