//! Authorized tenant set: a tenant plus every tenant below it.
//!
//! The tree lives in the document store, so the walk is a sequence of
//! dependent `find` calls, one per level, over the current frontier.

use std::collections::HashSet;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TenancyOptions;
use crate::query::{FindArgs, Where};
use crate::store::DocumentStore;
use crate::tenant::{id_of, TenantId};

/// `[tenant, ...descendants]` in breadth-first order.
///
/// An absent or empty id yields an empty set. Ids already collected are
/// dropped from later frontiers, and the walk stops after
/// `options.max_tree_depth` levels.
pub async fn resolve(
    store: &dyn DocumentStore,
    options: &TenancyOptions,
    tenant: Option<&TenantId>,
) -> Result<Vec<TenantId>> {
    let Some(root) = tenant.filter(|t| !t.is_empty()) else {
        return Ok(Vec::new());
    };

    let mut authorized = vec![root.clone()];
    let mut seen: HashSet<TenantId> = HashSet::from([root.clone()]);
    let mut frontier = vec![root.clone()];
    let mut level = 0;

    while !frontier.is_empty() {
        if level == options.max_tree_depth {
            warn!(
                tenant = %root,
                depth = level,
                "tenant tree deeper than max_tree_depth, authorized set truncated"
            );
            break;
        }
        level += 1;

        let filter = match frontier.as_slice() {
            [single] => Where::equals("parent", single.as_str()),
            many => Where::any_of("parent", many.iter().map(|t| t.as_str())),
        };
        let children = store
            .find(
                &options.tenant_collection,
                FindArgs::new(filter).depth(0).without_pagination(),
            )
            .await?;

        frontier = children
            .docs
            .iter()
            .filter_map(|doc| doc.get("id").and_then(id_of))
            .map(TenantId)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        authorized.extend(frontier.iter().cloned());
    }

    debug!(tenant = %root, count = authorized.len(), levels = level, "resolved authorized tenants");
    Ok(authorized)
}

/// `resolve` followed by a membership test.
pub async fn contains(
    store: &dyn DocumentStore,
    options: &TenancyOptions,
    root: Option<&TenantId>,
    candidate: &TenantId,
) -> Result<bool> {
    Ok(resolve(store, options, root).await?.contains(candidate))
}

/// Ids as JSON strings, ready for an `in` condition.
pub fn as_values(ids: &[TenantId]) -> Vec<Value> {
    ids.iter().map(|t| Value::String(t.0.clone())).collect()
}
