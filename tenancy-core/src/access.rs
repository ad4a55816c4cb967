//! Access results and the condition composer every policy is built on.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::query::Where;
use crate::request::RequestContext;

/// Outcome of an access rule: a plain decision or a filter the store applies.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessResult {
    Allow(bool),
    Where(Where),
}

impl AccessResult {
    pub const DENY: AccessResult = AccessResult::Allow(false);
    pub const ALLOW: AccessResult = AccessResult::Allow(true);

    pub fn is_denied(&self) -> bool {
        matches!(self, AccessResult::Allow(false))
    }

    /// JSON shape handed to the document store: `true`, `false` or a where object.
    pub fn to_value(&self) -> Value {
        match self {
            AccessResult::Allow(b) => Value::Bool(*b),
            AccessResult::Where(w) => w.to_value(),
        }
    }
}

impl From<bool> for AccessResult {
    fn from(b: bool) -> Self {
        AccessResult::Allow(b)
    }
}

impl From<Where> for AccessResult {
    fn from(w: Where) -> Self {
        AccessResult::Where(w)
    }
}

/// Layer `condition` on top of an existing access result.
///
/// - `false` stays `false`
/// - `true` becomes `condition`
/// - any filter (including the empty one) becomes `and[original, condition]`
pub fn limit_access(original: AccessResult, condition: Where) -> AccessResult {
    match original {
        AccessResult::Allow(false) => AccessResult::Allow(false),
        AccessResult::Allow(true) => AccessResult::Where(condition),
        AccessResult::Where(existing) => AccessResult::Where(Where::And(vec![existing, condition])),
    }
}

/// An access rule evaluated per request.
#[async_trait]
pub trait AccessRule: Send + Sync {
    async fn evaluate(&self, ctx: &RequestContext) -> Result<AccessResult>;
}

pub type SharedRule = Arc<dyn AccessRule>;

type RuleFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessResult>> + Send + 'a>>;

struct FnRule<F>(F);

#[async_trait]
impl<F> AccessRule for FnRule<F>
where
    F: for<'a> Fn(&'a RequestContext) -> RuleFuture<'a> + Send + Sync,
{
    async fn evaluate(&self, ctx: &RequestContext) -> Result<AccessResult> {
        (self.0)(ctx).await
    }
}

/// Build a rule from a closure returning a boxed future.
///
/// ```rust
/// use tenancy_core::access::{access_fn, AccessResult};
///
/// let rule = access_fn(|ctx| Box::pin(async move { Ok::<_, anyhow::Error>(AccessResult::Allow(ctx.user.is_some())) }));
/// # let _ = rule;
/// ```
pub fn access_fn<F>(f: F) -> SharedRule
where
    F: for<'a> Fn(&'a RequestContext) -> RuleFuture<'a> + Send + Sync + 'static,
{
    Arc::new(FnRule(f))
}

/// A rule that always returns the same result.
pub struct Fixed(pub AccessResult);

#[async_trait]
impl AccessRule for Fixed {
    async fn evaluate(&self, _ctx: &RequestContext) -> Result<AccessResult> {
        Ok(self.0.clone())
    }
}

pub fn fixed(result: impl Into<AccessResult>) -> SharedRule {
    Arc::new(Fixed(result.into()))
}
