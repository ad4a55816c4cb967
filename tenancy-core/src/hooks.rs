use std::sync::Arc;

use anyhow::Result;

use crate::request::RequestContext;
use crate::store::Document;

/// When in a collection operation a hook is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeRead,
    AfterRead,
    BeforeChange,
    AfterChange,
    BeforeDelete,
    BeforeLogin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Create,
    Update,
}

/// Context passed to hooks.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub request: RequestContext,
    pub collection: String,
    pub operation: Option<ChangeOperation>,
    /// Target row id (update, delete).
    pub id: Option<String>,
    /// Incoming payload (before change).
    pub data: Option<Document>,
    /// Resulting or stored row (after change, after read, before read).
    pub doc: Option<Document>,
    /// Row as it was before an update.
    pub original_doc: Option<Document>,
}

impl HookContext {
    pub fn new(request: RequestContext, collection: impl Into<String>) -> Self {
        Self {
            request,
            collection: collection.into(),
            operation: None,
            id: None,
            data: None,
            doc: None,
            original_doc: None,
        }
    }

    pub fn with_operation(mut self, operation: ChangeOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Document) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_doc(mut self, doc: Document) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn with_original_doc(mut self, doc: Document) -> Self {
        self.original_doc = Some(doc);
        self
    }
}

/// A hook attached to a collection.
#[async_trait::async_trait]
pub trait CollectionHook: Send + Sync {
    async fn run(&self, stage: HookStage, ctx: &mut HookContext) -> Result<()>;
}

pub type SharedHook = Arc<dyn CollectionHook>;

/// Hooks of one collection, run in registration order per stage.
#[derive(Clone, Default)]
pub struct CollectionHooks {
    entries: Vec<(HookStage, SharedHook)>,
}

impl CollectionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: HookStage, hook: SharedHook) {
        self.entries.push((stage, hook));
    }

    pub fn count(&self, stage: HookStage) -> usize {
        self.entries.iter().filter(|(s, _)| *s == stage).count()
    }

    /// Run every hook of `stage`, stopping at the first failure.
    pub async fn run(&self, stage: HookStage, ctx: &mut HookContext) -> Result<()> {
        for (s, hook) in &self.entries {
            if *s == stage {
                hook.run(stage, ctx).await?;
            }
        }
        Ok(())
    }
}
