//! Per-tenant globals.
//!
//! A global is a singleton configuration document. Scoped to tenants, each
//! global becomes a hidden collection (`<slug>Globals`) holding one row per
//! tenant, and reads and writes of the global are redirected to the row of
//! the tenant the request acts on.

mod draft;
mod registry;
mod virtualizer;

pub use draft::{requested_draft, selected_query_fields};
pub use registry::{pascal_case, GlobalNames, GlobalRegistry};
pub use virtualizer::{GlobalHooks, GlobalVirtualizer, VersionQuery};

/// A global as declared by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    pub slug: String,
    /// Drafts and version history enabled.
    pub versions: bool,
    /// Overrides the generated GraphQL type name.
    pub graphql_name: Option<String>,
}

impl GlobalConfig {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            versions: false,
            graphql_name: None,
        }
    }

    pub fn with_versions(mut self) -> Self {
        self.versions = true;
        self
    }

    pub fn with_graphql_name(mut self, name: impl Into<String>) -> Self {
        self.graphql_name = Some(name.into());
        self
    }

    pub fn collection_slug(&self) -> String {
        format!("{}Globals", self.slug)
    }
}
