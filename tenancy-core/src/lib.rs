//! tenancy-core: row-level multi-tenancy over a document store.
//!
//! - [`authorized`] walks the tenant tree into an authorized tenant set
//! - [`access`] and [`policies`] narrow every collection's access rules to it
//! - [`globals`] turns singleton globals into one row per tenant
//! - [`lifecycle`] cascades tenant creation and deletion
//! - [`plugin`] wires all of it onto an application's collections

pub mod access;
pub mod authorized;
pub mod config;
pub mod errors;
pub mod globals;
pub mod hooks;
pub mod lifecycle;
pub mod memory;
pub mod plugin;
pub mod policies;
pub mod query;
pub mod request;
pub mod store;
pub mod tenant;
pub mod upload;
pub mod validation;

pub use access::{access_fn, fixed, limit_access, AccessResult, AccessRule, SharedRule};
pub use config::{IsolationStrategy, TenancyConfig, TenancyOptions};
pub use errors::{ErrorKind, TenancyError, TenancyResult};
pub use globals::{GlobalConfig, GlobalRegistry, GlobalVirtualizer, VersionQuery};
pub use hooks::{ChangeOperation, CollectionHook, CollectionHooks, HookContext, HookStage};
pub use memory::{MemoryStore, StoreCall, StoreOp};
pub use plugin::{AppConfig, CollectionConfig, CollectionKind, Tenancy};
pub use policies::{Operation, Scope};
pub use query::{Condition, FindArgs, PaginatedDocs, Where};
pub use request::{ApiKind, RequestContext};
pub use store::{Document, DocumentStore};
pub use tenant::{AuthUser, Tenant, TenantId, TenantRef};
