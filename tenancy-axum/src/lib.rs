//! tenancy-axum: Axum adapter for tenancy-core.
//!
//! Binds each request to a tenant (by path prefix or host), serves the
//! per-tenant global routes and a GraphQL read endpoint for them, and exposes
//! tenant-scoped REST handlers for collections.

pub mod app;
pub mod binding;
pub mod graphql;
pub mod params;
pub mod rest;
pub mod versions;
mod error;
pub use error::TenancyAxumError;

pub use app::{tenancy_app, PipelineStage, TenancyApp};
pub use binding::{BindingState, BoundTenant};
pub use params::TenancyParams;
