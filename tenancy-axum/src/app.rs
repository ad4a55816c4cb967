use std::sync::Arc;

use anyhow::Result;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tenancy_core::{IsolationStrategy, Tenancy};
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::binding::{domain_binding, path_binding, BindingState};
use crate::{graphql, rest, versions};

/// Stages installed in front of the router, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    TenantBinding,
}

pub struct TenancyApp {
    pub tenancy: Arc<Tenancy>,
    pub router: Router<()>,
    pipeline: Vec<PipelineStage>,
}

impl TenancyApp {
    /// A router serving every tenant-scoped global at `{api}/globals/{slug}`,
    /// plus `{api}/graphql` for reading them by type name.
    pub fn new(tenancy: Tenancy) -> Self {
        let tenancy = Arc::new(tenancy);
        let api = api_prefix(&tenancy);

        let mut router = Router::new();
        let mut slugs: Vec<String> = tenancy.global_slugs().map(String::from).collect();
        slugs.sort();
        for slug in &slugs {
            let path = format!("{api}/globals/{slug}");
            router = router.nest(&path, versions::global_router(Arc::clone(&tenancy), slug));
        }
        if !slugs.is_empty() {
            router = router.nest(&format!("{api}/graphql"), graphql::graphql_router(Arc::clone(&tenancy)));
        }

        Self {
            tenancy,
            router,
            pipeline: Vec::new(),
        }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    pub fn merge(mut self, router: Router<()>) -> Self {
        self.router = self.router.merge(router);
        self
    }

    /// Scoped REST routes for every visible collection under `{api}`.
    pub fn use_collections(mut self) -> Self {
        let api = api_prefix(&self.tenancy);
        let collections = rest::collection_router(Arc::clone(&self.tenancy));
        self.router = if api.is_empty() {
            self.router.merge(collections)
        } else {
            self.router.nest(&api, collections)
        };
        self
    }

    /// Put the binding middleware for the configured strategy in front of the
    /// router. Returns `false` when already installed or when the strategy
    /// binds nothing (user isolation).
    pub fn install_tenant_binding(&mut self) -> bool {
        if self.tenancy.options().isolation_strategy == IsolationStrategy::User {
            return false;
        }
        if self.pipeline.contains(&PipelineStage::TenantBinding) {
            return false;
        }
        self.pipeline.push(PipelineStage::TenantBinding);
        true
    }

    pub fn pipeline(&self) -> &[PipelineStage] {
        &self.pipeline
    }

    /// The finished router: pipeline stages, tracing and `x-request-id`.
    pub fn into_router(self) -> Result<Router<()>> {
        let mut router = self.router;

        for stage in self.pipeline.iter().rev() {
            match stage {
                PipelineStage::TenantBinding => {
                    let state = BindingState::new(
                        Arc::clone(self.tenancy.store()),
                        Arc::new(self.tenancy.options().clone()),
                    )?;
                    // The binding may rewrite the path, so it has to run before routing.
                    let inner = Router::new().fallback_service(router);
                    router = match self.tenancy.options().isolation_strategy {
                        IsolationStrategy::Path => inner.layer(from_fn_with_state(state, path_binding)),
                        IsolationStrategy::Domain => inner.layer(from_fn_with_state(state, domain_binding)),
                        IsolationStrategy::User => inner,
                    };
                }
            }
        }

        Ok(router
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid)))
    }

    pub async fn listen<A>(self, addr: A) -> Result<()>
    where
        A: ToSocketAddrs,
    {
        let strategy = self.tenancy.options().isolation_strategy;
        let router = self.into_router()?;
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, %strategy, "listening");
        axum::serve(listener, router).await?;
        Ok(())
    }
}

fn api_prefix(tenancy: &Tenancy) -> String {
    tenancy.options().api_route.trim_end_matches('/').to_string()
}

pub fn tenancy_app(tenancy: Tenancy) -> TenancyApp {
    TenancyApp::new(tenancy)
}
