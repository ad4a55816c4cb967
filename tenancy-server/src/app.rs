use std::sync::Arc;

use anyhow::Result;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tenancy_axum::{tenancy_app, TenancyApp};
use tenancy_core::{
    AppConfig, CollectionConfig, DocumentStore, GlobalConfig, MemoryStore, Tenancy, TenancyConfig,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::identity::identify;
use crate::seed::seed;

pub const ENV_PREFIX: &str = "TENANCY__";

/// The demo collections and globals.
pub fn collections() -> AppConfig {
    AppConfig::new()
        .collection(CollectionConfig::new("tenants"))
        .collection(CollectionConfig::new("users").auth())
        .collection(CollectionConfig::new("posts"))
        .collection(CollectionConfig::new("media").upload("/media"))
        .collection(CollectionConfig::new("categories"))
        .global(GlobalConfig::new("header").with_versions())
}

fn with_defaults(mut config: TenancyConfig) -> TenancyConfig {
    for (key, value) in [
        ("http.host", "127.0.0.1"),
        ("http.port", "3030"),
        ("shared.collections", "categories"),
        ("server.url", "http://localhost:3030"),
    ] {
        if !config.has(key) {
            config.set(key, value);
        }
    }
    config
}

pub struct Server {
    pub config: TenancyConfig,
    pub store: Arc<MemoryStore>,
    pub app: TenancyApp,
}

impl Server {
    pub fn addr(&self) -> String {
        let host = self.config.get("http.host").unwrap_or("127.0.0.1");
        let port = self.config.get("http.port").unwrap_or("3030");
        format!("{host}:{port}")
    }

    /// `/health` answers ahead of tenant binding; everything else goes
    /// through the tenancy router.
    pub fn into_router(self) -> Result<Router> {
        Ok(Router::new()
            .route("/health", get(|| async { "ok" }))
            .fallback_service(self.app.into_router()?))
    }

    pub async fn listen(self) -> Result<()> {
        let addr = self.addr();
        let strategy = self.app.tenancy.options().isolation_strategy;
        let router = self.into_router()?;
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %listener.local_addr()?, %strategy, "listening");
        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// Build from `TENANCY__*` environment variables.
pub async fn build() -> Result<Server> {
    build_with(TenancyConfig::from_env(ENV_PREFIX)).await
}

pub async fn build_with(config: TenancyConfig) -> Result<Server> {
    let config = with_defaults(config);
    let options = config.options()?;

    let store = Arc::new(MemoryStore::new());
    seed(&store).await?;

    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    let tenancy = Tenancy::configure(options, collections(), Arc::clone(&dyn_store))?;
    for slug in tenancy.versioned_collections() {
        store.enable_versions(slug);
    }

    let mut app = tenancy_app(tenancy).use_collections();
    app.router = app.router.layer(from_fn_with_state(dyn_store, identify));
    if app.install_tenant_binding() {
        info!("tenant binding installed");
    }

    Ok(Server { config, store, app })
}
