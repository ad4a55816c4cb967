//! Routes of one tenant-scoped global, nested at `{api}/globals/{slug}`.
//!
//! - `GET /` and `POST /` read and write the caller's row
//! - `GET /versions/` lists the tenant's versions
//! - `GET /versions/{id}` fetches one version, `POST /versions/{id}` restores it

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tenancy_core::errors::TenancyError;
use tenancy_core::{GlobalVirtualizer, Tenancy};

use crate::{TenancyAxumError, TenancyParams};

#[derive(Clone)]
pub struct GlobalState {
    tenancy: Arc<Tenancy>,
    slug: Arc<str>,
}

/// Failures of the version routes, answered as `{"error": ...}`.
#[derive(Debug)]
pub enum VersionError {
    MissingId,
    NotFound,
    Failed { op: &'static str, source: anyhow::Error },
}

impl VersionError {
    fn failed(op: &'static str) -> impl FnOnce(anyhow::Error) -> VersionError {
        move |source| VersionError::Failed { op, source }
    }
}

impl IntoResponse for VersionError {
    fn into_response(self) -> Response {
        match self {
            VersionError::MissingId => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Version ID is required" })),
            )
                .into_response(),
            VersionError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "Version not found" }))).into_response()
            }
            VersionError::Failed { op, source } => {
                tracing::error!(error = %source, "failed to {op}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": format!("Failed to {op}"), "message": source.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

pub fn global_router(tenancy: Arc<Tenancy>, slug: &str) -> Router {
    let state = GlobalState {
        tenancy,
        slug: Arc::from(slug),
    };

    Router::new()
        .route("/", get(read_global).post(write_global))
        .route("/versions", get(list_versions))
        .route("/versions/", get(list_versions))
        .route("/versions/{id}", get(version_by_id).post(restore_version))
        .with_state(state)
}

fn virtualizer(state: &GlobalState, op: &'static str) -> Result<Arc<GlobalVirtualizer>, VersionError> {
    state.tenancy.global(&state.slug).ok_or_else(|| VersionError::Failed {
        op,
        source: TenancyError::not_found(format!("Unknown global '{}'", state.slug)).into_anyhow(),
    })
}

fn version_id(id: &str) -> Result<&str, VersionError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(VersionError::MissingId);
    }
    Ok(id)
}

async fn read_global(
    State(state): State<GlobalState>,
    params: TenancyParams,
) -> Result<Json<Value>, TenancyAxumError> {
    let ctx = params.context(Value::Null);
    let doc = state.tenancy.read_global(&state.slug, &ctx).await?;
    Ok(Json(Value::Object(doc)))
}

async fn write_global(
    State(state): State<GlobalState>,
    params: TenancyParams,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TenancyAxumError> {
    let Json(body) = body.map_err(crate::rest::map_json_rejection)?;
    let data = crate::rest::document(body.clone())?;
    let ctx = params.context(body);
    let doc = state.tenancy.update_global(&state.slug, &ctx, data).await?;
    Ok(Json(Value::Object(doc)))
}

async fn list_versions(
    State(state): State<GlobalState>,
    params: TenancyParams,
) -> Result<Json<Value>, VersionError> {
    const OP: &str = "fetch versions";
    let global = virtualizer(&state, OP)?;
    // `draft` is accepted but every version of the tenant is listed.
    let ctx = params.context(Value::Null);
    let page = global.versions(&ctx).await.map_err(VersionError::failed(OP))?;
    let body = serde_json::to_value(page).map_err(|e| VersionError::Failed {
        op: OP,
        source: e.into(),
    })?;
    Ok(Json(body))
}

async fn version_by_id(
    State(state): State<GlobalState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, VersionError> {
    const OP: &str = "fetch version";
    let id = version_id(&id)?;
    let global = virtualizer(&state, OP)?;
    match global.version_by_id(id).await.map_err(VersionError::failed(OP))? {
        Some(version) => Ok(Json(Value::Object(version))),
        None => Err(VersionError::NotFound),
    }
}

async fn restore_version(
    State(state): State<GlobalState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, VersionError> {
    const OP: &str = "restore version";
    let id = version_id(&id)?;
    let global = virtualizer(&state, OP)?;
    match global
        .restore_version(id)
        .await
        .map_err(VersionError::failed(OP))?
    {
        Some(doc) => Ok(Json(Value::Object(doc))),
        None => Err(VersionError::NotFound),
    }
}
