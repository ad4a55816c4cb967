//! `POST {api}/graphql`: read-only queries over the tenant-scoped globals.
//!
//! Every top-level field named after a global's type resolves to the bound
//! tenant's row, honouring that field's `draft` argument. Other fields
//! resolve to null.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tenancy_core::errors::TenancyError;
use tenancy_core::globals::selected_query_fields;
use tenancy_core::{ApiKind, Tenancy};
use tracing::debug;

use crate::{TenancyAxumError, TenancyParams};

pub fn graphql_router(tenancy: Arc<Tenancy>) -> Router {
    Router::new().route("/", post(run_query)).with_state(tenancy)
}

async fn run_query(
    State(tenancy): State<Arc<Tenancy>>,
    params: TenancyParams,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TenancyAxumError> {
    let Json(body) = body.map_err(crate::rest::map_json_rejection)?;
    let Some(source) = body.get("query").and_then(Value::as_str) else {
        return Err(TenancyError::bad_request("A GraphQL query is required").into_anyhow().into());
    };
    let fields = selected_query_fields(source)?;
    let ctx = params.context(body.clone()).with_api(ApiKind::GraphQL);

    let mut data = Map::new();
    for field in fields {
        let slug = tenancy
            .global_slugs()
            .find(|slug| tenancy.global(slug).is_some_and(|g| g.type_name() == field))
            .map(String::from);
        let value = match slug {
            Some(slug) => Value::Object(tenancy.read_global(&slug, &ctx).await?),
            None => {
                debug!(%field, "no global for graphql field");
                Value::Null
            }
        };
        data.insert(field, value);
    }
    Ok(Json(json!({ "data": data })))
}
