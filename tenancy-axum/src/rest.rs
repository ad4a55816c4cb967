use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    routing, Json, Router,
};
use serde_json::{json, Value};
use tenancy_core::errors::TenancyError;
use tenancy_core::{CollectionConfig, Document, FindArgs, Tenancy, Where};

use crate::{TenancyAxumError, TenancyParams};

pub(crate) fn map_json_rejection(rejection: JsonRejection) -> TenancyAxumError {
    TenancyError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
        .into_anyhow()
        .into()
}

pub(crate) fn document(body: Value) -> Result<Document, TenancyAxumError> {
    match body {
        Value::Object(doc) => Ok(doc),
        _ => Err(TenancyError::bad_request("Expected a JSON object").into_anyhow().into()),
    }
}

/// Visible collection by slug; hidden ones (per-tenant global rows) are not routable.
fn routable<'a>(tenancy: &'a Tenancy, collection: &str) -> Result<&'a CollectionConfig, TenancyAxumError> {
    match tenancy.collection(collection) {
        Some(c) if !c.hidden => Ok(c),
        _ => Err(TenancyError::not_found(format!("Unknown collection '{collection}'"))
            .into_anyhow()
            .into()),
    }
}

/// `limit`, `page` and `depth` from the query string; everything else is an
/// equality filter.
fn find_args(params: &TenancyParams) -> FindArgs {
    let mut filter = Where::All;
    let mut args = FindArgs::all();
    for (key, value) in &params.query {
        let number = value.parse::<usize>().ok();
        match (key.as_str(), number) {
            ("limit", Some(n)) => args = args.limit(n),
            ("page", Some(n)) => args = args.page(n),
            ("depth", Some(n)) => args = args.depth(n),
            ("sort", _) => args = args.sort(value.clone()),
            ("limit" | "page" | "depth" | "draft", _) => {}
            _ => {
                let condition = Where::equals(key.clone(), value.clone());
                filter = match filter {
                    Where::All => condition,
                    other => other.and(condition),
                };
            }
        }
    }
    FindArgs { filter, ..args }
}

/// `/{collection}` and `/{collection}/{id}` over the scoped operations of [`Tenancy`].
pub fn collection_router(tenancy: Arc<Tenancy>) -> Router {
    Router::new()
        .route(
            "/{collection}",
            routing::get(
                |State(tenancy): State<Arc<Tenancy>>,
                 Path(collection): Path<String>,
                 params: TenancyParams| async move {
                    routable(&tenancy, &collection)?;
                    let ctx = params.context(Value::Null);
                    let res = tenancy.find(&collection, &ctx, find_args(&params)).await?;
                    Ok::<_, TenancyAxumError>(Json(res))
                },
            )
            .post(
                |State(tenancy): State<Arc<Tenancy>>,
                 Path(collection): Path<String>,
                 params: TenancyParams,
                 data: Result<Json<Value>, JsonRejection>| async move {
                    routable(&tenancy, &collection)?;
                    let Json(body) = data.map_err(map_json_rejection)?;
                    let doc = document(body.clone())?;
                    let ctx = params.context(body);
                    let res = tenancy.create(&collection, &ctx, doc).await?;
                    Ok::<_, TenancyAxumError>(Json(res))
                },
            ),
        )
        .route(
            "/{collection}/{id}",
            routing::get(
                |State(tenancy): State<Arc<Tenancy>>,
                 Path((collection, id)): Path<(String, String)>,
                 params: TenancyParams| async move {
                    routable(&tenancy, &collection)?;
                    let ctx = params.context(Value::Null);
                    let res = tenancy
                        .find_by_id(&collection, &ctx, &id)
                        .await?
                        .ok_or_else(|| {
                            TenancyError::not_found(format!("No record found for id '{id}'")).into_anyhow()
                        })?;
                    Ok::<_, TenancyAxumError>(Json(res))
                },
            )
            .patch(
                |State(tenancy): State<Arc<Tenancy>>,
                 Path((collection, id)): Path<(String, String)>,
                 params: TenancyParams,
                 data: Result<Json<Value>, JsonRejection>| async move {
                    routable(&tenancy, &collection)?;
                    let Json(body) = data.map_err(map_json_rejection)?;
                    let doc = document(body.clone())?;
                    let ctx = params.context(body);
                    let res = tenancy.update(&collection, &ctx, &id, doc).await?;
                    Ok::<_, TenancyAxumError>(Json(res))
                },
            )
            .delete(
                |State(tenancy): State<Arc<Tenancy>>,
                 Path((collection, id)): Path<(String, String)>,
                 params: TenancyParams| async move {
                    routable(&tenancy, &collection)?;
                    let ctx = params.context(Value::Null);
                    let res = tenancy.delete(&collection, &ctx, &id).await?;
                    Ok::<_, TenancyAxumError>(Json(res))
                },
            ),
        )
        .with_state(tenancy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_becomes_filter_and_paging() {
        let mut params = TenancyParams::default();
        params.query.insert("limit".into(), "5".into());
        params.query.insert("status".into(), "published".into());
        params.query.insert("draft".into(), "1".into());

        let args = find_args(&params);
        assert_eq!(args.limit, Some(5));
        assert_eq!(args.filter, Where::equals("status", "published"));
    }
}
