use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tenancy_axum::tenancy_app;
use tenancy_core::{
    AppConfig, AuthUser, CollectionConfig, Document, DocumentStore, GlobalConfig, IsolationStrategy, MemoryStore,
    Tenancy, TenancyOptions, TenantId,
};
use tower::ServiceExt;

fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap_or_default()
}

/// root -> child, plus an unrelated tenant; one post in each.
async fn setup() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for (id, parent) in [("root", None), ("child", Some("root")), ("other", None)] {
        store
            .create("tenants", doc(json!({ "id": id, "slug": id, "parent": parent })))
            .await
            .unwrap();
        store
            .create("posts", doc(json!({ "id": format!("post-{id}"), "title": id, "tenant": id })))
            .await
            .unwrap();
    }

    let config = AppConfig::new()
        .collection(CollectionConfig::new("tenants"))
        .collection(CollectionConfig::new("users").auth())
        .collection(CollectionConfig::new("posts"))
        .global(GlobalConfig::new("header"));
    let tenancy = Tenancy::configure(TenancyOptions::new(IsolationStrategy::Path), config, store.clone()).unwrap();

    let mut app = tenancy_app(tenancy).use_collections();
    app.install_tenant_binding();
    (app.into_router().unwrap(), store)
}

fn root_user() -> AuthUser {
    AuthUser::new("u1", "users").with_tenant(TenantId::new("root"))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .extension(root_user())
        .header("content-type", "application/json");
    let req = req
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn titles(body: &Value) -> Vec<String> {
    body["docs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn listing_is_scoped_to_the_bound_subtree() {
    let (router, _) = setup().await;

    let (status, body) = send(&router, "GET", "/root/api/posts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["root", "child"]);

    let (_, body) = send(&router, "GET", "/child/api/posts", None).await;
    assert_eq!(titles(&body), vec!["child"]);

    let (_, body) = send(&router, "GET", "/other/api/posts", None).await;
    assert!(titles(&body).is_empty());
}

#[tokio::test]
async fn query_parameters_filter_the_listing() {
    let (router, _) = setup().await;

    let (_, body) = send(&router, "GET", "/root/api/posts?title=child", None).await;
    assert_eq!(titles(&body), vec!["child"]);
}

#[tokio::test]
async fn rows_outside_the_subtree_are_not_found() {
    let (router, _) = setup().await;

    let (status, _) = send(&router, "GET", "/child/api/posts/post-child", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, "GET", "/child/api/posts/post-root", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["name"], "NotFound");
}

#[tokio::test]
async fn created_rows_are_stamped_with_the_bound_tenant() {
    let (router, store) = setup().await;

    let (status, body) = send(&router, "POST", "/child/api/posts", Some(json!({ "title": "new", "tenant": "other" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"], "child");
    assert_eq!(store.rows("posts").len(), 4);
}

#[tokio::test]
async fn foreign_updates_and_deletes_are_forbidden() {
    let (router, store) = setup().await;

    let (status, body) = send(&router, "PATCH", "/child/api/posts/post-root", Some(json!({ "title": "x" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["name"], "Forbidden");

    let (status, _) = send(&router, "DELETE", "/child/api/posts/post-root", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(store.rows("posts").len(), 3);

    let (status, _) = send(&router, "DELETE", "/root/api/posts/post-child", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.rows("posts").len(), 2);
}

#[tokio::test]
async fn hidden_and_unknown_collections_are_not_routable() {
    let (router, _) = setup().await;

    let (status, _) = send(&router, "GET", "/root/api/headerGlobals", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, "GET", "/root/api/ghosts", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn globals_and_collections_share_the_api_prefix() {
    let (router, _) = setup().await;

    let (status, body) = send(&router, "GET", "/root/api/globals/header", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"], "root");
}

#[tokio::test]
async fn oversized_paging_yields_an_empty_page() {
    let (router, _) = setup().await;

    let uri = format!("/root/api/posts?page={max}&limit={max}", max = usize::MAX);
    let (status, body) = send(&router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(titles(&body).is_empty());
}
