use std::sync::Arc;

use serde_json::{json, Value};
use tenancy_core::{
    AccessResult, AppConfig, AuthUser, CollectionConfig, CollectionKind, Document, DocumentStore, FindArgs,
    GlobalConfig, HookStage, IsolationStrategy, MemoryStore, Operation, RequestContext, StoreOp, Tenancy,
    TenancyError, TenancyOptions, TenantId,
};

fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap_or_default()
}

fn app_config() -> AppConfig {
    AppConfig::new()
        .collection(CollectionConfig::new("tenants"))
        .collection(CollectionConfig::new("users").auth())
        .collection(CollectionConfig::new("posts"))
        .collection(CollectionConfig::new("media").upload("/media"))
        .collection(CollectionConfig::new("categories"))
        .global(GlobalConfig::new("header").with_versions())
        .global(GlobalConfig::new("site-settings"))
}

fn options(strategy: IsolationStrategy) -> TenancyOptions {
    TenancyOptions {
        shared_collections: vec!["categories".into()],
        shared_globals: vec!["site-settings".into()],
        server_url: "https://cms.example".into(),
        ..TenancyOptions::new(strategy)
    }
}

/// root -> child -> grandchild, plus an unrelated tenant.
async fn setup(strategy: IsolationStrategy) -> (Tenancy, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for (id, slug, parent) in [
        ("root", "root", None),
        ("child", "child-slug", Some("root")),
        ("grandchild", "grandchild", Some("child")),
        ("other", "other", None),
    ] {
        store
            .create("tenants", doc(json!({ "id": id, "slug": slug, "parent": parent })))
            .await
            .unwrap();
    }
    let tenancy = Tenancy::configure(options(strategy), app_config(), store.clone()).unwrap();
    store.clear_calls();
    (tenancy, store)
}

fn user_of(tenant: &str) -> AuthUser {
    AuthUser::new("u1", "users").with_tenant(TenantId::new(tenant))
}

fn field_error(err: &anyhow::Error, field: &str) -> String {
    let err = TenancyError::from_anyhow(err).unwrap();
    assert_eq!(err.code(), 422);
    err.errors.as_ref().unwrap()[field][0].as_str().unwrap().to_string()
}

#[test]
fn configure_requires_a_plain_tenant_collection() {
    let store = Arc::new(MemoryStore::new());

    let missing = AppConfig::new().collection(CollectionConfig::new("users").auth());
    let err = Tenancy::configure(TenancyOptions::default(), missing, store.clone())
        .err()
        .unwrap();
    assert_eq!(TenancyError::from_anyhow(&err).unwrap().code(), 400);

    let auth = AppConfig::new().collection(CollectionConfig::new("tenants").auth());
    assert!(Tenancy::configure(TenancyOptions::default(), auth, store).is_err());
}

#[tokio::test]
async fn collections_are_classified_and_hooked() {
    let (tenancy, _) = setup(IsolationStrategy::Path).await;

    assert_eq!(tenancy.kind("tenants"), Some(CollectionKind::Tenants));
    assert_eq!(tenancy.kind("users"), Some(CollectionKind::Users));
    assert_eq!(tenancy.kind("posts"), Some(CollectionKind::Resource));
    assert_eq!(tenancy.kind("categories"), Some(CollectionKind::Shared));
    assert_eq!(tenancy.kind("headerGlobals"), Some(CollectionKind::GlobalRows));
    assert_eq!(tenancy.kind("site-settingsGlobals"), None);

    let media = tenancy.collection("media").unwrap();
    assert_eq!(media.hooks.count(HookStage::AfterRead), 1);
    let posts = tenancy.collection("posts").unwrap();
    assert_eq!(posts.hooks.count(HookStage::AfterRead), 0);
    assert_eq!(posts.hooks.count(HookStage::BeforeChange), 1);

    let tenants = tenancy.collection("tenants").unwrap();
    assert_eq!(tenants.hooks.count(HookStage::BeforeDelete), 1);
    assert!(tenancy.collection("users").unwrap().access.admin.is_some());

    assert_eq!(tenancy.global_slugs().collect::<Vec<_>>(), vec!["header"]);
    assert!(tenancy.global("site-settings").is_none());
}

#[tokio::test]
async fn global_rows_are_hidden_and_closed() {
    let (tenancy, _) = setup(IsolationStrategy::Path).await;
    let rows = tenancy.collection("headerGlobals").unwrap();
    assert!(rows.hidden);
    assert!(rows.versions);
    assert_eq!(tenancy.versioned_collections().collect::<Vec<_>>(), vec!["headerGlobals"]);

    let ctx = RequestContext::new()
        .with_tenant(TenantId::new("root"))
        .with_user(user_of("root"));
    for op in Operation::ALL {
        assert_eq!(tenancy.access("headerGlobals", op, &ctx).await.unwrap(), AccessResult::DENY);
    }
    assert_eq!(tenancy.admin_access("headerGlobals", &ctx).await.unwrap(), AccessResult::DENY);
}

#[tokio::test]
async fn upload_urls_only_rewritten_under_path_isolation() {
    let (tenancy, _) = setup(IsolationStrategy::Domain).await;
    assert_eq!(tenancy.collection("media").unwrap().hooks.count(HookStage::AfterRead), 0);
}

#[tokio::test]
async fn shared_collections_are_left_alone() {
    let (tenancy, store) = setup(IsolationStrategy::Path).await;
    store
        .create("categories", doc(json!({ "name": "news" })))
        .await
        .unwrap();

    let page = tenancy
        .find("categories", &RequestContext::new(), FindArgs::all())
        .await
        .unwrap();
    assert_eq!(page.total_docs, 1);
}

#[tokio::test]
async fn resource_reads_are_scoped_to_the_bound_subtree() {
    let (tenancy, store) = setup(IsolationStrategy::Path).await;
    for (title, tenant) in [("a", "root"), ("b", "child"), ("c", "grandchild"), ("d", "other")] {
        store
            .create("posts", doc(json!({ "title": title, "tenant": tenant })))
            .await
            .unwrap();
    }

    let ctx = RequestContext::new()
        .with_tenant(TenantId::new("child"))
        .with_user(user_of("root"));
    let page = tenancy.find("posts", &ctx, FindArgs::all()).await.unwrap();
    let titles: Vec<_> = page.docs.iter().map(|d| d["title"].clone()).collect();
    assert_eq!(titles, vec![json!("b"), json!("c")]);

    let foreign = RequestContext::new()
        .with_tenant(TenantId::new("other"))
        .with_user(user_of("root"));
    let page = tenancy.find("posts", &foreign, FindArgs::all()).await.unwrap();
    assert!(page.docs.is_empty());
    assert_eq!(store.count(StoreOp::Find, "posts"), 1);
}

#[tokio::test]
async fn resource_writes_are_stamped_with_the_bound_tenant() {
    let (tenancy, _) = setup(IsolationStrategy::Path).await;
    let ctx = RequestContext::new()
        .with_tenant(TenantId::new("child"))
        .with_user(user_of("root"));

    let created = tenancy
        .create("posts", &ctx, doc(json!({ "title": "hi", "tenant": "other" })))
        .await
        .unwrap();
    assert_eq!(created["tenant"], "child");
}

#[tokio::test]
async fn resource_create_without_tenant_is_forbidden_under_user_isolation() {
    let (tenancy, _) = setup(IsolationStrategy::User).await;
    let ctx = RequestContext::new().with_user(AuthUser::new("u1", "users"));

    let err = tenancy
        .create("posts", &ctx, doc(json!({ "title": "hi" })))
        .await
        .unwrap_err();
    let err = TenancyError::from_anyhow(&err).unwrap();
    assert_eq!(err.code(), 403);
    assert_eq!(err.message, "You are not allowed to perform this action.");
}

#[tokio::test]
async fn upload_urls_carry_the_tenant_slug() {
    let (tenancy, store) = setup(IsolationStrategy::Path).await;
    store
        .create(
            "media",
            doc(json!({
                "filename": "a.png",
                "tenant": "child",
                "sizes": { "thumb": { "filename": "a-thumb.png" }, "empty": {} }
            })),
        )
        .await
        .unwrap();

    let ctx = RequestContext::new()
        .with_tenant(TenantId::new("child"))
        .with_user(user_of("root"));
    let page = tenancy.find("media", &ctx, FindArgs::all()).await.unwrap();
    let media = &page.docs[0];
    assert_eq!(media["url"], "https://cms.example/child-slug/media/a.png");
    assert_eq!(media["sizes"]["thumb"]["url"], "https://cms.example/child-slug/media/a-thumb.png");
    assert!(media["sizes"]["empty"].get("url").is_none());
}

#[tokio::test]
async fn tenant_slug_and_parent_are_validated_on_create() {
    let (tenancy, _) = setup(IsolationStrategy::User).await;
    let ctx = RequestContext::new().with_user(user_of("root"));

    let err = tenancy
        .create("tenants", &ctx, doc(json!({ "slug": "acme corp", "parent": "root" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "slug"), "Slug cannot contain space characters");

    let err = tenancy
        .create("tenants", &ctx, doc(json!({ "parent": "root" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "slug"), "Slug is required");

    let err = tenancy
        .create("tenants", &ctx, doc(json!({ "slug": "orphan" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "parent"), "Required");

    let err = tenancy
        .create("tenants", &ctx, doc(json!({ "slug": "stray", "parent": "other" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "parent"), "Unauthorized");

    let created = tenancy
        .create("tenants", &ctx, doc(json!({ "slug": "team", "parent": "child" })))
        .await
        .unwrap();
    assert_eq!(created["parent"], "child");
}

#[tokio::test]
async fn tenant_parent_is_validated_on_update() {
    let (tenancy, _) = setup(IsolationStrategy::User).await;
    let ctx = RequestContext::new().with_user(user_of("root"));

    let err = tenancy
        .update("tenants", &ctx, "child", doc(json!({ "parent": "child" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "parent"), "Cannot relate to itself");

    let err = tenancy
        .update("tenants", &ctx, "child", doc(json!({ "parent": "grandchild" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "parent"), "Cannot relate to a descendant");

    let err = tenancy
        .update("tenants", &ctx, "root", doc(json!({ "parent": "child" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "parent"), "Cannot assign parent to root tenant");

    // slug-only update keeps the stored parent
    let updated = tenancy
        .update("tenants", &ctx, "grandchild", doc(json!({ "slug": "gc" })))
        .await
        .unwrap();
    assert_eq!(updated["slug"], "gc");
    assert_eq!(updated["parent"], "child");
}

#[tokio::test]
async fn tenant_slugs_are_unique() {
    let (tenancy, store) = setup(IsolationStrategy::User).await;
    let ctx = RequestContext::new().with_user(user_of("root"));

    let err = tenancy
        .create("tenants", &ctx, doc(json!({ "slug": "child-slug", "parent": "root" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "slug"), "Value must be unique");

    let err = tenancy
        .update("tenants", &ctx, "grandchild", doc(json!({ "slug": "child-slug" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "slug"), "Value must be unique");

    let taken = store
        .rows("tenants")
        .iter()
        .filter(|t| t["slug"] == "child-slug")
        .count();
    assert_eq!(taken, 1);

    // re-saving a row's own slug is fine
    let updated = tenancy
        .update("tenants", &ctx, "child", doc(json!({ "slug": "child-slug" })))
        .await
        .unwrap();
    assert_eq!(updated["slug"], "child-slug");
}

#[tokio::test]
async fn first_tenant_can_be_created_on_an_empty_store() {
    let store = Arc::new(MemoryStore::new());
    store.create("users", doc(json!({ "id": "admin" }))).await.unwrap();
    let tenancy = Tenancy::configure(options(IsolationStrategy::User), app_config(), store.clone()).unwrap();
    let ctx = RequestContext::new().with_user(AuthUser::new("admin", "users"));

    let created = tenancy
        .create("tenants", &ctx, doc(json!({ "slug": "first" })))
        .await
        .unwrap();

    assert_eq!(store.rows("users")[0]["tenant"], created["id"]);
}

#[tokio::test]
async fn user_tenant_must_be_authorized() {
    let (tenancy, _) = setup(IsolationStrategy::User).await;
    let ctx = RequestContext::new().with_user(user_of("root"));

    let err = tenancy
        .create("users", &ctx, doc(json!({ "email": "x@example.com", "tenant": "other" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "tenant"), "Unauthorized");

    let err = tenancy
        .create("users", &ctx, doc(json!({ "email": "x@example.com" })))
        .await
        .unwrap_err();
    assert_eq!(field_error(&err, "tenant"), "Required");

    tenancy
        .create("users", &ctx, doc(json!({ "email": "x@example.com", "tenant": "grandchild" })))
        .await
        .unwrap();
}

#[tokio::test]
async fn tenant_delete_cascades_through_the_plugin() {
    let (tenancy, store) = setup(IsolationStrategy::User).await;
    store
        .create("users", doc(json!({ "id": "gc-user", "tenant": "grandchild" })))
        .await
        .unwrap();
    store
        .create("users", doc(json!({ "id": "c-user", "tenant": "child" })))
        .await
        .unwrap();
    let ctx = RequestContext::new().with_user(user_of("root"));

    let deleted = tenancy.delete("tenants", &ctx, "child").await.unwrap();
    assert_eq!(deleted["id"], "child");

    let left: Vec<_> = store.rows("tenants").iter().map(|t| t["id"].clone()).collect();
    assert_eq!(left, vec![json!("root"), json!("other")]);
    assert!(store.rows("users").is_empty());
}

#[tokio::test]
async fn tenant_delete_outside_own_subtree_is_forbidden() {
    let (tenancy, store) = setup(IsolationStrategy::User).await;
    let ctx = RequestContext::new().with_user(user_of("child"));

    let err = tenancy.delete("tenants", &ctx, "other").await.unwrap_err();
    assert_eq!(TenancyError::from_anyhow(&err).unwrap().code(), 403);
    assert_eq!(store.count(StoreOp::Delete, "tenants"), 0);
}

#[tokio::test]
async fn login_through_the_plugin_checks_the_bound_tenant() {
    let (tenancy, _) = setup(IsolationStrategy::Path).await;
    let user = doc(json!({ "id": "u1", "tenant": "child" }));

    let ok = RequestContext::new().with_tenant(TenantId::new("grandchild"));
    tenancy.login("users", &ok, user.clone()).await.unwrap();

    let denied = RequestContext::new().with_tenant(TenantId::new("root"));
    let err = tenancy.login("users", &denied, user).await.unwrap_err();
    assert_eq!(TenancyError::from_anyhow(&err).unwrap().code(), 403);
}

#[tokio::test]
async fn unknown_collections_and_globals_are_not_found() {
    let (tenancy, _) = setup(IsolationStrategy::Path).await;
    let ctx = RequestContext::new();

    let err = tenancy.find("ghosts", &ctx, FindArgs::all()).await.unwrap_err();
    assert_eq!(TenancyError::from_anyhow(&err).unwrap().code(), 404);

    let err = tenancy.read_global("footer", &ctx).await.unwrap_err();
    assert_eq!(TenancyError::from_anyhow(&err).unwrap().code(), 404);
}
