use anyhow::Result;
use serde_json::{json, Value};
use tenancy_core::{Document, DocumentStore, MemoryStore};
use tracing::debug;

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Demo data: `acme` with a child `acme-eu`, and an unrelated `globex`.
pub async fn seed(store: &MemoryStore) -> Result<()> {
    let tenants = [
        json!({ "id": "acme", "slug": "acme", "name": "Acme", "parent": null,
                "domains": [{ "domain": "acme.localhost" }] }),
        json!({ "id": "acme-eu", "slug": "acme-eu", "name": "Acme EU", "parent": "acme",
                "domains": [{ "domain": "eu.acme.localhost" }] }),
        json!({ "id": "globex", "slug": "globex", "name": "Globex", "parent": null,
                "domains": [{ "domain": "globex.localhost" }] }),
    ];
    for tenant in tenants {
        store.create("tenants", doc(tenant)).await?;
    }

    for (id, tenant) in [("alice", "acme"), ("erik", "acme-eu"), ("gina", "globex")] {
        store
            .create("users", doc(json!({ "id": id, "email": format!("{id}@example.com"), "tenant": tenant })))
            .await?;
        store
            .create("posts", doc(json!({ "id": format!("{tenant}-hello"), "title": format!("Hello from {tenant}"), "tenant": tenant })))
            .await?;
    }

    store
        .create("categories", doc(json!({ "id": "news", "title": "News" })))
        .await?;

    store.clear_calls();
    debug!("seeded demo tenants");
    Ok(())
}
