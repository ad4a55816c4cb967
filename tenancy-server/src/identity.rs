use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tenancy_axum::TenancyAxumError;
use tenancy_core::{AuthUser, DocumentStore, TenantRef};
use tracing::debug;

pub const USER_HEADER: &str = "x-user-id";
pub const USERS: &str = "users";

/// Development stand-in for authentication: `x-user-id` names a row in
/// `users`, which becomes the request's [`AuthUser`]. Unknown ids stay
/// anonymous.
pub async fn identify(State(store): State<Arc<dyn DocumentStore>>, mut req: Request, next: Next) -> Response {
    let Some(id) = req
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
    else {
        return next.run(req).await;
    };

    match store.find_by_id(USERS, &id).await {
        Ok(Some(row)) => {
            let mut user = AuthUser::new(id, USERS);
            if let Some(tenant) = row.get("tenant").and_then(TenantRef::from_value) {
                user = user.with_tenant(tenant);
            }
            req.extensions_mut().insert(user);
        }
        Ok(None) => debug!(user = %id, "unknown user, continuing anonymously"),
        Err(err) => return TenancyAxumError(err).into_response(),
    }

    next.run(req).await
}
