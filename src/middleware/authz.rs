use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use serde_json::{json, Value};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Authorization stage: delegate the access decision to the external
/// authorizer. Runs strictly after authentication; deny ends the request
/// with 403, an unreachable authorizer with 502. Never defaults to allow.
pub async fn authorize(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = match request.extensions().get::<Identity>() {
        Some(identity) => identity.clone(),
        None => {
            tracing::error!("authorization ran without an authenticated identity");
            return Err(ApiError::internal_server_error("request pipeline misconfigured"));
        }
    };

    let method = request.method().clone();
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let policy_path = policy_path(&state.config.policy.root, &method, &matched_path);
    let resource = resource_context(&state, &matched_path, request.uri().path()).await?;

    match state
        .authorizer
        .is_allowed(identity.as_str(), &policy_path, resource)
        .await
    {
        Ok(true) => Ok(next.run(request).await),
        Ok(false) => {
            tracing::info!(subject = %identity, policy = %policy_path, "authorization denied");
            Err(ApiError::forbidden("forbidden"))
        }
        Err(err) => {
            tracing::error!(error = %err, policy = %policy_path, "authorizer call failed");
            Err(ApiError::bad_gateway("authorization service unavailable"))
        }
    }
}

/// Map the matched route to a policy module path:
/// `<root>.<METHOD>.<segments>`, with route parameters rewritten as
/// `__name` (e.g. `PUT /todos/:id` becomes `todoapp.PUT.todos.__id`).
fn policy_path(root: &str, method: &Method, matched_path: &str) -> String {
    let mut path = String::from(root);
    path.push('.');
    path.push_str(method.as_str());

    for segment in matched_path.split('/').filter(|s| !s.is_empty()) {
        path.push('.');
        match segment.strip_prefix(':') {
            Some(param) => {
                path.push_str("__");
                path.push_str(param);
            }
            None => path.push_str(segment),
        }
    }

    path
}

/// Resource context for the decision. Routes addressing a single to-do carry
/// its id and current owner so ownership rules can apply; the owner comes
/// from the record store, and an unknown id is a 404 before the authorizer
/// is ever consulted.
async fn resource_context(
    state: &AppState,
    matched_path: &str,
    request_path: &str,
) -> Result<Value, ApiError> {
    let id = match id_param(matched_path, request_path) {
        Some(id) => id,
        None => return Ok(json!({})),
    };

    let todo = state
        .store
        .get_todo(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("todo not found"))?;

    Ok(json!({
        "object_id": todo.id,
        "owner_id": todo.owner_id,
    }))
}

/// The `:id` route parameter, when the matched route has one.
fn id_param(matched_path: &str, request_path: &str) -> Option<String> {
    if !matched_path.ends_with("/:id") {
        return None;
    }
    request_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::to_string)
}
