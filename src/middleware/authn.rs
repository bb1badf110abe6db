use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Authentication stage: validate the bearer token and attach the resolved
/// [`Identity`](crate::auth::Identity) to the request. Any verification
/// failure ends the request with a 401 and a generic message; the detailed
/// reason only goes to the log.
pub async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match state.verifier.authenticate(authorization).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(err) => {
            tracing::warn!(error = %err, "authentication failed");
            Err(ApiError::unauthorized("authentication failed"))
        }
    }
}
