use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::Value;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /users/:user_id - resolve and return a user record.
///
/// When the requested id is the caller's own subject, resolution goes
/// through the identity relation (the subject is not itself a user key);
/// any other id is fetched directly.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = if user_id == identity.as_str() {
        state.directory.user_from_identity(&user_id).await?
    } else {
        state.directory.get_user(&user_id).await?
    };

    Ok(Json(user.as_map()))
}
