use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Identity;
use crate::directory::DirectoryError;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::Todo;

/// Mutable fields of a to-do, as sent by clients on create and update.
#[derive(Debug, Deserialize)]
struct TodoRequest {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Completed", default)]
    completed: bool,
}

fn decode_body(body: Value) -> Result<TodoRequest, ApiError> {
    serde_json::from_value(body).map_err(|err| ApiError::invalid_json(err.to_string()))
}

/// GET /todos - list all to-do records
pub async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = state.store.get_todos().await?;
    Ok(Json(todos))
}

/// POST /todos - create a to-do owned by the caller's resolved user
pub async fn create_todo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<Value>,
) -> Result<Json<Todo>, ApiError> {
    let body = decode_body(body)?;

    let owner = state
        .directory
        .user_from_identity(identity.as_str())
        .await
        .map_err(|err| match err {
            DirectoryError::NotFound => {
                tracing::warn!(subject = %identity, "no user for caller identity");
                ApiError::bad_request("no user found for the caller identity")
            }
            other => {
                tracing::error!(error = %other, "failed to resolve owner");
                ApiError::bad_gateway("directory service unavailable")
            }
        })?;

    let todo = Todo {
        id: Uuid::new_v4().to_string(),
        owner_id: owner.id.clone(),
        title: body.title,
        completed: body.completed,
    };

    state.store.insert_todo(&todo).await?;

    // The record store and the directory are updated in two independent
    // calls with no shared transaction; a failure here leaves a stored
    // record without an ownership relation.
    if let Err(err) = state.directory.record_ownership(&todo.id, &owner.id).await {
        tracing::error!(error = %err, todo_id = %todo.id, "failed to record ownership relation");
        return Err(ApiError::bad_gateway("directory service unavailable"));
    }

    Ok(Json(todo))
}

/// PUT /todos/:id - replace the title/completed fields of a to-do
pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Todo>, ApiError> {
    let body = decode_body(body)?;

    let mut todo = state
        .store
        .get_todo(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("todo not found"))?;

    todo.title = body.title;
    todo.completed = body.completed;
    state.store.update_todo(&todo).await?;

    Ok(Json(todo))
}

/// DELETE /todos/:id - delete a to-do and its ownership relation
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    // relation first, then the record, matching the ordering clients expect;
    // the two systems share no transaction (see create_todo)
    if let Err(err) = state.directory.remove_ownership(&id).await {
        tracing::error!(error = %err, todo_id = %id, "failed to remove ownership relation");
        return Err(ApiError::bad_gateway("directory service unavailable"));
    }

    state.store.delete_todo(&id).await?;

    Ok(StatusCode::OK)
}
