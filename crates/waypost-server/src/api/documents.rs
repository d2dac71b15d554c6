use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use waypost_core::{Document, Step};
use waypost_engine::WorkspaceBackend;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ordered_ids: Vec<String>,
}

/// Create a document shell; steps are committed individually afterwards
async fn create_document(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Json(document): Json<Document>,
) -> Result<Json<Document>, AppError> {
    let created = state.store.create_document(workspace_id, &document).await?;
    Ok(Json(created))
}

/// Get the canonical document
async fn get_document(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Document>, AppError> {
    let document = state.store.get_document(workspace_id, doc_id).await?;
    Ok(Json(document))
}

/// Update document metadata (title, status, access password)
async fn update_document(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
    Json(mut document): Json<Document>,
) -> Result<Json<Document>, AppError> {
    document.id = Some(doc_id);
    let updated = state.store.update_document(workspace_id, &document).await?;
    Ok(Json(updated))
}

/// Publish: status flip, version bump and snapshot append
async fn publish_document(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Document>, AppError> {
    let published = state.store.publish_document(workspace_id, doc_id).await?;
    Ok(Json(published))
}

/// Create a step, returning the server-assigned id
async fn create_step(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
    Json(step): Json<Step>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = state.store.create_step(workspace_id, doc_id, &step).await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

/// Update a step in place
async fn update_step(
    State(state): State<AppState>,
    Path((workspace_id, doc_id, step_id)): Path<(Uuid, Uuid, String)>,
    Json(mut step): Json<Step>,
) -> Result<Json<serde_json::Value>, AppError> {
    step.id = step_id;
    state.store.update_step(workspace_id, doc_id, &step).await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

/// Delete a step
async fn delete_step(
    State(state): State<AppState>,
    Path((workspace_id, doc_id, step_id)): Path<(Uuid, Uuid, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .store
        .delete_step(workspace_id, doc_id, &step_id)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Apply a full ordering of step ids
async fn reorder_steps(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .store
        .reorder_steps(workspace_id, doc_id, &req.ordered_ids)
        .await?;
    Ok(Json(serde_json::json!({ "reordered": true })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/workspaces/{workspace_id}/documents",
            post(create_document),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}",
            get(get_document).put(update_document),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/publish",
            post(publish_document),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/steps",
            post(create_step),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/steps/reorder",
            post(reorder_steps),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/steps/{step_id}",
            put(update_step).delete(delete_step),
        )
}
