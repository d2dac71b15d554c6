use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use waypost_core::{Document, VersionSnapshot};
use waypost_engine::{RecoveredBlocks, WorkspaceBackend};
use waypost_history::{adjacent_diffs, RecoveryReport, VersionDelta};

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub version: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecoverRequest {
    #[serde(default)]
    pub version: Option<i64>,
}

/// Historical snapshots, newest first
async fn list_versions(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<VersionSnapshot>>, AppError> {
    let versions = state.store.get_versions(workspace_id, doc_id).await?;
    Ok(Json(versions))
}

/// Change summaries between adjacent snapshots, newest first
async fn version_changes(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<VersionDelta>>, AppError> {
    let versions = state.store.get_versions(workspace_id, doc_id).await?;
    Ok(Json(adjacent_diffs(&versions)))
}

/// Restore the document to a historical version
async fn rollback(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RollbackRequest>,
) -> Result<Json<Document>, AppError> {
    let document = state
        .store
        .rollback(workspace_id, doc_id, req.version)
        .await?;
    Ok(Json(document))
}

/// Scan the document and its history for dropped image blocks
async fn diagnose(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RecoveryReport>, AppError> {
    let report = state.store.diagnose(workspace_id, doc_id).await?;
    Ok(Json(report))
}

/// Restore dropped image blocks from history
async fn recover(
    State(state): State<AppState>,
    Path((workspace_id, doc_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RecoverRequest>,
) -> Result<Json<RecoveredBlocks>, AppError> {
    let recovered = state
        .store
        .recover_blocks(workspace_id, doc_id, req.version)
        .await?;
    Ok(Json(recovered))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/versions",
            get(list_versions),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/versions/changes",
            get(version_changes),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/rollback",
            post(rollback),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/diagnose",
            get(diagnose),
        )
        .route(
            "/api/workspaces/{workspace_id}/documents/{doc_id}/recover",
            post(recover),
        )
}
