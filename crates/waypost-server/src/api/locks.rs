use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use waypost_engine::{LockHolder, WorkspaceBackend};

use crate::error::AppError;
use crate::AppState;

/// Request to acquire (or forcibly take over) a workspace's edit lease
#[derive(Debug, Deserialize)]
pub struct LockRequest {
    pub holder_id: Uuid,
    pub holder_label: String,
    #[serde(default)]
    pub force: bool,
}

/// Response for lock acquisition
#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub locked: bool,
    pub locked_by: Option<String>,
    pub success: bool,
}

/// Response for a side-effect-free lock check
#[derive(Debug, Serialize)]
pub struct LockCheckResponse {
    pub locked: bool,
    pub locked_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub holder_id: Uuid,
}

/// Acquire the workspace edit lease
async fn lock_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Json(req): Json<LockRequest>,
) -> Result<Json<LockResponse>, AppError> {
    let holder = LockHolder {
        id: req.holder_id,
        label: req.holder_label,
    };
    let grant = state
        .store
        .lock_workspace(workspace_id, &holder, req.force)
        .await?;

    Ok(Json(LockResponse {
        locked: true,
        locked_by: grant.holder_label,
        success: grant.granted,
    }))
}

/// Check the lease without touching it
async fn check_lock(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<LockCheckResponse>, AppError> {
    let status = state.store.check_workspace_lock(workspace_id).await?;
    Ok(Json(LockCheckResponse {
        locked: status.locked,
        locked_by: status.holder_label,
    }))
}

/// Release the lease; always succeeds, even for absent or stolen leases
async fn unlock_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let holder = LockHolder {
        id: req.holder_id,
        label: String::new(),
    };
    state.store.unlock_workspace(workspace_id, &holder).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/workspaces/{workspace_id}/lock",
        post(lock_workspace).get(check_lock).delete(unlock_workspace),
    )
}
