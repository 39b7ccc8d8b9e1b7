//! 점수 이동 / 정산 핸들러

use super::error::ApiError;
use crate::ledger::{RoomId, Transfer};
use crate::protocol::TransferScoreRequest;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

/// 점수 이동
pub async fn transfer_score(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<TransferScoreRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .ledger
        .transfer_score(room_id, req.from_user_id, req.to_user_id, req.amount)
        .await?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// 방 정산
pub async fn settle_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Vec<Transfer>>, ApiError> {
    let settlements = state.ledger.settle_room(room_id).await?;
    Ok(Json(settlements))
}
