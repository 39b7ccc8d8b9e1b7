//! 방 관리 핸들러

use super::error::ApiError;
use crate::ledger::{JoinOutcome, PlayerBalance, PlayerProfile, Room, RoomId, UserId, UserRoomEntry};
use crate::protocol::{CreateRoomRequest, HistoryParams, RenameRoomRequest, RoomDetail};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;

/// 방 생성
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    let name = req.room_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("room_name must not be empty"));
    }

    let room = state.ledger.create_room(name, req.creator).await?;
    Ok(Json(room))
}

/// 방 상세 조회 (플레이어, 이동 기록, 연결 수)
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomDetail>, ApiError> {
    let room = state.store.room(room_id).await?;
    let players = state.store.balances(room_id).await?;
    let transfers = state.store.transfers(room_id).await?;
    let viewers = state.hub.room_size(room_id).await;

    Ok(Json(RoomDetail {
        room,
        players,
        transfers,
        viewers,
    }))
}

/// 방 번호로 조회
pub async fn get_room_by_code(
    State(state): State<Arc<AppState>>,
    Path(room_code): Path<String>,
) -> Result<Json<Room>, ApiError> {
    let room = state.store.room_by_code(room_code.trim()).await?;
    Ok(Json(room))
}

/// 방 이름 변경
pub async fn rename_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<RenameRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    let name = req.room_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("room_name must not be empty"));
    }

    let room = state.ledger.rename_room(room_id, name).await?;
    Ok(Json(room))
}

/// 방 참여
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Json(profile): Json<PlayerProfile>,
) -> Result<Json<JoinOutcome>, ApiError> {
    let outcome = state.ledger.join_room(room_id, profile).await?;
    Ok(Json(outcome))
}

/// 플레이어 프로필 변경
pub async fn update_player(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Json(profile): Json<PlayerProfile>,
) -> Result<Json<PlayerBalance>, ApiError> {
    let player = state.ledger.update_player(room_id, profile).await?;
    Ok(Json(player))
}

/// 사용자가 참여한 방 기록 (최신순)
pub async fn user_rooms(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<UserRoomEntry>>, ApiError> {
    let rooms = state
        .store
        .rooms_for_user(user_id, params.page(), params.page_size())
        .await?;
    Ok(Json(rooms))
}
