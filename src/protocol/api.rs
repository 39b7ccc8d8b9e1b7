//! HTTP 요청/응답 본문

use crate::ledger::{PlayerBalance, PlayerProfile, Room, RoomId, Transfer, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub creator: PlayerProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameRoomRequest {
    pub room_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferScoreRequest {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: i64,
}

/// WebSocket 연결 쿼리 (`/ws?room_id=..&user_id=..`)
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerParams {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// 방 기록 페이지 쿼리 (`?page=..&page_size=..`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl HistoryParams {
    /// 1 이상이 아니면 1
    pub fn page(&self) -> usize {
        self.page
            .filter(|&p| p > 0)
            .and_then(|p| usize::try_from(p).ok())
            .unwrap_or(1)
    }

    /// 1 이상이 아니면 10
    pub fn page_size(&self) -> usize {
        self.page_size
            .filter(|&s| s > 0)
            .and_then(|s| usize::try_from(s).ok())
            .unwrap_or(10)
    }
}

/// 방 상세 조회 응답
#[derive(Debug, Clone, Serialize)]
pub struct RoomDetail {
    pub room: Room,
    pub players: Vec<PlayerBalance>,
    pub transfers: Vec<Transfer>,
    /// 현재 실시간 연결 수
    pub viewers: usize,
}
