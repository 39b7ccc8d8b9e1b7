//! 방, 플레이어 점수, 점수 이동 기록

use serde::{Deserialize, Serialize};

pub type RoomId = i64;
pub type UserId = i64;

/// 방 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Open,
    Settled,
}

/// 방 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: RoomId,
    /// 공유용 방 번호
    pub code: String,
    pub name: String,
    pub creator_id: UserId,
    pub status: RoomStatus,
    pub created_at: u64,
    pub settled_at: Option<u64>,
}

impl Room {
    pub fn is_open(&self) -> bool {
        self.status == RoomStatus::Open
    }
}

/// 플레이어 프로필 (사용자 저장소에서 전달받는 스냅샷)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// 방 안에서의 플레이어 점수
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerBalance {
    pub room_id: RoomId,
    #[serde(flatten)]
    pub profile: PlayerProfile,
    /// 게임 중 점수 (음수 가능)
    pub current_score: i64,
    /// 정산 시점의 점수
    pub final_score: i64,
    pub joined_at: u64,
}

impl PlayerBalance {
    pub fn new(room_id: RoomId, profile: PlayerProfile, joined_at: u64) -> Self {
        Self {
            room_id,
            profile,
            current_score: 0,
            final_score: 0,
            joined_at,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.profile.user_id
    }
}

/// 사용자별 방 기록 한 줄
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRoomEntry {
    #[serde(flatten)]
    pub room: Room,
    pub current_score: i64,
    pub final_score: i64,
    pub player_count: usize,
    pub transfer_count: usize,
}

/// 점수 이동 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// 게임 중 직접 이동
    Play,
    /// 방 정산 시 생성
    Settlement,
}

/// 점수 이동 기록 (추가만 가능)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub room_id: RoomId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: i64,
    pub kind: TransferKind,
    pub created_at: u64,
}
