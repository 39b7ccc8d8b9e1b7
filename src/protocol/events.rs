//! 서버 → 뷰어 이벤트 정의
//!
//! 전송 형태: `{"type": ..., "room_id": ..., "data": {...}, "timestamp": ...}`

use super::unix_now;
use crate::ledger::{PlayerBalance, Room, RoomId, Transfer, UserId};
use serde::Serialize;

/// 방 이벤트
#[derive(Debug, Clone, Serialize)]
pub struct RoomEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub room_id: RoomId,
    /// 유닉스 시간 (초)
    pub timestamp: u64,
}

impl RoomEvent {
    pub fn new(room_id: RoomId, payload: EventPayload) -> Self {
        Self {
            payload,
            room_id,
            timestamp: unix_now(),
        }
    }
}

/// 이벤트 종류별 데이터
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    PlayerJoined { player: PlayerBalance },
    PlayerLeft { user_id: UserId },
    ScoreTransfer { transfer: TransferNotice },
    RoomSettled {
        settlements: Vec<Transfer>,
        players: Vec<PlayerBalance>,
    },
    PlayerUpdated { player: PlayerBalance },
    RoomUpdated { room: Room },
}

impl EventPayload {
    /// 로그용 이벤트 이름
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::PlayerJoined { .. } => "player_joined",
            EventPayload::PlayerLeft { .. } => "player_left",
            EventPayload::ScoreTransfer { .. } => "score_transfer",
            EventPayload::RoomSettled { .. } => "room_settled",
            EventPayload::PlayerUpdated { .. } => "player_updated",
            EventPayload::RoomUpdated { .. } => "room_updated",
        }
    }
}

/// 점수 이동 알림
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferNotice {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub from_user_name: String,
    pub to_user_name: String,
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_transfer_wire_shape() {
        let event = RoomEvent {
            payload: EventPayload::ScoreTransfer {
                transfer: TransferNotice {
                    from_user_id: 2,
                    to_user_id: 1,
                    from_user_name: "bo".to_string(),
                    to_user_name: "ann".to_string(),
                    amount: 100,
                },
            },
            room_id: 7,
            timestamp: 1_700_000_000,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "score_transfer",
                "room_id": 7,
                "timestamp": 1_700_000_000u64,
                "data": {
                    "transfer": {
                        "from_user_id": 2,
                        "to_user_id": 1,
                        "from_user_name": "bo",
                        "to_user_name": "ann",
                        "amount": 100
                    }
                }
            })
        );
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let event = RoomEvent::new(3, EventPayload::PlayerLeft { user_id: 9 });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.payload.kind());
        assert_eq!(value["data"]["user_id"], 9);
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }
}
