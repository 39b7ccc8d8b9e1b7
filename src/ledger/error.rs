//! 장부 작업 에러 타입

use super::model::{RoomId, UserId};
use super::settlement::SettlementError;
use super::store::StoreError;
use thiserror::Error;

/// 점수 이동 실패
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("cannot transfer points to yourself")]
    SelfTransfer,
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room {0} is closed")]
    RoomClosed(RoomId),
    #[error("player {user_id} is not in room {room_id}")]
    PlayerNotInRoom { room_id: RoomId, user_id: UserId },
    #[error("player {user_id} has {balance} points, cannot pay {amount}")]
    InsufficientBalance {
        user_id: UserId,
        balance: i64,
        amount: i64,
    },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(room_id) => Self::RoomNotFound(room_id),
            StoreError::PlayerNotFound { room_id, user_id } => {
                Self::PlayerNotInRoom { room_id, user_id }
            }
            other => Self::Store(other),
        }
    }
}

/// 방 정산 실패
#[derive(Debug, Error)]
pub enum SettleError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room {0} is already settled")]
    RoomClosed(RoomId),
    #[error(transparent)]
    Unbalanced(#[from] SettlementError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SettleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(room_id) => Self::RoomNotFound(room_id),
            other => Self::Store(other),
        }
    }
}

/// 방 참여 실패
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room {0} is closed")]
    RoomClosed(RoomId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for JoinError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(room_id) => Self::RoomNotFound(room_id),
            other => Self::Store(other),
        }
    }
}

/// 프로필/방 정보 수정 실패
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room {0} is closed")]
    RoomClosed(RoomId),
    #[error("player {user_id} is not in room {room_id}")]
    PlayerNotInRoom { room_id: RoomId, user_id: UserId },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for UpdateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(room_id) => Self::RoomNotFound(room_id),
            StoreError::PlayerNotFound { room_id, user_id } => {
                Self::PlayerNotInRoom { room_id, user_id }
            }
            other => Self::Store(other),
        }
    }
}
