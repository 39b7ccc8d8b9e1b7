//! 실시간 방 이벤트 및 HTTP 본문 프로토콜

pub mod api;
pub mod events;

pub use api::*;
pub use events::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// 현재 유닉스 시간 (초)
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
