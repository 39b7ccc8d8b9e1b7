//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub hub: HubConfig,
    pub ledger: LedgerConfig,
    pub log_level: String,
}

/// 실시간 뷰어 연결 설정
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// 연결별 송신 큐 크기
    pub queue_capacity: usize,
    /// 유휴 상태에서 ping 을 보내는 주기
    pub ping_interval: Duration,
    /// 이 시간 동안 아무 프레임도 받지 못하면 연결 종료
    pub pong_wait: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            ping_interval: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: 512,
        }
    }
}

/// 점수 이동/정산 정책
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// 게임 중 마이너스 점수(빚) 허용 여부
    pub allow_negative_balance: bool,
    pub settlement_order: SettlementOrder,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            allow_negative_balance: true,
            settlement_order: SettlementOrder::Join,
        }
    }
}

/// 정산 시 같은 점수를 가진 플레이어의 처리 순서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SettlementOrder {
    /// 방에 참여한 순서
    #[default]
    Join,
    /// 플레이어 ID 오름차순
    PlayerId,
}

impl FromStr for SettlementOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" => Ok(Self::Join),
            "player_id" => Ok(Self::PlayerId),
            other => Err(format!("unknown settlement order: {other}")),
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let hub_defaults = HubConfig::default();

        Self {
            port: env_or("PORT", 8080),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            hub: HubConfig {
                queue_capacity: env_or("VIEWER_QUEUE_CAPACITY", hub_defaults.queue_capacity),
                ping_interval: Duration::from_secs(env_or("VIEWER_PING_INTERVAL_SECS", 54)),
                pong_wait: Duration::from_secs(env_or("VIEWER_PONG_WAIT_SECS", 60)),
                write_wait: Duration::from_secs(env_or("VIEWER_WRITE_WAIT_SECS", 10)),
                max_message_size: env_or("VIEWER_MAX_MESSAGE_SIZE", hub_defaults.max_message_size),
            },
            ledger: LedgerConfig {
                allow_negative_balance: env::var("ALLOW_NEGATIVE_BALANCE")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                settlement_order: env_or("SETTLEMENT_ORDER", SettlementOrder::Join),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_order_parse() {
        assert_eq!("join".parse::<SettlementOrder>(), Ok(SettlementOrder::Join));
        assert_eq!(
            " Player_Id ".parse::<SettlementOrder>(),
            Ok(SettlementOrder::PlayerId)
        );
        assert!("random".parse::<SettlementOrder>().is_err());
    }

    #[test]
    fn test_hub_defaults_ping_before_deadline() {
        let config = HubConfig::default();
        assert!(config.ping_interval < config.pong_wait);
        assert_eq!(config.queue_capacity, 256);
    }
}
