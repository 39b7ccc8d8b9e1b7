//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::hub::Hub;
use crate::ledger::{BalanceStore, TransferCoordinator};
use std::sync::Arc;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 방/점수 저장소 (조회용)
    pub store: Arc<dyn BalanceStore>,
    /// 점수 변경은 모두 여기를 거친다
    pub ledger: TransferCoordinator,
    pub hub: Hub,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn BalanceStore>, hub: Hub) -> Self {
        let ledger = TransferCoordinator::new(
            store.clone(),
            Arc::new(hub.clone()),
            config.ledger.clone(),
        );

        Self {
            store,
            ledger,
            hub,
            config: Arc::new(config),
        }
    }
}
