//! 점수 이동 / 정산 조정
//!
//! 모든 변경은 저장소 트랜잭션 하나 안에서 끝나고, 커밋에 성공한 뒤에만
//! 방 이벤트를 알린다. 알림은 실패해도 결과에 영향을 주지 않는다.

use super::error::{JoinError, SettleError, TransferError, UpdateError};
use super::model::{PlayerBalance, PlayerProfile, Room, RoomId, Transfer, TransferKind, UserId};
use super::settlement::{self, Balance};
use super::store::{BalanceStore, LedgerTx, StoreError};
use crate::config::{LedgerConfig, SettlementOrder};
use crate::protocol::{unix_now, EventPayload, TransferNotice};
use serde::Serialize;
use std::sync::Arc;

/// 방 이벤트 발행 인터페이스
pub trait RoomNotifier: Send + Sync {
    /// 방의 모든 뷰어에게 이벤트 전달 (블로킹 없음, 실패 무시)
    fn notify(&self, room_id: RoomId, payload: EventPayload);
}

/// 방 참여 결과
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub room: Room,
    pub player: PlayerBalance,
    pub already_joined: bool,
}

/// 점수 장부 조정자
pub struct TransferCoordinator {
    store: Arc<dyn BalanceStore>,
    notifier: Arc<dyn RoomNotifier>,
    policy: LedgerConfig,
}

impl TransferCoordinator {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        notifier: Arc<dyn RoomNotifier>,
        policy: LedgerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// 방 생성 (생성자 자동 참여)
    pub async fn create_room(
        &self,
        name: &str,
        creator: PlayerProfile,
    ) -> Result<Room, StoreError> {
        let room = self.store.create_room(name, creator).await?;
        tracing::info!(room_id = room.id, room_code = %room.code, "Room created");
        Ok(room)
    }

    /// 방 참여. 이미 참여한 플레이어는 기존 행을 그대로 돌려준다.
    pub async fn join_room(
        &self,
        room_id: RoomId,
        profile: PlayerProfile,
    ) -> Result<JoinOutcome, JoinError> {
        let user_id = profile.user_id;
        let mut tx = self.store.begin(room_id).await?;
        if !tx.room().is_open() {
            return Err(JoinError::RoomClosed(room_id));
        }

        let inserted = tx.insert_player(profile).await?;
        let player = tx
            .player(user_id)
            .await?
            .ok_or(StoreError::PlayerNotFound { room_id, user_id })?;
        let room = tx.room().clone();

        if !inserted {
            return Ok(JoinOutcome {
                room,
                player,
                already_joined: true,
            });
        }

        tx.commit().await?;

        tracing::info!(room_id = room_id, user_id = user_id, "Player joined room");
        self.notifier.notify(
            room_id,
            EventPayload::PlayerJoined {
                player: player.clone(),
            },
        );

        Ok(JoinOutcome {
            room,
            player,
            already_joined: false,
        })
    }

    /// 플레이어 간 점수 이동
    pub async fn transfer_score(
        &self,
        room_id: RoomId,
        from_user_id: UserId,
        to_user_id: UserId,
        amount: i64,
    ) -> Result<(), TransferError> {
        if amount <= 0 {
            return Err(TransferError::InvalidAmount(amount));
        }
        if from_user_id == to_user_id {
            return Err(TransferError::SelfTransfer);
        }

        let mut tx = self.store.begin(room_id).await?;
        if !tx.room().is_open() {
            return Err(TransferError::RoomClosed(room_id));
        }

        let payer = require_player(&mut tx, room_id, from_user_id).await?;
        let payee = require_player(&mut tx, room_id, to_user_id).await?;

        if !self.policy.allow_negative_balance && payer.current_score < amount {
            return Err(TransferError::InsufficientBalance {
                user_id: from_user_id,
                balance: payer.current_score,
                amount,
            });
        }

        tx.adjust(from_user_id, -amount).await?;
        tx.adjust(to_user_id, amount).await?;
        tx.append_transfer(Transfer {
            room_id,
            from_user_id,
            to_user_id,
            amount,
            kind: TransferKind::Play,
            created_at: unix_now(),
        })
        .await?;

        if let Err(e) = tx.commit().await {
            tracing::error!(
                room_id = room_id,
                error = %e,
                "Score transfer commit failed"
            );
            return Err(e.into());
        }

        tracing::info!(
            room_id = room_id,
            from = from_user_id,
            to = to_user_id,
            amount = amount,
            "Score transferred"
        );

        self.notifier.notify(
            room_id,
            EventPayload::ScoreTransfer {
                transfer: TransferNotice {
                    from_user_id,
                    to_user_id,
                    from_user_name: payer.profile.nickname,
                    to_user_name: payee.profile.nickname,
                    amount,
                },
            },
        );

        Ok(())
    }

    /// 방 정산: 최종 점수 기록, 송금 목록 저장, 방 종료
    pub async fn settle_room(&self, room_id: RoomId) -> Result<Vec<Transfer>, SettleError> {
        let mut tx = self.store.begin(room_id).await?;
        if !tx.room().is_open() {
            return Err(SettleError::RoomClosed(room_id));
        }

        let mut players = tx.balances().await?;

        let mut ordered: Vec<Balance> = players
            .iter()
            .map(|p| Balance {
                user_id: p.user_id(),
                score: p.current_score,
            })
            .collect();
        if self.policy.settlement_order == SettlementOrder::PlayerId {
            ordered.sort_by_key(|b| b.user_id);
        }

        let payments = settlement::settle(&ordered).map_err(|e| {
            tracing::error!(
                room_id = room_id,
                error = %e,
                "Refusing to settle unbalanced room"
            );
            e
        })?;

        let settled_at = unix_now();
        let transfers: Vec<Transfer> = payments
            .iter()
            .map(|p| Transfer {
                room_id,
                from_user_id: p.from_user_id,
                to_user_id: p.to_user_id,
                amount: p.amount,
                kind: TransferKind::Settlement,
                created_at: settled_at,
            })
            .collect();

        for transfer in &transfers {
            tx.append_transfer(transfer.clone()).await?;
        }
        for player in &mut players {
            tx.set_final_score(player.user_id(), player.current_score)
                .await?;
            player.final_score = player.current_score;
        }
        tx.mark_settled(settled_at).await?;

        if let Err(e) = tx.commit().await {
            tracing::error!(room_id = room_id, error = %e, "Settlement commit failed");
            return Err(e.into());
        }

        tracing::info!(
            room_id = room_id,
            players = players.len(),
            transfers = transfers.len(),
            "Room settled"
        );

        self.notifier.notify(
            room_id,
            EventPayload::RoomSettled {
                settlements: transfers.clone(),
                players,
            },
        );

        Ok(transfers)
    }

    /// 플레이어 닉네임/아바타 변경
    pub async fn update_player(
        &self,
        room_id: RoomId,
        profile: PlayerProfile,
    ) -> Result<PlayerBalance, UpdateError> {
        let mut tx = self.store.begin(room_id).await?;
        let player = tx.update_profile(profile).await?;
        tx.commit().await?;

        self.notifier.notify(
            room_id,
            EventPayload::PlayerUpdated {
                player: player.clone(),
            },
        );
        Ok(player)
    }

    /// 방 이름 변경
    pub async fn rename_room(&self, room_id: RoomId, name: &str) -> Result<Room, UpdateError> {
        let mut tx = self.store.begin(room_id).await?;
        if !tx.room().is_open() {
            return Err(UpdateError::RoomClosed(room_id));
        }
        tx.rename_room(name).await?;
        let room = tx.room().clone();
        tx.commit().await?;

        self.notifier
            .notify(room_id, EventPayload::RoomUpdated { room: room.clone() });
        Ok(room)
    }
}

async fn require_player(
    tx: &mut Box<dyn LedgerTx>,
    room_id: RoomId,
    user_id: UserId,
) -> Result<PlayerBalance, TransferError> {
    tx.player(user_id)
        .await?
        .ok_or(TransferError::PlayerNotInRoom { room_id, user_id })
}
