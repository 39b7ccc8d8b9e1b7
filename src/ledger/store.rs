//! 점수 저장소
//!
//! `BalanceStore` 는 방 단위로 직렬화되는 트랜잭션을 제공한다. 커밋하지 않은
//! 트랜잭션은 drop 될 때 롤백된다. `MemoryStore` 는 프로세스 메모리에 보관하는
//! 기본 구현이다.

use super::model::{
    PlayerBalance, PlayerProfile, Room, RoomId, RoomStatus, Transfer, UserId, UserRoomEntry,
};
use crate::protocol::unix_now;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 방 기록 한 페이지의 최대 크기
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room code {0} not found")]
    RoomCodeNotFound(String),
    #[error("player {user_id} is not in room {room_id}")]
    PlayerNotFound { room_id: RoomId, user_id: UserId },
    #[error("storage failure: {0}")]
    Backend(String),
}

/// 방/점수 저장소
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// 방을 만들고 생성자를 첫 플레이어로 추가
    async fn create_room(&self, name: &str, creator: PlayerProfile) -> Result<Room, StoreError>;

    async fn room(&self, room_id: RoomId) -> Result<Room, StoreError>;

    async fn room_by_code(&self, code: &str) -> Result<Room, StoreError>;

    /// 참여 순서대로 반환
    async fn balances(&self, room_id: RoomId) -> Result<Vec<PlayerBalance>, StoreError>;

    async fn transfers(&self, room_id: RoomId) -> Result<Vec<Transfer>, StoreError>;

    /// 사용자가 참여한 방 목록 (최신순, `page` 는 1부터, `page_size` 는 최대 100)
    async fn rooms_for_user(
        &self,
        user_id: UserId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<UserRoomEntry>, StoreError>;

    /// 방 하나에 대한 트랜잭션 시작
    async fn begin(&self, room_id: RoomId) -> Result<Box<dyn LedgerTx>, StoreError>;
}

/// 열린 트랜잭션
#[async_trait]
pub trait LedgerTx: Send {
    fn room(&self) -> &Room;

    /// 플레이어 행 조회 (없으면 `None`)
    async fn player(&mut self, user_id: UserId) -> Result<Option<PlayerBalance>, StoreError>;

    async fn balances(&mut self) -> Result<Vec<PlayerBalance>, StoreError>;

    /// 새 행을 추가하면 `true`, 이미 있으면 `false`
    async fn insert_player(&mut self, profile: PlayerProfile) -> Result<bool, StoreError>;

    /// `current_score += delta`, 변경 후 점수 반환
    async fn adjust(&mut self, user_id: UserId, delta: i64) -> Result<i64, StoreError>;

    async fn update_profile(&mut self, profile: PlayerProfile) -> Result<PlayerBalance, StoreError>;

    async fn rename_room(&mut self, name: &str) -> Result<(), StoreError>;

    async fn append_transfer(&mut self, transfer: Transfer) -> Result<(), StoreError>;

    async fn set_final_score(&mut self, user_id: UserId, score: i64) -> Result<(), StoreError>;

    async fn mark_settled(&mut self, settled_at: u64) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct RoomLedger {
    room: Room,
    players: Vec<PlayerBalance>,
    transfers: Vec<Transfer>,
}

impl RoomLedger {
    fn has_player(&self, user_id: UserId) -> bool {
        self.players.iter().any(|p| p.user_id() == user_id)
    }

    fn player_mut(&mut self, user_id: UserId) -> Result<&mut PlayerBalance, StoreError> {
        let room_id = self.room.id;
        self.players
            .iter_mut()
            .find(|p| p.user_id() == user_id)
            .ok_or(StoreError::PlayerNotFound { room_id, user_id })
    }
}

/// 메모리 저장소
pub struct MemoryStore {
    rooms: DashMap<RoomId, Arc<Mutex<RoomLedger>>>,
    codes: DashMap<String, RoomId>,
    next_room_id: AtomicI64,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            codes: DashMap::new(),
            next_room_id: AtomicI64::new(1),
            fail_commits: AtomicBool::new(false),
        }
    }

    /// 이후 커밋을 모두 실패시킨다
    #[cfg(test)]
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn ledger(&self, room_id: RoomId) -> Result<Arc<Mutex<RoomLedger>>, StoreError> {
        self.rooms
            .get(&room_id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::RoomNotFound(room_id))
    }

    /// 16자리 방 번호 예약 (밀리초 타임스탬프 + 난수 3자리)
    fn reserve_code(&self, room_id: RoomId) -> String {
        let mut rng = rand::thread_rng();

        loop {
            // 같은 밀리초의 번호가 모두 차면 다음 밀리초로 넘어간다
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            let code = format!("{}{:03}", millis, rng.gen_range(0..1000));
            if let Entry::Vacant(slot) = self.codes.entry(code.clone()) {
                slot.insert(room_id);
                return code;
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn create_room(&self, name: &str, creator: PlayerProfile) -> Result<Room, StoreError> {
        let id = self.next_room_id.fetch_add(1, Ordering::SeqCst);
        let now = unix_now();

        let room = Room {
            id,
            code: self.reserve_code(id),
            name: name.to_string(),
            creator_id: creator.user_id,
            status: RoomStatus::Open,
            created_at: now,
            settled_at: None,
        };
        let ledger = RoomLedger {
            room: room.clone(),
            players: vec![PlayerBalance::new(id, creator, now)],
            transfers: Vec::new(),
        };

        self.rooms.insert(id, Arc::new(Mutex::new(ledger)));
        Ok(room)
    }

    async fn room(&self, room_id: RoomId) -> Result<Room, StoreError> {
        let ledger = self.ledger(room_id)?;
        let room = ledger.lock().await.room.clone();
        Ok(room)
    }

    async fn room_by_code(&self, code: &str) -> Result<Room, StoreError> {
        let room_id = self
            .codes
            .get(code)
            .map(|entry| *entry.value())
            .ok_or_else(|| StoreError::RoomCodeNotFound(code.to_string()))?;
        self.room(room_id).await
    }

    async fn balances(&self, room_id: RoomId) -> Result<Vec<PlayerBalance>, StoreError> {
        let ledger = self.ledger(room_id)?;
        let players = ledger.lock().await.players.clone();
        Ok(players)
    }

    async fn transfers(&self, room_id: RoomId) -> Result<Vec<Transfer>, StoreError> {
        let ledger = self.ledger(room_id)?;
        let transfers = ledger.lock().await.transfers.clone();
        Ok(transfers)
    }

    async fn rooms_for_user(
        &self,
        user_id: UserId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<UserRoomEntry>, StoreError> {
        let page_size = page_size.min(MAX_PAGE_SIZE);
        let offset = page.saturating_sub(1).saturating_mul(page_size);

        let ledgers: Vec<Arc<Mutex<RoomLedger>>> = self
            .rooms
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut entries = Vec::new();
        for ledger in ledgers {
            let ledger = ledger.lock().await;
            let Some(player) = ledger.players.iter().find(|p| p.user_id() == user_id) else {
                continue;
            };
            entries.push(UserRoomEntry {
                room: ledger.room.clone(),
                current_score: player.current_score,
                final_score: player.final_score,
                player_count: ledger.players.len(),
                transfer_count: ledger.transfers.len(),
            });
        }

        // 생성 시각이 같으면 나중에 만든 방이 먼저
        entries.sort_by(|a, b| {
            b.room
                .created_at
                .cmp(&a.room.created_at)
                .then(b.room.id.cmp(&a.room.id))
        });

        Ok(entries.into_iter().skip(offset).take(page_size).collect())
    }

    async fn begin(&self, room_id: RoomId) -> Result<Box<dyn LedgerTx>, StoreError> {
        let guard = self.ledger(room_id)?.lock_owned().await;
        let work = (*guard).clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

/// 방 잠금을 잡은 채 사본에 변경을 쌓는 트랜잭션
struct MemoryTx {
    guard: OwnedMutexGuard<RoomLedger>,
    work: RoomLedger,
    fail_commit: bool,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    fn room(&self) -> &Room {
        &self.work.room
    }

    async fn player(&mut self, user_id: UserId) -> Result<Option<PlayerBalance>, StoreError> {
        Ok(self
            .work
            .players
            .iter()
            .find(|p| p.user_id() == user_id)
            .cloned())
    }

    async fn balances(&mut self) -> Result<Vec<PlayerBalance>, StoreError> {
        Ok(self.work.players.clone())
    }

    async fn insert_player(&mut self, profile: PlayerProfile) -> Result<bool, StoreError> {
        if self.work.has_player(profile.user_id) {
            return Ok(false);
        }
        let room_id = self.work.room.id;
        self.work
            .players
            .push(PlayerBalance::new(room_id, profile, unix_now()));
        Ok(true)
    }

    async fn adjust(&mut self, user_id: UserId, delta: i64) -> Result<i64, StoreError> {
        let player = self.work.player_mut(user_id)?;
        player.current_score = player
            .current_score
            .checked_add(delta)
            .ok_or_else(|| {
                StoreError::Backend(format!("score overflow for player {user_id}"))
            })?;
        Ok(player.current_score)
    }

    async fn update_profile(
        &mut self,
        profile: PlayerProfile,
    ) -> Result<PlayerBalance, StoreError> {
        let player = self.work.player_mut(profile.user_id)?;
        player.profile = profile;
        Ok(player.clone())
    }

    async fn rename_room(&mut self, name: &str) -> Result<(), StoreError> {
        self.work.room.name = name.to_string();
        Ok(())
    }

    async fn append_transfer(&mut self, transfer: Transfer) -> Result<(), StoreError> {
        self.work.transfers.push(transfer);
        Ok(())
    }

    async fn set_final_score(&mut self, user_id: UserId, score: i64) -> Result<(), StoreError> {
        self.work.player_mut(user_id)?.final_score = score;
        Ok(())
    }

    async fn mark_settled(&mut self, settled_at: u64) -> Result<(), StoreError> {
        self.work.room.status = RoomStatus::Settled;
        self.work.room.settled_at = Some(settled_at);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Backend("commit rejected".to_string()));
        }
        let tx = *self;
        let mut guard = tx.guard;
        *guard = tx.work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(user_id: UserId) -> PlayerProfile {
        PlayerProfile {
            user_id,
            nickname: format!("player-{user_id}"),
            avatar_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_room_adds_creator() {
        let store = MemoryStore::new();
        let room = store.create_room("friday", profile(1)).await.unwrap();

        assert_eq!(room.code.len(), 16);
        assert!(room.is_open());
        assert_eq!(store.room_by_code(&room.code).await.unwrap().id, room.id);

        let players = store.balances(room.id).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].user_id(), 1);
        assert_eq!(players[0].current_score, 0);
    }

    #[tokio::test]
    async fn test_room_codes_unique() {
        let store = MemoryStore::new();
        let a = store.create_room("a", profile(1)).await.unwrap();
        let b = store.create_room("b", profile(1)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.code, b.code);
    }

    #[test]
    fn test_code_reservation_moves_past_exhausted_millisecond() {
        let store = MemoryStore::new();
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis();
        for suffix in 0..1000 {
            store.codes.insert(format!("{millis}{suffix:03}"), 0);
        }

        let code = store.reserve_code(1);
        assert_eq!(code.len(), 16);
        assert!(!code.starts_with(&millis.to_string()));
        assert_eq!(store.codes.get(&code).map(|entry| *entry.value()), Some(1));
    }

    #[tokio::test]
    async fn test_uncommitted_tx_rolls_back() {
        let store = MemoryStore::new();
        let room = store.create_room("r", profile(1)).await.unwrap();

        {
            let mut tx = store.begin(room.id).await.unwrap();
            assert!(tx.insert_player(profile(2)).await.unwrap());
            tx.adjust(1, 10).await.unwrap();
        }

        let players = store.balances(room.id).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].current_score, 0);
    }

    #[tokio::test]
    async fn test_commit_applies_all_changes() {
        let store = MemoryStore::new();
        let room = store.create_room("r", profile(1)).await.unwrap();

        let mut tx = store.begin(room.id).await.unwrap();
        tx.insert_player(profile(2)).await.unwrap();
        assert!(!tx.insert_player(profile(2)).await.unwrap());
        assert_eq!(tx.adjust(2, -30).await.unwrap(), -30);
        tx.commit().await.unwrap();

        let players = store.balances(room.id).await.unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[1].current_score, -30);
    }

    #[tokio::test]
    async fn test_failed_commit_discards_changes() {
        let store = MemoryStore::new();
        let room = store.create_room("r", profile(1)).await.unwrap();
        store.fail_commits(true);

        let mut tx = store.begin(room.id).await.unwrap();
        tx.adjust(1, 5).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Backend(_))));

        assert_eq!(store.balances(room.id).await.unwrap()[0].current_score, 0);
    }

    #[tokio::test]
    async fn test_rooms_for_user_newest_first_and_paged() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let room = store
                .create_room(&format!("r{i}"), profile(1))
                .await
                .unwrap();
            ids.push(room.id);
        }
        store.create_room("other", profile(2)).await.unwrap();

        let mut tx = store.begin(ids[1]).await.unwrap();
        tx.insert_player(profile(2)).await.unwrap();
        tx.adjust(1, 40).await.unwrap();
        tx.adjust(2, -40).await.unwrap();
        tx.append_transfer(Transfer {
            room_id: ids[1],
            from_user_id: 2,
            to_user_id: 1,
            amount: 40,
            kind: crate::ledger::TransferKind::Play,
            created_at: unix_now(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let all = store.rooms_for_user(1, 1, 10).await.unwrap();
        let order: Vec<RoomId> = all.iter().map(|e| e.room.id).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
        assert_eq!(all[1].current_score, 40);
        assert_eq!(all[1].player_count, 2);
        assert_eq!(all[1].transfer_count, 1);

        let second = store.rooms_for_user(1, 2, 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].room.id, ids[0]);
        assert!(store.rooms_for_user(1, 3, 2).await.unwrap().is_empty());

        let guest = store.rooms_for_user(2, 1, 10).await.unwrap();
        assert_eq!(guest.len(), 2);
        assert_eq!(guest[1].current_score, -40);
        assert!(store.rooms_for_user(9, 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rooms_for_user_page_size_capped() {
        let store = MemoryStore::new();
        for i in 0..(MAX_PAGE_SIZE + 5) {
            store
                .create_room(&format!("r{i}"), profile(1))
                .await
                .unwrap();
        }

        let page = store.rooms_for_user(1, 1, 500).await.unwrap();
        assert_eq!(page.len(), MAX_PAGE_SIZE);
        let rest = store.rooms_for_user(1, 2, 500).await.unwrap();
        assert_eq!(rest.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_room_and_player() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.begin(42).await.err(),
            Some(StoreError::RoomNotFound(42))
        ));

        let room = store.create_room("r", profile(1)).await.unwrap();
        let mut tx = store.begin(room.id).await.unwrap();
        assert!(tx.player(9).await.unwrap().is_none());
        assert!(matches!(
            tx.adjust(9, 1).await,
            Err(StoreError::PlayerNotFound { user_id: 9, .. })
        ));
    }
}
