//! 방 허브
//!
//! 하나의 태스크가 명령 큐를 순서대로 처리하면서 방별 뷰어 목록을 관리한다.
//! 뷰어 목록은 이 태스크 밖에서 절대 수정되지 않는다. 브로드캐스트는 각 뷰어의
//! 송신 큐에 `try_send` 로 넣기만 하며, 큐가 가득 찬 뷰어는 내보낸다.

use crate::ledger::{RoomId, RoomNotifier, UserId};
use crate::protocol::{EventPayload, RoomEvent};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// 직렬화된 이벤트 (뷰어끼리 공유)
pub type Frame = Arc<str>;

/// 뷰어 연결 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 허브에 등록되는 뷰어
///
/// 송신 큐의 생산자 쪽만 가진다. 허브가 이 값을 버리면 큐가 닫히고
/// 연결의 송신 펌프가 종료된다.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub id: ConnectionId,
    pub room_id: RoomId,
    pub user_id: UserId,
    queue: mpsc::Sender<Frame>,
}

impl Viewer {
    /// 새 뷰어와 송신 큐 수신 쪽 생성
    pub fn new(
        room_id: RoomId,
        user_id: UserId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (queue, frames) = mpsc::channel(capacity.max(1));
        let viewer = Self {
            id: ConnectionId(Uuid::new_v4()),
            room_id,
            user_id,
            queue,
        };
        (viewer, frames)
    }
}

/// 허브 현황
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
}

enum Command {
    Register(Viewer),
    Unregister(ConnectionId),
    Broadcast(RoomEvent),
    Stats(oneshot::Sender<HubStats>),
    RoomSize {
        room_id: RoomId,
        reply: oneshot::Sender<usize>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// 허브 핸들 (복제해서 공유)
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
}

impl Hub {
    /// 조정 태스크 시작
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(receiver));
        (Self { commands }, task)
    }

    pub fn register(&self, viewer: Viewer) {
        self.send(Command::Register(viewer));
    }

    /// 두 번 호출해도 안전
    pub fn unregister(&self, id: ConnectionId) {
        self.send(Command::Unregister(id));
    }

    pub fn broadcast(&self, event: RoomEvent) {
        self.send(Command::Broadcast(event));
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply));
        rx.await.unwrap_or_default()
    }

    /// 방에 연결된 뷰어 수
    pub async fn room_size(&self, room_id: RoomId) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RoomSize { room_id, reply });
        rx.await.unwrap_or_default()
    }

    /// 모든 뷰어 큐를 닫고 조정 태스크 종료
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        self.send(Command::Shutdown(done));
        let _ = rx.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Room hub stopped, command dropped");
        }
    }
}

impl RoomNotifier for Hub {
    fn notify(&self, room_id: RoomId, payload: EventPayload) {
        tracing::debug!(
            room_id = room_id,
            event = payload.kind(),
            "Queueing room event"
        );
        self.broadcast(RoomEvent::new(room_id, payload));
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut state = HubState::default();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register(viewer) => state.register(viewer),
            Command::Unregister(id) => state.unregister(id),
            Command::Broadcast(event) => state.broadcast(&event),
            Command::Stats(reply) => {
                let _ = reply.send(state.stats());
            }
            Command::RoomSize { room_id, reply } => {
                let _ = reply.send(state.rooms.get(&room_id).map_or(0, HashSet::len));
            }
            Command::Shutdown(done) => {
                state.drain();
                let _ = done.send(());
                break;
            }
        }
        state.flush_pending();
    }

    tracing::info!("Room hub stopped");
}

#[derive(Default)]
struct HubState {
    viewers: HashMap<ConnectionId, Viewer>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// 처리 도중 생긴 후속 이벤트 (player_left)
    pending: VecDeque<RoomEvent>,
}

impl HubState {
    fn register(&mut self, viewer: Viewer) {
        if self.viewers.contains_key(&viewer.id) {
            tracing::debug!(connection = %viewer.id, "Viewer already registered");
            return;
        }

        self.rooms
            .entry(viewer.room_id)
            .or_default()
            .insert(viewer.id);
        tracing::info!(
            connection = %viewer.id,
            room_id = viewer.room_id,
            user_id = viewer.user_id,
            total = self.viewers.len() + 1,
            "Viewer registered"
        );
        self.viewers.insert(viewer.id, viewer);
    }

    /// 뷰어를 제거하고 큐를 닫는다. 없는 뷰어면 아무것도 하지 않는다.
    fn unregister(&mut self, id: ConnectionId) {
        let Some(viewer) = self.viewers.remove(&id) else {
            return;
        };

        if let Some(members) = self.rooms.get_mut(&viewer.room_id) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(&viewer.room_id);
            }
        }

        if !self.is_present(viewer.room_id, viewer.user_id) {
            self.pending.push_back(RoomEvent::new(
                viewer.room_id,
                EventPayload::PlayerLeft {
                    user_id: viewer.user_id,
                },
            ));
        }

        tracing::info!(
            connection = %id,
            room_id = viewer.room_id,
            user_id = viewer.user_id,
            total = self.viewers.len(),
            "Viewer unregistered"
        );
    }

    fn is_present(&self, room_id: RoomId, user_id: UserId) -> bool {
        let Some(members) = self.rooms.get(&room_id) else {
            return false;
        };
        members
            .iter()
            .filter_map(|id| self.viewers.get(id))
            .any(|viewer| viewer.user_id == user_id)
    }

    fn broadcast(&mut self, event: &RoomEvent) {
        let Some(members) = self.rooms.get(&event.room_id) else {
            return;
        };

        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(
                    room_id = event.room_id,
                    error = %e,
                    "Failed to serialize room event"
                );
                return;
            }
        };

        let mut evicted = Vec::new();
        for id in members {
            let Some(viewer) = self.viewers.get(id) else {
                continue;
            };
            match viewer.queue.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection = %id,
                        room_id = event.room_id,
                        event = event.payload.kind(),
                        "Viewer queue full, dropping event and evicting"
                    );
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*id),
            }
        }

        for id in evicted {
            self.unregister(id);
        }
    }

    fn flush_pending(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            self.broadcast(&event);
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.viewers.len(),
            rooms: self.rooms.len(),
        }
    }

    fn drain(&mut self) {
        let closed = self.viewers.len();
        self.viewers.clear();
        self.rooms.clear();
        self.pending.clear();
        tracing::info!(closed = closed, "Room hub drained");
    }
}
