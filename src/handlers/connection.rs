//! 뷰어 연결 핸들러
//!
//! 연결마다 수신 펌프와 송신 펌프가 따로 돈다. 수신 펌프는 연결이 살아있는지만
//! 확인하고, 송신 펌프는 큐를 비우면서 유휴 시 ping 을 보낸다. 어느 한쪽이
//! 끝나면 다른 쪽도 멈추고 허브에서 등록 해제한다.

use crate::config::HubConfig;
use crate::hub::{Frame, Hub, Viewer};
use crate::ledger::{RoomId, UserId};
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};

/// 펌프 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// 허브가 큐를 닫음 (등록 해제/내보내기/종료)
    QueueClosed,
    PeerClosed,
    ReadFailed,
    WriteFailed,
    /// 읽기/쓰기 기한 초과
    DeadlineExceeded,
}

/// 펌프 타이밍 설정
#[derive(Debug, Clone, Copy)]
pub struct PumpTiming {
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl From<&HubConfig> for PumpTiming {
    fn from(config: &HubConfig) -> Self {
        Self {
            ping_interval: config.ping_interval,
            pong_wait: config.pong_wait,
            write_wait: config.write_wait,
        }
    }
}

/// 업그레이드된 소켓을 뷰어로 등록하고 연결이 끝날 때까지 처리
pub async fn serve_viewer(
    socket: WebSocket,
    hub: Hub,
    config: HubConfig,
    room_id: RoomId,
    user_id: UserId,
) {
    let (viewer, frames) = Viewer::new(room_id, user_id, config.queue_capacity);
    let connection = viewer.id;
    let timing = PumpTiming::from(&config);

    hub.register(viewer);

    let (sink, stream) = socket.split();
    let mut send_task = tokio::spawn(outbound_pump(sink, frames, timing));
    let mut recv_task = tokio::spawn(inbound_pump(stream, timing.pong_wait));

    let exit = tokio::select! {
        exit = &mut send_task => {
            recv_task.abort();
            exit
        }
        exit = &mut recv_task => {
            send_task.abort();
            exit
        }
    };

    hub.unregister(connection);

    tracing::debug!(
        connection = %connection,
        room_id = room_id,
        user_id = user_id,
        exit = ?exit.ok(),
        "Viewer connection closed"
    );
}

/// 연결 유지 확인용 수신 루프. 어떤 프레임이든 받으면 기한이 갱신된다.
pub async fn inbound_pump<St, E>(mut stream: St, pong_wait: Duration) -> PumpExit
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        match timeout(pong_wait, stream.next()).await {
            Err(_) => return PumpExit::DeadlineExceeded,
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return PumpExit::PeerClosed,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "Viewer read failed");
                return PumpExit::ReadFailed;
            }
            Ok(Some(Ok(_))) => {}
        }
    }
}

/// 큐의 이벤트를 소켓으로 보내는 루프
///
/// 쓰는 동안 쌓인 이벤트는 줄바꿈으로 이어서 한 프레임으로 보낸다.
pub async fn outbound_pump<S>(
    mut sink: S,
    mut frames: mpsc::Receiver<Frame>,
    timing: PumpTiming,
) -> PumpExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = interval_at(Instant::now() + timing.ping_interval, timing.ping_interval);

    loop {
        tokio::select! {
            next = frames.recv() => {
                let Some(first) = next else {
                    let _ = timeout(timing.write_wait, sink.send(Message::Close(None))).await;
                    return PumpExit::QueueClosed;
                };

                let mut batch = String::from(&*first);
                while let Ok(more) = frames.try_recv() {
                    batch.push('\n');
                    batch.push_str(&more);
                }

                let sent = write(&mut sink, Message::Text(batch), timing.write_wait).await;
                if let Err(exit) = sent {
                    return exit;
                }
                ticker.reset();
            }
            _ = ticker.tick() => {
                let ping = Message::Ping(Vec::new());
                if let Err(exit) = write(&mut sink, ping, timing.write_wait).await {
                    return exit;
                }
            }
        }
    }
}

async fn write<S>(sink: &mut S, message: Message, write_wait: Duration) -> Result<(), PumpExit>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(write_wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Viewer write failed");
            Err(PumpExit::WriteFailed)
        }
        Err(_) => Err(PumpExit::DeadlineExceeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::stream;
    use std::io;

    fn timing(ping_ms: u64) -> PumpTiming {
        PumpTiming {
            ping_interval: Duration::from_millis(ping_ms),
            pong_wait: Duration::from_millis(200),
            write_wait: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_outbound_coalesces_then_closes() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (queue, frames) = mpsc::channel::<Frame>(8);
        for text in ["a", "b", "c"] {
            queue.try_send(Frame::from(text)).unwrap();
        }
        drop(queue);

        let exit = outbound_pump(sink, frames, timing(10_000)).await;
        assert_eq!(exit, PumpExit::QueueClosed);

        match written.next().await {
            Some(Message::Text(text)) => assert_eq!(text, "a\nb\nc"),
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(matches!(written.next().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn test_outbound_pings_when_idle() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (queue, frames) = mpsc::channel::<Frame>(8);

        let pump = tokio::spawn(outbound_pump(sink, frames, timing(20)));

        let first = timeout(Duration::from_secs(2), written.next())
            .await
            .unwrap();
        assert!(matches!(first, Some(Message::Ping(_))));

        drop(queue);
        assert_eq!(pump.await.unwrap(), PumpExit::QueueClosed);
    }

    #[tokio::test]
    async fn test_outbound_stops_on_write_error() {
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        let (queue, frames) = mpsc::channel::<Frame>(8);
        queue.try_send(Frame::from("x")).unwrap();

        let exit = outbound_pump(sink, frames, timing(10_000)).await;
        assert_eq!(exit, PumpExit::WriteFailed);
    }

    #[tokio::test]
    async fn test_inbound_keeps_reading_until_close() {
        let frames = stream::iter(vec![
            Ok::<_, io::Error>(Message::Pong(Vec::new())),
            Ok(Message::Text("ignored".to_string())),
            Ok(Message::Close(None)),
        ]);
        assert_eq!(
            inbound_pump(frames, Duration::from_millis(200)).await,
            PumpExit::PeerClosed
        );
    }

    #[tokio::test]
    async fn test_inbound_read_error() {
        let frames = stream::iter(vec![Err::<Message, _>(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        ))]);
        assert_eq!(
            inbound_pump(frames, Duration::from_millis(200)).await,
            PumpExit::ReadFailed
        );
    }

    #[tokio::test]
    async fn test_inbound_deadline() {
        let frames = stream::pending::<Result<Message, io::Error>>();
        assert_eq!(
            inbound_pump(frames, Duration::from_millis(20)).await,
            PumpExit::DeadlineExceeded
        );
    }
}
