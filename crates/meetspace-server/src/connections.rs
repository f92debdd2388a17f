//! Open WebSocket connections and their outbound queues.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use meetspace_core::protocol::ServerEvent;
use meetspace_core::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::Inbound;

/// One encoded frame, shared by every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Ping cadence and liveness window for a connection.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

/// A connected WebSocket client.
pub struct Connection {
    pub id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    last_pong: AtomicU64,
    ready: AtomicBool,
}

impl Connection {
    fn new(id: ConnectionId, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            tx,
            last_pong: AtomicU64::new(now_millis()),
            ready: AtomicBool::new(false),
        }
    }

    /// Broadcasts skip a connection until it has been introduced.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_millis(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        u128::from(now_millis().saturating_sub(last)) < timeout.as_millis()
    }

    /// Non-blocking enqueue. A full queue drops the frame.
    fn push(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::warn!(
                    peer_id = %self.id,
                    frame_len = frame.len(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

fn now_millis() -> u64 {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn encode(event: &ServerEvent<'_>) -> Option<Frame> {
    match event.encode() {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "failed to encode event");
            None
        }
    }
}

/// Registry of all open connections. Knows nothing about poses or names.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Open a connection under a fresh id and return its outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.connections
            .insert(id.clone(), Arc::new(Connection::new(id.clone(), tx)));
        (id, rx)
    }

    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Let broadcasts reach this connection. Anything queued for it before
    /// this call is delivered ahead of the first broadcast.
    pub fn mark_ready(&self, id: &ConnectionId) -> bool {
        match self.connections.get(id) {
            Some(conn) => {
                conn.ready.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Queue a frame for one connection. `false` if it is gone or backed up.
    pub fn send_to(&self, id: &ConnectionId, frame: Frame) -> bool {
        match self.get(id) {
            Some(conn) => conn.push(frame),
            None => false,
        }
    }

    pub fn send_event(&self, id: &ConnectionId, event: &ServerEvent<'_>) -> bool {
        match encode(event) {
            Some(frame) => self.send_to(id, frame),
            None => false,
        }
    }

    /// Queue a frame for every ready connection except `except`.
    /// Returns the number of connections it was queued for.
    pub fn broadcast(&self, frame: &Frame, except: Option<&ConnectionId>) -> usize {
        // Collect first so no shard lock is held while pushing.
        let targets: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .filter(|entry| Some(entry.key()) != except && entry.value().is_ready())
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        targets
            .iter()
            .filter(|conn| conn.push(Arc::clone(frame)))
            .count()
    }

    pub fn broadcast_event(&self, event: &ServerEvent<'_>, except: Option<&ConnectionId>) -> usize {
        match encode(event) {
            Some(frame) => self.broadcast(&frame, except),
            None => 0,
        }
    }
}

/// Pump one WebSocket: outbound frames and pings on one side, inbound text
/// frames into the lifecycle channel on the other. Returns when either side
/// ends or the peer stops answering pings.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection: Arc<Connection>,
    mut rx: mpsc::Receiver<Frame>,
    inbound: mpsc::Sender<Inbound>,
    heartbeat: Heartbeat,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_conn = Arc::clone(&connection);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat.interval);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !writer_conn.is_alive(heartbeat.timeout) {
                        tracing::info!(peer_id = %writer_conn.id, "no pong within timeout, closing");
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(peer_id = %writer_conn.id, "sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader_conn = Arc::clone(&connection);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let event = Inbound::Message(reader_conn.id.clone(), text.to_string());
                    if inbound.send(event).await.is_err() {
                        break;
                    }
                }
                WsMessage::Pong(_) => reader_conn.record_pong(),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    first_to_finish(writer, reader).await;
}

/// Wait for either task, then abort and reap the other so neither half of
/// the socket outlives the connection.
async fn first_to_finish(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    let other = tokio::select! {
        _ = &mut a => b,
        _ = &mut b => a,
    };
    other.abort();
    let _ = other.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Frame {
        Frame::from(s)
    }

    fn ready(registry: &ConnectionRegistry) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let (id, rx) = registry.register();
        registry.mark_ready(&id);
        (id, rx)
    }

    #[test]
    fn register_and_unregister() {
        let registry = ConnectionRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_ne!(id1, id2);
        assert_eq!(registry.count(), 2);

        assert!(registry.unregister(&id1));
        assert!(!registry.unregister(&id1));
        assert!(!registry.is_open(&id1));
        assert!(registry.is_open(&id2));
    }

    #[tokio::test]
    async fn send_to_specific_connection() {
        let registry = ConnectionRegistry::new(32);
        let (id, mut rx) = registry.register();

        assert!(registry.send_to(&id, frame("hello")));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_to_unknown_connection() {
        let registry = ConnectionRegistry::new(32);
        assert!(!registry.send_to(&ConnectionId::new(), frame("x")));
    }

    #[test]
    fn full_queue_drops() {
        let registry = ConnectionRegistry::new(2);
        let (id, _rx) = registry.register();

        assert!(registry.send_to(&id, frame("1")));
        assert!(registry.send_to(&id, frame("2")));
        assert!(!registry.send_to(&id, frame("3")));
    }

    #[test]
    fn broadcast_skips_excluded() {
        let registry = ConnectionRegistry::new(32);
        let (a, mut rx_a) = ready(&registry);
        let (_b, mut rx_b) = ready(&registry);
        let (_c, mut rx_c) = ready(&registry);

        let sent = registry.broadcast(&frame("hi"), Some(&a));
        assert_eq!(sent, 2);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(&*rx_b.try_recv().unwrap(), "hi");
        assert_eq!(&*rx_c.try_recv().unwrap(), "hi");

        assert_eq!(registry.broadcast(&frame("all"), None), 3);
        assert_eq!(&*rx_a.try_recv().unwrap(), "all");
    }

    #[test]
    fn broadcast_skips_unready() {
        let registry = ConnectionRegistry::new(32);
        let (fresh, mut rx_fresh) = registry.register();
        let (_old, mut rx_old) = ready(&registry);

        assert_eq!(registry.broadcast(&frame("early"), None), 1);
        assert!(rx_fresh.try_recv().is_err());
        assert!(registry.send_to(&fresh, frame("intro")));

        assert!(registry.mark_ready(&fresh));
        assert_eq!(registry.broadcast(&frame("late"), None), 2);
        assert_eq!(&*rx_fresh.try_recv().unwrap(), "intro");
        assert_eq!(&*rx_fresh.try_recv().unwrap(), "late");
        assert_eq!(&*rx_old.try_recv().unwrap(), "early");
    }

    #[test]
    fn broadcast_with_no_connections() {
        let registry = ConnectionRegistry::new(32);
        assert_eq!(registry.broadcast(&frame("x"), None), 0);
    }

    #[test]
    fn send_event_encodes() {
        let registry = ConnectionRegistry::new(32);
        let (id, mut rx) = registry.register();
        assert!(registry.send_event(&id, &ServerEvent::GeneratedUrl(None)));
        assert_eq!(&*rx.try_recv().unwrap(), r#"{"event":"generatedURL","data":null}"#);
    }

    #[test]
    fn liveness_tracking() {
        let registry = ConnectionRegistry::new(32);
        let (id, _rx) = registry.register();
        let conn = registry.get(&id).unwrap();
        assert!(conn.is_alive(Duration::from_secs(90)));

        conn.last_pong.store(0, Ordering::Relaxed);
        assert!(!conn.is_alive(Duration::from_secs(90)));

        conn.record_pong();
        assert!(conn.is_alive(Duration::from_secs(90)));
    }

    #[test]
    fn liveness_window_below_one_second() {
        let registry = ConnectionRegistry::new(32);
        let (id, _rx) = registry.register();
        let conn = registry.get(&id).unwrap();
        assert!(conn.is_alive(Duration::from_millis(500)));

        conn.last_pong.store(now_millis() - 600, Ordering::Relaxed);
        assert!(!conn.is_alive(Duration::from_millis(500)));
        assert!(conn.is_alive(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn finished_pump_aborts_the_other() {
        let (held_tx, held_rx) = tokio::sync::oneshot::channel::<()>();
        let finishes = tokio::spawn(async {});
        let blocks = tokio::spawn(async move {
            let _held = held_tx;
            std::future::pending::<()>().await;
        });

        tokio::time::timeout(Duration::from_secs(5), first_to_finish(finishes, blocks))
            .await
            .expect("first_to_finish hung");
        // The pending task was dropped, taking its sender with it.
        assert!(held_rx.await.is_err());
    }

    #[tokio::test]
    async fn either_side_may_finish_first() {
        let (held_tx, held_rx) = tokio::sync::oneshot::channel::<()>();
        let blocks = tokio::spawn(async move {
            let _held = held_tx;
            std::future::pending::<()>().await;
        });
        let finishes = tokio::spawn(async {});

        first_to_finish(blocks, finishes).await;
        assert!(held_rx.await.is_err());
    }
}
