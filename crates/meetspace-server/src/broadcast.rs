//! Broadcast scheduler: periodic full-state push of every pose and name.

use std::sync::Arc;
use std::time::Duration;

use meetspace_core::protocol::ServerEvent;
use tokio::time::MissedTickBehavior;

use crate::connections::ConnectionRegistry;
use crate::registry::PeerRegistry;

pub struct BroadcastScheduler {
    peers: Arc<PeerRegistry>,
    connections: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl BroadcastScheduler {
    pub fn new(
        peers: Arc<PeerRegistry>,
        connections: Arc<ConnectionRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            peers,
            connections,
            interval,
        }
    }

    /// Push one `peers` and one `usernames` frame to every ready connection.
    /// Returns how many connections got the `peers` frame.
    pub fn tick(&self) -> usize {
        let snapshot = self.peers.snapshot();
        let sent = self
            .connections
            .broadcast_event(&ServerEvent::Peers(&snapshot.poses), None);
        self.connections
            .broadcast_event(&ServerEvent::Usernames(&snapshot.names), None);
        tracing::trace!(peers = snapshot.poses.len(), recipients = sent, "broadcast tick");
        sent
    }

    /// Run `tick` forever on the configured period.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick();
            }
        })
    }
}
