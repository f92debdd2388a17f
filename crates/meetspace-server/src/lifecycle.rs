//! Connection lifecycle: the single writer of the peer registry.
//!
//! Every connect, inbound frame, and disconnect funnels through one channel
//! into [`run`], so events of one connection are handled in arrival order and
//! registry writes never interleave. Only the URL adapter runs off this task.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use meetspace_core::protocol::{self, ClientEvent, ServerEvent};
use meetspace_core::{ConnectionId, PoseUpdate, SuggestError, UrlSuggester};
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connections::ConnectionRegistry;
use crate::registry::PeerRegistry;
use crate::relay::SignalRelay;

/// Events fed to the lifecycle task by the transport.
#[derive(Debug)]
pub enum Inbound {
    Connected(ConnectionId),
    Message(ConnectionId, String),
    Disconnected(ConnectionId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closed => "closed",
        })
    }
}

pub struct Lifecycle {
    peers: Arc<PeerRegistry>,
    connections: Arc<ConnectionRegistry>,
    relay: SignalRelay,
    suggester: Arc<dyn UrlSuggester>,
    suggest_timeout: Duration,
    states: HashMap<ConnectionId, ConnectionState>,
}

impl Lifecycle {
    pub fn new(
        peers: Arc<PeerRegistry>,
        connections: Arc<ConnectionRegistry>,
        suggester: Arc<dyn UrlSuggester>,
        suggest_timeout: Duration,
    ) -> Self {
        let relay = SignalRelay::new(Arc::clone(&peers), Arc::clone(&connections));
        Self {
            peers,
            connections,
            relay,
            suggester,
            suggest_timeout,
            states: HashMap::new(),
        }
    }

    /// Unknown ids report `Closed`: they either left or never arrived.
    pub fn state(&self, id: &ConnectionId) -> ConnectionState {
        self.states
            .get(id)
            .copied()
            .unwrap_or(ConnectionState::Closed)
    }

    fn transition(&mut self, id: &ConnectionId, to: ConnectionState) {
        let from = self.state(id);
        debug!(peer_id = %id, %from, %to, "connection state");
        match to {
            ConnectionState::Closed => {
                self.states.remove(id);
            }
            _ => {
                self.states.insert(id.clone(), to);
            }
        }
    }

    pub fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Connected(id) => self.on_connect(id),
            Inbound::Message(id, raw) => self.on_message(&id, &raw),
            Inbound::Disconnected(id) => self.on_disconnect(&id),
        }
    }

    fn on_connect(&mut self, id: ConnectionId) {
        if self.state(&id) != ConnectionState::Closed || self.peers.contains(&id) {
            warn!(peer_id = %id, "duplicate connect ignored");
            return;
        }
        self.transition(&id, ConnectionState::Connecting);
        self.peers.register(&id);

        let mut snapshot = self.peers.snapshot();
        snapshot.poses.remove(&id);
        self.connections
            .send_event(&id, &ServerEvent::Introduction(&snapshot.poses));
        self.connections
            .send_event(&id, &ServerEvent::Usernames(&snapshot.names));
        self.connections.mark_ready(&id);
        self.connections
            .broadcast_event(&ServerEvent::NewPeerConnected(&id), Some(&id));

        self.transition(&id, ConnectionState::Active);
        info!(peer_id = %id, peers = self.peers.len(), "peer joined");
    }

    fn on_disconnect(&mut self, id: &ConnectionId) {
        if self.state(id) == ConnectionState::Closed {
            debug!(peer_id = %id, "disconnect for unknown connection");
            return;
        }
        self.transition(id, ConnectionState::Closed);
        self.peers.remove(id);

        self.connections
            .broadcast_event(&ServerEvent::PeerDisconnected(id), Some(id));
        let names = self.peers.snapshot_names();
        self.connections
            .broadcast_event(&ServerEvent::Usernames(&names), Some(id));
        info!(peer_id = %id, peers = self.peers.len(), "peer left");
    }

    fn on_message(&mut self, id: &ConnectionId, raw: &str) {
        if self.state(id) != ConnectionState::Active {
            debug!(peer_id = %id, "event from inactive connection dropped");
            return;
        }

        let event = match protocol::parse_client_event(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(peer_id = %id, error = %e, "dropping inbound frame");
                return;
            }
        };

        match event {
            ClientEvent::SetUsername(name) => self.set_username(id, name),
            ClientEvent::Move(update) => self.move_peer(id, &update),
            ClientEvent::Msg(data) => self.chat(id, &data),
            ClientEvent::Signal { to, data } => {
                // Dropped on failure; the originator owns retries.
                let _ = self.relay.relay(&to, id, &data);
            }
            ClientEvent::GenerateUrl(prompt) => self.generate_url(id, prompt),
        }
    }

    fn set_username(&self, id: &ConnectionId, name: Option<String>) {
        let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
            debug!(peer_id = %id, "empty username ignored");
            return;
        };
        if !self.peers.set_name(id, name) {
            return;
        }
        let names = self.peers.snapshot_names();
        self.connections
            .broadcast_event(&ServerEvent::Usernames(&names), None);
    }

    fn move_peer(&self, id: &ConnectionId, update: &PoseUpdate) {
        if update.is_empty() {
            debug!(peer_id = %id, "move without usable components");
            return;
        }
        // Picked up by the next broadcast tick.
        self.peers.update_pose(id, update);
    }

    fn chat(&self, id: &ConnectionId, data: &RawValue) {
        let sent = self
            .connections
            .broadcast_event(&ServerEvent::Msg { from: id, data }, Some(id));
        debug!(peer_id = %id, recipients = sent, "chat relayed");
    }

    fn generate_url(&self, id: &ConnectionId, prompt: Option<String>) {
        let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) else {
            self.connections
                .send_event(id, &ServerEvent::GeneratedUrl(None));
            return;
        };

        let id = id.clone();
        let suggester = Arc::clone(&self.suggester);
        let connections = Arc::clone(&self.connections);
        let timeout = self.suggest_timeout;

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, suggester.suggest(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(SuggestError::Timeout(timeout)),
            };

            let url = match outcome {
                Ok(Some(url)) => {
                    info!(peer_id = %id, suggester = suggester.name(), url = %url, "URL suggested");
                    Some(url)
                }
                Ok(None) => {
                    info!(peer_id = %id, suggester = suggester.name(), "no URL suggested");
                    None
                }
                Err(e) => {
                    warn!(
                        peer_id = %id,
                        suggester = suggester.name(),
                        error_kind = e.error_kind(),
                        error = %e,
                        "URL suggestion failed"
                    );
                    None
                }
            };

            if !connections.send_event(&id, &ServerEvent::GeneratedUrl(url.as_deref())) {
                debug!(peer_id = %id, "requester gone, suggestion dropped");
            }
        });
    }
}

/// Drive the lifecycle until every sender is gone.
pub async fn run(mut lifecycle: Lifecycle, mut rx: mpsc::Receiver<Inbound>) {
    while let Some(inbound) = rx.recv().await {
        lifecycle.handle(inbound);
    }
    info!("lifecycle channel closed");
}
