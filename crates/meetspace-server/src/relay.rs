//! Signaling relay: hands an opaque WebRTC handshake payload from one peer
//! to another without looking inside it.

use std::sync::Arc;

use meetspace_core::protocol::ServerEvent;
use meetspace_core::{ConnectionId, RelayError};
use serde_json::value::RawValue;

use crate::connections::ConnectionRegistry;
use crate::registry::PeerRegistry;

pub struct SignalRelay {
    peers: Arc<PeerRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl SignalRelay {
    pub fn new(peers: Arc<PeerRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        Self { peers, connections }
    }

    /// Deliver `payload` to `to`, tagged with `from`. Fire-and-forget: `Ok`
    /// means the target was registered, not that the frame reached it.
    pub fn relay(
        &self,
        to: &ConnectionId,
        from: &ConnectionId,
        payload: &RawValue,
    ) -> Result<(), RelayError> {
        if !self.peers.contains(to) {
            tracing::warn!(to = %to, from = %from, "signal target not found");
            return Err(RelayError::PeerNotFound(to.clone()));
        }

        let event = ServerEvent::Signal {
            to,
            from,
            data: payload,
        };
        if !self.connections.send_event(to, &event) {
            tracing::debug!(to = %to, from = %from, "signal target closed before delivery");
        }
        Ok(())
    }
}
