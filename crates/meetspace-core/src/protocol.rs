//! WebSocket wire protocol.
//!
//! Every frame is a JSON text envelope `{ "event": <name>, "data": <payload> }`.
//! Opaque payloads (`msg`, `signal`) are carried as [`RawValue`] so they are
//! forwarded byte-for-byte without ever being parsed into a tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::ids::ConnectionId;
use crate::pose::{Pose, PoseUpdate};

pub const SET_USERNAME: &str = "setUsername";
pub const MOVE: &str = "move";
pub const MSG: &str = "msg";
pub const SIGNAL: &str = "signal";
pub const GENERATE_URL: &str = "generateURL";

/// Failure to turn an inbound frame into a [`ClientEvent`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: &'static str, reason: String },
}

impl ProtocolError {
    fn malformed(event: &'static str, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            event,
            reason: reason.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<'a> {
    event: &'a str,
    #[serde(borrow, default)]
    data: Option<&'a RawValue>,
}

#[derive(Deserialize)]
struct SignalPayload {
    to: ConnectionId,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// A parsed client→server event.
#[derive(Debug)]
pub enum ClientEvent {
    /// `None` when the name is missing or not a string.
    SetUsername(Option<String>),
    /// Never rejected: whatever numeric components are present are kept.
    Move(PoseUpdate),
    Msg(Box<RawValue>),
    Signal { to: ConnectionId, data: Box<RawValue> },
    /// `None` when the prompt is missing or not a string.
    GenerateUrl(Option<String>),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetUsername(_) => SET_USERNAME,
            Self::Move(_) => MOVE,
            Self::Msg(_) => MSG,
            Self::Signal { .. } => SIGNAL,
            Self::GenerateUrl(_) => GENERATE_URL,
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_client_event(raw: &str) -> Result<ClientEvent, ProtocolError> {
    let envelope: Envelope<'_> =
        serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))?;

    match envelope.event {
        SET_USERNAME => Ok(ClientEvent::SetUsername(optional_string(envelope.data))),
        MOVE => Ok(ClientEvent::Move(parse_move(envelope.data))),
        MSG => Ok(ClientEvent::Msg(owned_or_null(envelope.data))),
        SIGNAL => {
            let data = envelope
                .data
                .ok_or_else(|| ProtocolError::malformed(SIGNAL, "missing data"))?;
            let payload: SignalPayload =
                serde_json::from_str(data.get()).map_err(|e| ProtocolError::malformed(SIGNAL, e))?;
            Ok(ClientEvent::Signal {
                to: payload.to,
                data: payload.data.unwrap_or_else(null_raw),
            })
        }
        GENERATE_URL => Ok(ClientEvent::GenerateUrl(optional_string(envelope.data))),
        other => Err(ProtocolError::UnknownEvent(other.to_string())),
    }
}

/// `[[x, y, z], [x, y, z, w]]`, read leniently: extra elements are ignored,
/// missing or non-numeric components are left unset.
fn parse_move(data: Option<&RawValue>) -> PoseUpdate {
    let value: Value = data
        .and_then(|raw| serde_json::from_str(raw.get()).ok())
        .unwrap_or(Value::Null);
    let mut update = PoseUpdate::default();
    fill_components(&mut update.position, &value[0]);
    fill_components(&mut update.rotation, &value[1]);
    update
}

fn fill_components(slots: &mut [Option<f64>], value: &Value) {
    if let Some(items) = value.as_array() {
        for (slot, item) in slots.iter_mut().zip(items) {
            *slot = item.as_f64();
        }
    }
}

fn optional_string(data: Option<&RawValue>) -> Option<String> {
    data.and_then(|raw| serde_json::from_str::<String>(raw.get()).ok())
}

fn owned_or_null(data: Option<&RawValue>) -> Box<RawValue> {
    data.map(RawValue::to_owned).unwrap_or_else(null_raw)
}

fn null_raw() -> Box<RawValue> {
    RawValue::NULL.to_owned()
}

/// A server→client event. Borrowed so one snapshot can be encoded once and
/// shared by every recipient.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent<'a> {
    Introduction(&'a BTreeMap<ConnectionId, Pose>),
    NewPeerConnected(&'a ConnectionId),
    PeerDisconnected(&'a ConnectionId),
    Usernames(&'a BTreeMap<ConnectionId, String>),
    Peers(&'a BTreeMap<ConnectionId, Pose>),
    Msg {
        from: &'a ConnectionId,
        data: &'a RawValue,
    },
    Signal {
        to: &'a ConnectionId,
        from: &'a ConnectionId,
        data: &'a RawValue,
    },
    #[serde(rename = "generatedURL")]
    GeneratedUrl(Option<&'a str>),
}

impl ServerEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Introduction(_) => "introduction",
            Self::NewPeerConnected(_) => "newPeerConnected",
            Self::PeerDisconnected(_) => "peerDisconnected",
            Self::Usernames(_) => "usernames",
            Self::Peers(_) => "peers",
            Self::Msg { .. } => "msg",
            Self::Signal { .. } => "signal",
            Self::GeneratedUrl(_) => "generatedURL",
        }
    }

    /// Encode as a wire frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
