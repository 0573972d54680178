// Wire protocol for the hub websocket.
//
// The hub speaks a JSON message protocol: an in-band auth handshake,
// id-correlated request/response calls, and an asynchronous stream of
// state-change event envelopes. This module only models framing --
// entity semantics live in `printwatch-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Server -> client messages ────────────────────────────────────────

/// A message received from the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent by the hub immediately after the socket opens.
    AuthRequired {
        #[serde(default)]
        version: Option<String>,
    },

    /// The access token was accepted.
    AuthOk,

    /// The access token was rejected. Terminal.
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },

    /// Reply to an id-correlated request (subscribe, get_states).
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<WireError>,
    },

    /// An asynchronous event pushed on an active subscription.
    Event { id: u64, event: EventEnvelope },

    /// Keepalive reply.
    Pong { id: u64 },
}

/// Structured error payload inside a failed `Result`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Envelope around a subscribed event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The payload of a `state_changed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub old_state: Option<EntityState>,
    #[serde(default)]
    pub new_state: Option<EntityState>,
}

// ── Client -> server messages ────────────────────────────────────────

/// A message sent to the hub.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Auth handshake reply carrying the access token.
    Auth { access_token: String },

    /// Subscribe to an event feed.
    SubscribeEvents { id: u64, event_type: String },

    /// Request a full snapshot of all entity states.
    GetStates { id: u64 },
}

// ── Typed entity state ───────────────────────────────────────────────

/// The current state of one hub entity, as carried both in snapshot
/// results and inside `state_changed` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,

    /// Raw state value as the hub reports it (always a string).
    pub state: String,

    /// All entity attributes, kept raw -- consumers pick what they need.
    #[serde(default)]
    pub attributes: serde_json::Value,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A parsed state-change event, ready for the core pipeline.
///
/// Only envelope framing is stripped here; the values stay raw strings
/// because field interpretation (suffix matching, defensive numeric
/// parsing) is the cache's job.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub entity_id: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub attributes: serde_json::Value,
}

/// Extract a [`RawEvent`] from an event envelope, if it is a
/// `state_changed` event with a usable payload. Anything else (unknown
/// event types, malformed data) yields `None` and is dropped by the
/// caller after a debug log.
pub fn parse_state_changed(envelope: &EventEnvelope) -> Option<RawEvent> {
    if envelope.event_type != "state_changed" {
        return None;
    }

    let data: StateChangedData = match serde_json::from_value(envelope.data.clone()) {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!(error = %e, "malformed state_changed payload");
            return None;
        }
    };

    let attributes = data
        .new_state
        .as_ref()
        .map(|s| s.attributes.clone())
        .unwrap_or_default();

    Some(RawEvent {
        entity_id: data.entity_id,
        old_value: data.old_state.map(|s| s.state),
        new_value: data.new_state.map(|s| s.state),
        attributes,
    })
}

// ── Tests ────────────────────────────────────────────────────────────
