//! Hub event-stream client with auto-reconnect.
//!
//! Connects to the home-automation hub's websocket endpoint, performs the
//! in-band auth handshake, subscribes to the `state_changed` feed, and
//! streams parsed messages through a [`tokio::sync::broadcast`] channel.
//! Unexpected disconnects are retried with exponential backoff; a full
//! entity snapshot is fetched on every successful (re)connect and emitted
//! in-band *before* any incremental event, so consumers that apply
//! messages in order never act on events from a gap window.
//!
//! # Example
//!
//! ```rust,ignore
//! use printwatch_api::hub::{HubHandle, HubMessage, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let endpoint = Url::parse("ws://hub.local:8123/api/websocket")?;
//!
//! let handle = HubHandle::connect(endpoint, token, ReconnectConfig::default(), cancel.clone()).await?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(msg) = rx.recv().await {
//!     match &*msg {
//!         HubMessage::Snapshot(states) => println!("{} entities", states.len()),
//!         HubMessage::StateChanged(event) => println!("{}", event.entity_id),
//!         HubMessage::ConnectionExhausted => break,
//!     }
//! }
//!
//! handle.shutdown();
//! ```

pub mod protocol;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

pub use protocol::{EntityState, RawEvent};

// ── Channel capacities and timeouts ──────────────────────────────────

const MESSAGE_CHANNEL_CAPACITY: usize = 1024;
const COMMAND_CHANNEL_CAPACITY: usize = 16;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ── HubMessage ───────────────────────────────────────────────────────

/// A message from the hub connection, delivered in arrival order.
#[derive(Debug, Clone)]
pub enum HubMessage {
    /// Full entity-state snapshot, emitted after every successful
    /// (re)connect and before any incremental event from that session.
    Snapshot(Vec<EntityState>),

    /// One incremental `state_changed` event.
    StateChanged(RawEvent),

    /// Terminal: the reconnect budget is spent (or auth was revoked
    /// mid-life). No further messages follow.
    ConnectionExhausted,
}

// ── HubStatus ────────────────────────────────────────────────────────

/// Connection status observable through a `watch` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubStatus {
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted. Terminal.
    Exhausted,
    /// The hub rejected the token after a previously successful session.
    /// Terminal -- credentials must be re-supplied.
    AuthFailed,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for hub reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up. Default: 10.
    /// `None` means retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: Some(10),
        }
    }
}

// ── HubHandle ────────────────────────────────────────────────────────

/// Handle to a running hub connection.
///
/// Drop all receivers and call [`shutdown`](Self::shutdown) to tear down
/// the background task.
pub struct HubHandle {
    msg_rx: broadcast::Receiver<Arc<HubMessage>>,
    status_rx: watch::Receiver<HubStatus>,
    command_tx: mpsc::Sender<HubCommand>,
    cancel: CancellationToken,
}

enum HubCommand {
    RequestSnapshot(oneshot::Sender<Result<Vec<EntityState>, Error>>),
}

impl HubHandle {
    /// Connect to the hub and spawn the background session loop.
    ///
    /// The first connection and auth handshake happen inline, so an
    /// invalid credential fails here synchronously and is never retried.
    /// Transient failures on this first attempt also surface here --
    /// automatic reconnection only covers an established session.
    pub async fn connect(
        endpoint: Url,
        access_token: SecretString,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let session = open_session(&endpoint, &access_token).await?;
        tracing::info!(url = %endpoint, "hub connected");

        let (msg_tx, msg_rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(HubStatus::Connected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            hub_loop(
                session,
                endpoint,
                access_token,
                reconnect,
                msg_tx,
                status_tx,
                command_rx,
                task_cancel,
            )
            .await;
        });

        Ok(Self {
            msg_rx,
            status_rx,
            command_tx,
            cancel,
        })
    }

    /// Get a new broadcast receiver for the ordered message stream.
    ///
    /// Multiple consumers can subscribe concurrently. A consumer that
    /// falls behind receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HubMessage>> {
        self.msg_rx.resubscribe()
    }

    /// Subscribe to connection status changes.
    pub fn status(&self) -> watch::Receiver<HubStatus> {
        self.status_rx.clone()
    }

    /// Fetch a full entity-state snapshot over the live session.
    ///
    /// Unlike the automatic post-reconnect snapshot, the result is
    /// returned to the caller rather than broadcast.
    pub async fn request_snapshot(&self) -> Result<Vec<EntityState>, Error> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(HubCommand::RequestSnapshot(tx))
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Session establishment ────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct HubSession {
    stream: WsStream,
    next_id: u64,
}

impl HubSession {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn send(&mut self, msg: &protocol::ClientMessage) -> Result<(), Error> {
        let json = serde_json::to_string(msg).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        self.stream
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))
    }
}

/// Open a websocket session: connect, authenticate, subscribe.
///
/// An `auth_invalid` reply maps to [`Error::Authentication`] so callers
/// can distinguish it from transient connect failures.
async fn open_session(endpoint: &Url, access_token: &SecretString) -> Result<HubSession, Error> {
    tracing::debug!(url = %endpoint, "connecting to hub websocket");

    let uri: tungstenite::http::Uri = endpoint
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
    let request = ClientRequestBuilder::new(uri);

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let mut session = HubSession { stream, next_id: 1 };

    // Handshake step 1: hub announces auth_required.
    match recv_handshake_message(&mut session.stream).await? {
        protocol::ServerMessage::AuthRequired { version } => {
            tracing::debug!(hub_version = ?version, "auth required");
        }
        other => {
            return Err(Error::Handshake(format!(
                "expected auth_required, got {other:?}"
            )));
        }
    }

    // Handshake step 2: present the token.
    session
        .send(&protocol::ClientMessage::Auth {
            access_token: access_token.expose_secret().to_owned(),
        })
        .await?;

    match recv_handshake_message(&mut session.stream).await? {
        protocol::ServerMessage::AuthOk => {}
        protocol::ServerMessage::AuthInvalid { message } => {
            return Err(Error::Authentication {
                message: message.unwrap_or_else(|| "access token rejected".into()),
            });
        }
        other => {
            return Err(Error::Handshake(format!(
                "expected auth result, got {other:?}"
            )));
        }
    }

    // Handshake step 3: subscribe to the state-change feed.
    let sub_id = session.next_id();
    session
        .send(&protocol::ClientMessage::SubscribeEvents {
            id: sub_id,
            event_type: "state_changed".into(),
        })
        .await?;

    loop {
        match recv_handshake_message(&mut session.stream).await? {
            protocol::ServerMessage::Result {
                id,
                success,
                error,
                ..
            } if id == sub_id => {
                if success {
                    break;
                }
                return Err(Error::HubRequest {
                    message: error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "subscribe rejected".into()),
                });
            }
            // Events racing the subscribe ack are possible; skip them here,
            // the snapshot fetched right after supersedes anything missed.
            other => tracing::trace!(msg = ?other, "skipping frame during handshake"),
        }
    }

    Ok(session)
}

/// Read the next parseable text frame during the handshake, with a timeout.
async fn recv_handshake_message(stream: &mut WsStream) -> Result<protocol::ServerMessage, Error> {
    let deadline = tokio::time::sleep(HANDSHAKE_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                return Err(Error::Timeout {
                    timeout_secs: HANDSHAKE_TIMEOUT.as_secs(),
                });
            }
            frame = stream.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).map_err(|e| {
                        Error::Deserialization {
                            message: e.to_string(),
                            body: text.to_string(),
                        }
                    });
                }
                Some(Ok(tungstenite::Message::Close(_))) | None => {
                    return Err(Error::WebSocketConnect("closed during handshake".into()));
                }
                Some(Ok(_)) => {
                    // Ping/Pong/Binary -- ignore
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            }
        }
    }
}

// ── Background session loop ──────────────────────────────────────────

/// Main loop: run session → on error, backoff → reconnect → repeat.
#[allow(clippy::too_many_arguments)]
async fn hub_loop(
    first_session: HubSession,
    endpoint: Url,
    access_token: SecretString,
    reconnect: ReconnectConfig,
    msg_tx: broadcast::Sender<Arc<HubMessage>>,
    status_tx: watch::Sender<HubStatus>,
    mut command_rx: mpsc::Receiver<HubCommand>,
    cancel: CancellationToken,
) {
    let mut session = first_session;
    let mut attempt: u32 = 0;

    loop {
        match run_session(session, &msg_tx, &mut command_rx, &cancel).await {
            Ok(SessionEnd::HandleDropped) => {
                tracing::debug!("hub handle dropped, exiting");
                break;
            }
            Ok(SessionEnd::Disconnected) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::info!("hub disconnected cleanly, reconnecting");
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::warn!(error = %e, "hub session error");
            }
        }

        // Reconnect with backoff until a session is re-established or the
        // attempt budget is spent.
        session = loop {
            if let Some(max) = reconnect.max_attempts {
                if attempt >= max {
                    tracing::error!(max_attempts = max, "hub reconnection limit reached");
                    let _ = status_tx.send(HubStatus::Exhausted);
                    let _ = msg_tx.send(Arc::new(HubMessage::ConnectionExhausted));
                    return;
                }
            }

            let delay = calculate_backoff(attempt, &reconnect);
            let _ = status_tx.send(HubStatus::Reconnecting { attempt });
            tracing::info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "waiting before hub reconnect"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;

            match open_session(&endpoint, &access_token).await {
                Ok(s) => {
                    tracing::info!(attempt, "hub reconnected");
                    attempt = 0;
                    let _ = status_tx.send(HubStatus::Connected);
                    break s;
                }
                Err(e) if e.is_auth() => {
                    // The token was valid once and is no longer. Retrying
                    // cannot help; surface the terminal state.
                    tracing::error!(error = %e, "hub auth revoked, giving up");
                    let _ = status_tx.send(HubStatus::AuthFailed);
                    let _ = msg_tx.send(Arc::new(HubMessage::ConnectionExhausted));
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "hub reconnect failed");
                }
            }
        };
    }
}

enum SnapshotReply {
    /// Automatic post-connect snapshot: broadcast to all subscribers.
    Broadcast,
    /// Explicit `request_snapshot` call: returned to one caller.
    Reply(oneshot::Sender<Result<Vec<EntityState>, Error>>),
}

/// Why a session stopped without an error.
enum SessionEnd {
    /// The socket closed or was cancelled; reconnect applies.
    Disconnected,
    /// Every `HubHandle` is gone; nobody is left to reconnect for.
    HandleDropped,
}

/// Drive one established session until it drops.
///
/// Requests the post-connect snapshot first; because replies and events
/// travel the same socket and are relayed to one channel in arrival
/// order, the snapshot always reaches subscribers before any event that
/// the hub processed after it.
async fn run_session(
    mut session: HubSession,
    msg_tx: &broadcast::Sender<Arc<HubMessage>>,
    command_rx: &mut mpsc::Receiver<HubCommand>,
    cancel: &CancellationToken,
) -> Result<SessionEnd, Error> {
    let mut pending: HashMap<u64, SnapshotReply> = HashMap::new();

    let snap_id = session.next_id();
    session
        .send(&protocol::ClientMessage::GetStates { id: snap_id })
        .await?;
    pending.insert(snap_id, SnapshotReply::Broadcast);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionEnd::Disconnected),
            cmd = command_rx.recv() => match cmd {
                Some(HubCommand::RequestSnapshot(reply)) => {
                    let id = session.next_id();
                    if let Err(e) = session
                        .send(&protocol::ClientMessage::GetStates { id })
                        .await
                    {
                        let _ = reply.send(Err(Error::ConnectionClosed));
                        return Err(e);
                    }
                    pending.insert(id, SnapshotReply::Reply(reply));
                }
                None => return Ok(SessionEnd::HandleDropped),
            },
            frame = session.stream.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    handle_frame(text.as_str(), msg_tx, &mut pending);
                }
                Some(Ok(tungstenite::Message::Ping(_))) => {
                    // tungstenite answers pings automatically
                    tracing::trace!("hub ping");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(code = %cf.code, reason = %cf.reason, "hub close frame");
                    } else {
                        tracing::info!("hub close frame (no payload)");
                    }
                    return Ok(SessionEnd::Disconnected);
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => {
                    tracing::info!("hub stream ended");
                    return Ok(SessionEnd::Disconnected);
                }
                _ => {
                    // Binary, Pong, Frame -- ignore
                }
            }
        }
    }
}

// ── Frame handling ───────────────────────────────────────────────────

/// Parse one text frame and route it. Malformed frames are logged and
/// dropped; they never take down the session loop.
fn handle_frame(
    text: &str,
    msg_tx: &broadcast::Sender<Arc<HubMessage>>,
    pending: &mut HashMap<u64, SnapshotReply>,
) {
    let msg: protocol::ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable hub frame, dropping");
            return;
        }
    };

    match msg {
        protocol::ServerMessage::Event { event, .. } => {
            match protocol::parse_state_changed(&event) {
                Some(raw) => {
                    // Send errors just mean no active subscribers right now
                    let _ = msg_tx.send(Arc::new(HubMessage::StateChanged(raw)));
                }
                None => {
                    tracing::debug!(event_type = %event.event_type, "ignoring event");
                }
            }
        }
        protocol::ServerMessage::Result {
            id,
            success,
            result,
            error,
        } => {
            let Some(reply) = pending.remove(&id) else {
                tracing::debug!(id, "result for unknown request id");
                return;
            };
            let outcome = if success {
                parse_snapshot(result)
            } else {
                Err(Error::HubRequest {
                    message: error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "request failed".into()),
                })
            };
            match reply {
                SnapshotReply::Broadcast => match outcome {
                    Ok(states) => {
                        tracing::debug!(entities = states.len(), "post-connect snapshot received");
                        let _ = msg_tx.send(Arc::new(HubMessage::Snapshot(states)));
                    }
                    Err(e) => tracing::warn!(error = %e, "post-connect snapshot failed"),
                },
                SnapshotReply::Reply(tx) => {
                    let _ = tx.send(outcome);
                }
            }
        }
        protocol::ServerMessage::Pong { id } => tracing::trace!(id, "hub pong"),
        other => tracing::debug!(msg = ?other, "unexpected hub frame"),
    }
}

fn parse_snapshot(result: Option<serde_json::Value>) -> Result<Vec<EntityState>, Error> {
    let value = result.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff: `delay = min(initial * 2^attempt, max)`.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    Duration::from_secs_f64(base.min(config.max_delay.as_secs_f64()))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.max_attempts, Some(10));
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let config = ReconnectConfig::default();

        assert_eq!(calculate_backoff(0, &config), Duration::from_secs(1));
        assert_eq!(calculate_backoff(1, &config), Duration::from_secs(2));
        assert_eq!(calculate_backoff(2, &config), Duration::from_secs(4));
        assert_eq!(calculate_backoff(5, &config), Duration::from_secs(32));
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig::default();

        assert_eq!(calculate_backoff(6, &config), Duration::from_secs(60));
        assert_eq!(calculate_backoff(20, &config), Duration::from_secs(60));
    }

    #[test]
    fn handle_frame_routes_state_changed() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut pending = HashMap::new();

        let frame = serde_json::json!({
            "id": 1,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "sensor.h2s_print_progress",
                    "old_state": {"entity_id": "sensor.h2s_print_progress", "state": "10", "attributes": {}},
                    "new_state": {"entity_id": "sensor.h2s_print_progress", "state": "26", "attributes": {}}
                }
            }
        });

        handle_frame(&frame.to_string(), &tx, &mut pending);

        let msg = rx.try_recv().unwrap();
        let HubMessage::StateChanged(ref raw) = *msg else {
            panic!("expected StateChanged");
        };
        assert_eq!(raw.entity_id, "sensor.h2s_print_progress");
        assert_eq!(raw.new_value.as_deref(), Some("26"));
    }

    #[test]
    fn handle_frame_resolves_broadcast_snapshot() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut pending = HashMap::new();
        pending.insert(7, SnapshotReply::Broadcast);

        let frame = serde_json::json!({
            "id": 7,
            "type": "result",
            "success": true,
            "result": [
                {"entity_id": "sensor.h2s_print_status", "state": "running", "attributes": {}}
            ]
        });

        handle_frame(&frame.to_string(), &tx, &mut pending);

        assert!(pending.is_empty());
        let msg = rx.try_recv().unwrap();
        let HubMessage::Snapshot(ref states) = *msg else {
            panic!("expected Snapshot");
        };
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state, "running");
    }

    #[test]
    fn handle_frame_drops_malformed_json() {
        let (tx, mut rx) = broadcast::channel::<Arc<HubMessage>>(16);
        let mut pending = HashMap::new();

        handle_frame("not json at all", &tx, &mut pending);

        // Should not panic, should just log and skip
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn handle_frame_ignores_unknown_result_id() {
        let (tx, mut rx) = broadcast::channel::<Arc<HubMessage>>(16);
        let mut pending = HashMap::new();

        let frame = serde_json::json!({
            "id": 99,
            "type": "result",
            "success": true,
            "result": []
        });
        handle_frame(&frame.to_string(), &tx, &mut pending);

        assert!(rx.try_recv().is_err());
    }
}
