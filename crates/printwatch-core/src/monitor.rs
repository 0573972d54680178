// ── Monitor ──
//
// Full lifecycle management for one monitored hub: owns the hub
// connection, the per-device cache, transition detection, and the
// dispatch/throttle fan-out. One logical event loop per hub -- messages
// for a given prefix are processed strictly in arrival order, so the
// transitions derived from them reach subscribers in upstream order.
// Outbound pushes are spawned fire-and-forget; a hanging push transport
// can never stall state synchronization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use printwatch_api::hub::{HubHandle, HubMessage, HubStatus, RawEvent};

use crate::activity::LiveActivityThrottle;
use crate::config::MonitorConfig;
use crate::detect::TransitionDetector;
use crate::dispatch::NotificationDispatcher;
use crate::error::CoreError;
use crate::gateway::PushGateway;
use crate::history::{PrintHistory, PrintRecord};
use crate::model::{DeviceState, NotificationKind, StatusTransition};
use crate::recipients::RecipientStore;
use crate::store::{StateCache, TelemetryField, split_entity_id};

// ── Monitor ──────────────────────────────────────────────────────────

/// The main entry point for consumers: one `Monitor` per hub.
///
/// Cheaply cloneable via `Arc<MonitorInner>`. Multiple monitors run
/// independently; nothing mutable is shared across them except the
/// read-mostly recipient table.
pub struct Monitor<G> {
    inner: Arc<MonitorInner<G>>,
}

impl<G> Clone for Monitor<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct MonitorInner<G> {
    config: MonitorConfig,
    cache: StateCache,
    detector: TransitionDetector,
    dispatcher: NotificationDispatcher<G>,
    throttle: LiveActivityThrottle<G>,
    history: PrintHistory,

    /// When the in-flight print on each prefix started, for history
    /// duration bookkeeping.
    print_started: DashMap<String, DateTime<Utc>>,

    cancel: CancellationToken,
    /// Child token for the current connection -- cancelled on
    /// disconnect, replaced on the next connect.
    cancel_child: Mutex<CancellationToken>,
    hub: Mutex<Option<HubHandle>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<G: PushGateway> Monitor<G> {
    /// Create a monitor. Does NOT connect -- call
    /// [`connect()`](Self::connect) to open the event stream.
    pub fn new(
        config: MonitorConfig,
        gateway: Arc<G>,
        recipients: Arc<RecipientStore>,
        history: PrintHistory,
    ) -> Self {
        let detector = TransitionDetector::new(config.milestones.clone());
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&gateway),
            Arc::clone(&recipients),
            config.printer_names.clone(),
        );
        let throttle = LiveActivityThrottle::new(
            gateway,
            recipients,
            config.live_activity_interval,
        );
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(MonitorInner {
                config,
                cache: StateCache::new(),
                detector,
                dispatcher,
                throttle,
                history,
                print_started: DashMap::new(),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                hub: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the hub and start the event loop.
    ///
    /// The auth handshake happens inline: an invalid token fails here
    /// and is never retried. Returns the hub status watch so the owner
    /// can observe reconnects and the terminal exhausted/auth states.
    pub async fn connect(&self) -> Result<watch::Receiver<HubStatus>, CoreError> {
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let config = &self.inner.config;
        let handle = HubHandle::connect(
            config.endpoint.clone(),
            config.access_token.clone(),
            config.reconnect.clone(),
            child.clone(),
        )
        .await
        .map_err(|e| match e {
            printwatch_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            other => CoreError::ConnectionFailed {
                url: config.endpoint.to_string(),
                reason: other.to_string(),
            },
        })?;

        let status = handle.status();
        let messages = handle.subscribe();
        *self.inner.hub.lock().await = Some(handle);

        let inner = Arc::clone(&self.inner);
        *self.inner.task.lock().await = Some(tokio::spawn(event_loop(inner, messages, child)));

        info!(hub = %config.name, "monitor connected");
        Ok(status)
    }

    /// Disconnect from the hub and stop the event loop.
    pub async fn disconnect(&self) {
        self.inner.cancel_child.lock().await.cancel();

        if let Some(handle) = self.inner.hub.lock().await.take() {
            handle.shutdown();
        }
        if let Some(task) = self.inner.task.lock().await.take() {
            let _ = task.await;
        }

        debug!(hub = %self.inner.config.name, "monitor disconnected");
    }

    // ── Query surface ────────────────────────────────────────────────

    /// On-demand current state for one printer, for clients polling
    /// when push is unavailable.
    pub fn current_state(&self, prefix: &str) -> Option<Arc<DeviceState>> {
        self.inner.cache.get(prefix)
    }

    /// All known printer states.
    pub fn all_states(&self) -> Vec<Arc<DeviceState>> {
        self.inner.cache.get_all()
    }

    /// Subscribe to cache snapshot changes.
    pub fn subscribe_states(&self) -> watch::Receiver<Arc<Vec<Arc<DeviceState>>>> {
        self.inner.cache.subscribe()
    }

    // ── Message ingestion ────────────────────────────────────────────

    /// Feed one hub message through the pipeline.
    ///
    /// The event loop calls this for every received message; exposing it
    /// lets scenario tests drive the full pipeline without a live hub.
    pub fn handle_message(&self, msg: &HubMessage) {
        match msg {
            HubMessage::Snapshot(states) => apply_snapshot(&self.inner, states),
            HubMessage::StateChanged(event) => process_event(&self.inner, event),
            HubMessage::ConnectionExhausted => {
                error!(hub = %self.inner.config.name, "hub connection exhausted");
            }
        }
    }
}

// ── Event loop ───────────────────────────────────────────────────────

/// Consume hub messages strictly in arrival order. Only cache updates
/// and detection run inline; dispatch and live-activity sends are
/// spawned.
async fn event_loop<G: PushGateway>(
    inner: Arc<MonitorInner<G>>,
    mut messages: tokio::sync::broadcast::Receiver<Arc<HubMessage>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = messages.recv() => match result {
                Ok(msg) => match &*msg {
                    HubMessage::Snapshot(states) => apply_snapshot(&inner, states),
                    HubMessage::StateChanged(event) => process_event(&inner, event),
                    HubMessage::ConnectionExhausted => {
                        // Terminal: the owning supervisor decides what
                        // happens next (the status watch carries detail).
                        error!(hub = %inner.config.name, "hub connection exhausted");
                        break;
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(hub = %inner.config.name, skipped = n, "event loop lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    debug!(hub = %inner.config.name, "event loop exiting");
}

/// Apply a full snapshot: cache silently, then seed the detector's
/// progress marks so a daemon joining mid-print fires no stale
/// milestones. Snapshots never produce notifications -- they restore
/// state, events report change.
fn apply_snapshot<G: PushGateway>(
    inner: &Arc<MonitorInner<G>>,
    states: &[printwatch_api::hub::EntityState],
) {
    inner.cache.apply_snapshot(states);
    for device in inner.cache.get_all() {
        inner
            .detector
            .seed_progress(&device.prefix, device.progress_percent);
    }
    debug!(
        hub = %inner.config.name,
        devices = inner.cache.len(),
        "snapshot applied"
    );
}

/// Process one incremental state change.
fn process_event<G: PushGateway>(inner: &Arc<MonitorInner<G>>, event: &RawEvent) {
    // Unrecognized entities are not errors, just noise from the hub.
    let Some((prefix, field)) = split_entity_id(&event.entity_id) else {
        return;
    };
    // An entity disappearing (no new value) carries no telemetry.
    let Some(new_value) = event.new_value.as_deref() else {
        return;
    };

    let prev_status = inner.cache.get(prefix).map(|s| s.status);
    let state = inner.cache.apply(prefix, field, new_value);

    match field {
        TelemetryField::Status => {
            // The cache's previous status is the authoritative "old"
            // side: a hub re-announcement replaying an already-applied
            // transition then evaluates as a self-transition and stays
            // silent.
            let old = prev_status.unwrap_or_default();
            if let Some(transition) =
                inner
                    .detector
                    .evaluate_status(prefix, old, state.status, state.subtask_name.as_deref())
            {
                on_transition(inner, &transition, &state);
            }
        }
        TelemetryField::Progress => {
            if let Some(crossing) = inner.detector.evaluate_progress(
                prefix,
                state.progress_percent,
                state.subtask_name.as_deref(),
            ) {
                info!(
                    prefix,
                    milestone = crossing.milestone,
                    progress = crossing.progress_at_crossing,
                    "milestone crossed"
                );
                let inner = Arc::clone(inner);
                tokio::spawn(async move {
                    inner.dispatcher.on_milestone(&crossing).await;
                });
            }
        }
        _ => {}
    }

    // Live-activity content rides every telemetry refresh; the throttle
    // decides whether this one goes out.
    let inner = Arc::clone(inner);
    let prefix = prefix.to_owned();
    tokio::spawn(async move {
        inner.throttle.maybe_send(&prefix, &state).await;
    });
}

/// Handle an emitted transition: bookkeeping inline, dispatch spawned.
fn on_transition<G: PushGateway>(
    inner: &Arc<MonitorInner<G>>,
    transition: &StatusTransition,
    state: &DeviceState,
) {
    info!(
        prefix = %transition.prefix,
        old = %transition.old_status,
        new = %transition.new_status,
        "transition detected"
    );

    match transition.kind() {
        NotificationKind::Started => {
            inner
                .print_started
                .insert(transition.prefix.clone(), transition.observed_at);
        }
        NotificationKind::Completed | NotificationKind::Failed => {
            record_history(inner, transition, state);
        }
        _ => {}
    }

    let inner = Arc::clone(inner);
    let transition = transition.clone();
    tokio::spawn(async move {
        inner.dispatcher.on_status_transition(&transition).await;
    });
}

/// Append a finished print to the history log.
fn record_history<G: PushGateway>(
    inner: &Arc<MonitorInner<G>>,
    transition: &StatusTransition,
    state: &DeviceState,
) {
    let started_at = inner
        .print_started
        .remove(&transition.prefix)
        .map(|(_, at)| at);
    let duration_secs = started_at
        .map(|s| transition.observed_at - s)
        .and_then(|d| u64::try_from(d.num_seconds()).ok());

    let record = PrintRecord {
        prefix: transition.prefix.clone(),
        filename: transition.filename.clone(),
        outcome: transition.new_status,
        progress_at_end: state.progress_percent,
        started_at,
        ended_at: transition.observed_at,
        duration_secs,
    };

    if let Err(e) = inner.history.append(&record) {
        warn!(prefix = %transition.prefix, error = %e, "failed to record print history");
    }
}
