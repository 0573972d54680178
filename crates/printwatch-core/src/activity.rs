// ── Live-activity throttle ──
//
// Live-activity content updates ride every telemetry refresh, so they
// must be rate-limited per prefix. Terminal statuses bypass the limiter
// entirely: they send a distinct "end" push with a dismissal deadline
// and clear the registered activity token.
//
// Per-prefix channel state machine: NoActivity -> Active (client
// registers a token, outside this crate) -> NoActivity (the "end" push
// here).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::json;
use tokio::time::Instant;

use printwatch_api::push::LiveActivityEvent;

use crate::gateway::PushGateway;
use crate::model::DeviceState;
use crate::recipients::RecipientStore;

/// How long after the "end" push the client may keep the surface up.
const DISMISSAL_GRACE_MINS: i64 = 5;

/// Rate-limits and formats live-activity pushes.
pub struct LiveActivityThrottle<G> {
    gateway: Arc<G>,
    recipients: Arc<RecipientStore>,

    /// Minimum interval between content updates while a print is active.
    min_interval: Duration,

    /// Per-prefix instant of the last sent update.
    last_sent: DashMap<String, Instant>,
}

impl<G: PushGateway> LiveActivityThrottle<G> {
    pub fn new(gateway: Arc<G>, recipients: Arc<RecipientStore>, min_interval: Duration) -> Self {
        Self {
            gateway,
            recipients,
            min_interval,
            last_sent: DashMap::new(),
        }
    }

    /// Push the current state to the prefix's live activity, unless
    /// suppressed. Returns `true` if an update was actually sent.
    ///
    /// Suppression only applies while the print is `running`/`paused`;
    /// other statuses always flush immediately so the surface can
    /// dismiss promptly. Terminal statuses send the "end" push instead
    /// of a content update.
    pub async fn maybe_send(&self, prefix: &str, state: &DeviceState) -> bool {
        let Some(token) = self.recipients.live_activity_token(prefix) else {
            return false;
        };

        if state.status.is_terminal() {
            return self.end_activity(prefix, &token, state).await;
        }

        // Check-and-reserve the send slot in one entry operation, before
        // the outbound call, so overlapping refreshes can't double-send
        // inside one interval.
        let now = Instant::now();
        if state.status.is_active() {
            let suppressed = match self.last_sent.entry(prefix.to_owned()) {
                Entry::Occupied(mut entry) => {
                    if now.duration_since(*entry.get()) < self.min_interval {
                        true
                    } else {
                        entry.insert(now);
                        false
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(now);
                    false
                }
            };
            if suppressed {
                tracing::trace!(prefix, "live-activity update suppressed");
                return false;
            }
        } else {
            self.last_sent.insert(prefix.to_owned(), now);
        }

        let event = LiveActivityEvent::Update {
            content_state: content_state(state),
        };
        match self.gateway.deliver_live_activity(&token, &event).await {
            Ok(()) => {
                tracing::debug!(prefix, progress = state.progress_percent, "live-activity update");
                true
            }
            Err(e) => {
                tracing::warn!(prefix, error = %e, "live-activity update failed");
                false
            }
        }
    }

    /// Send the terminal "end" push and tear the channel down. The token
    /// is cleared even when the push fails -- the activity is over either
    /// way, and a fresh registration starts the next one.
    async fn end_activity(&self, prefix: &str, token: &str, state: &DeviceState) -> bool {
        let event = LiveActivityEvent::End {
            content_state: content_state(state),
            dismissal_date: Some(chrono::Utc::now() + chrono::Duration::minutes(DISMISSAL_GRACE_MINS)),
        };

        let sent = match self.gateway.deliver_live_activity(token, &event).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(prefix, error = %e, "live-activity end push failed");
                false
            }
        };

        if let Err(e) = self.recipients.clear_live_activity_token(prefix) {
            tracing::warn!(prefix, error = %e, "failed to clear live-activity token");
        }
        self.last_sent.remove(prefix);

        tracing::info!(prefix, status = %state.status, "live activity ended");
        sent
    }
}

/// The content-state payload rendered into every activity push.
fn content_state(state: &DeviceState) -> serde_json::Value {
    json!({
        "status": state.status,
        "progress": state.progress_percent,
        "currentLayer": state.current_layer,
        "totalLayers": state.total_layers,
        "remainingSecs": state.remaining_secs,
        "filename": state.subtask_name,
    })
}

// ── Tests ────────────────────────────────────────────────────────────
