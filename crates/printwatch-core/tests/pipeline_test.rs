// End-to-end pipeline scenarios: hub messages in, push deliveries out.
//
// Drives a Monitor through `handle_message` with a recording gateway --
// no live hub, no live push transport.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::Value;

use printwatch_api::Error;
use printwatch_api::hub::{EntityState, HubMessage, RawEvent};
use printwatch_api::push::{LiveActivityEvent, Notification};
use printwatch_core::{
    EventPreferences, Monitor, MonitorConfig, PrintHistory, PushGateway, RecipientStore,
    RegisteredRecipient,
};

// ── Recording gateway ───────────────────────────────────────────────

#[derive(Default)]
struct RecordingGateway {
    delivered: Mutex<Vec<(String, Notification)>>,
    activity: Mutex<Vec<(String, LiveActivityEvent)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingGateway {
    fn fail_token(&self, token: &str) {
        self.failing.lock().expect("lock").insert(token.to_owned());
    }

    fn delivered(&self) -> Vec<(String, Notification)> {
        self.delivered.lock().expect("lock").clone()
    }

    fn titles(&self) -> Vec<String> {
        self.delivered().into_iter().map(|(_, n)| n.title).collect()
    }

    fn activity_events(&self) -> Vec<(String, LiveActivityEvent)> {
        self.activity.lock().expect("lock").clone()
    }
}

impl PushGateway for RecordingGateway {
    async fn deliver(&self, device_token: &str, notification: &Notification) -> Result<(), Error> {
        if self.failing.lock().expect("lock").contains(device_token) {
            return Err(Error::BadDeviceToken {
                reason: "Unregistered".into(),
            });
        }
        self.delivered
            .lock()
            .expect("lock")
            .push((device_token.to_owned(), notification.clone()));
        Ok(())
    }

    async fn deliver_live_activity(
        &self,
        activity_token: &str,
        event: &LiveActivityEvent,
    ) -> Result<(), Error> {
        self.activity
            .lock()
            .expect("lock")
            .push((activity_token.to_owned(), event.clone()));
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    gateway: Arc<RecordingGateway>,
    recipients: Arc<RecipientStore>,
    monitor: Monitor<RecordingGateway>,
}

fn harness(recipients: Vec<RegisteredRecipient>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        RecipientStore::load(dir.path().join("recipients.json")).expect("recipient store"),
    );
    for r in recipients {
        store.register(r).expect("register");
    }

    let gateway = Arc::new(RecordingGateway::default());
    let config = MonitorConfig::new(
        "test-hub",
        "ws://hub.local:8123/api/websocket".parse().expect("url"),
        SecretString::from("token".to_owned()),
    );
    let history = PrintHistory::open(dir.path().join("history.jsonl"));
    let monitor = Monitor::new(config, Arc::clone(&gateway), Arc::clone(&store), history);

    Harness {
        _dir: dir,
        gateway,
        recipients: store,
        monitor,
    }
}

fn status_event(prefix: &str, old: Option<&str>, new: &str) -> HubMessage {
    HubMessage::StateChanged(RawEvent {
        entity_id: format!("sensor.{prefix}_print_status"),
        old_value: old.map(ToOwned::to_owned),
        new_value: Some(new.to_owned()),
        attributes: Value::Null,
    })
}

fn progress_event(prefix: &str, progress: u8) -> HubMessage {
    HubMessage::StateChanged(RawEvent {
        entity_id: format!("sensor.{prefix}_print_progress"),
        old_value: None,
        new_value: Some(progress.to_string()),
        attributes: Value::Null,
    })
}

fn snapshot(entries: &[(&str, &str)]) -> HubMessage {
    HubMessage::Snapshot(
        entries
            .iter()
            .map(|(entity_id, state)| EntityState {
                entity_id: (*entity_id).to_owned(),
                state: (*state).to_owned(),
                attributes: Value::Null,
                last_updated: None,
            })
            .collect(),
    )
}

/// Let spawned dispatch tasks drain.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn full_print_lifecycle_notifies_start_pause_complete() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);

    for (old, new) in [
        (Some("idle"), "running"),
        (Some("running"), "pause"),
        (Some("pause"), "running"),
        (Some("running"), "finish"),
    ] {
        h.monitor.handle_message(&status_event("h2s", old, new));
        settle().await;
    }

    let titles = h.gateway.titles();
    assert_eq!(
        titles,
        vec![
            "Print Started 🖨️",
            "Print Paused ⏸️",
            "Print Complete ✅",
        ],
        "resume must not notify"
    );
}

#[tokio::test]
async fn progress_sequence_crosses_each_milestone_once() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);

    h.monitor.handle_message(&status_event("h2s", Some("idle"), "running"));
    settle().await;

    for p in [10u8, 26, 40, 51, 80] {
        h.monitor.handle_message(&progress_event("h2s", p));
        settle().await;
    }

    let milestone_titles: Vec<String> = h
        .gateway
        .titles()
        .into_iter()
        .filter(|t| t.contains('%'))
        .collect();
    assert_eq!(
        milestone_titles,
        vec![
            "Print 25% Complete",
            "Print 50% Complete",
            "Print 75% Complete",
        ]
    );
}

#[tokio::test]
async fn fresh_start_rearms_milestones() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);

    h.monitor.handle_message(&status_event("h2s", Some("idle"), "running"));
    h.monitor.handle_message(&progress_event("h2s", 80));
    h.monitor.handle_message(&status_event("h2s", Some("running"), "finish"));
    settle().await;

    // Second print: 30% fires the 25 crossing again.
    h.monitor.handle_message(&status_event("h2s", Some("finish"), "running"));
    h.monitor.handle_message(&progress_event("h2s", 30));
    settle().await;

    let milestone_titles: Vec<String> = h
        .gateway
        .titles()
        .into_iter()
        .filter(|t| t.contains('%'))
        .collect();
    assert_eq!(
        milestone_titles,
        vec!["Print 25% Complete", "Print 25% Complete"]
    );
}

#[tokio::test]
async fn replayed_transition_event_notifies_once() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);

    let event = status_event("h2s", Some("idle"), "running");
    h.monitor.handle_message(&event);
    settle().await;
    // Hub re-announces the same state change.
    h.monitor.handle_message(&event);
    settle().await;

    assert_eq!(h.gateway.titles(), vec!["Print Started 🖨️"]);
}

#[tokio::test]
async fn failed_preference_gates_per_recipient() {
    let mut muted = RegisteredRecipient::new("muted-tok", "p1s");
    muted.preferences = EventPreferences {
        on_failed: false,
        ..EventPreferences::default()
    };
    let loud = RegisteredRecipient::new("loud-tok", "p1s");
    let h = harness(vec![muted, loud]);

    h.monitor.handle_message(&status_event("p1s", Some("idle"), "running"));
    h.monitor.handle_message(&status_event("p1s", Some("running"), "failed"));
    settle().await;

    let failed_deliveries: Vec<String> = h
        .gateway
        .delivered()
        .into_iter()
        .filter(|(_, n)| n.title == "Print Failed ⚠️")
        .map(|(token, _)| token)
        .collect();
    assert_eq!(failed_deliveries, vec!["loud-tok"]);
}

#[tokio::test]
async fn snapshot_seeds_state_without_notifying() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);

    // Daemon joins mid-print: snapshot shows a running print at 60%.
    h.monitor.handle_message(&snapshot(&[
        ("sensor.h2s_print_status", "running"),
        ("sensor.h2s_print_progress", "60"),
    ]));
    settle().await;

    assert!(
        h.gateway.delivered().is_empty(),
        "snapshots must not notify"
    );
    let state = h.monitor.current_state("h2s").expect("state cached");
    assert_eq!(state.progress_percent, 60);

    // Progress that was already passed before we joined stays silent...
    h.monitor.handle_message(&progress_event("h2s", 65));
    settle().await;
    assert!(h.gateway.delivered().is_empty());

    // ...but the next threshold fires normally.
    h.monitor.handle_message(&progress_event("h2s", 80));
    settle().await;
    assert_eq!(h.gateway.titles(), vec!["Print 75% Complete"]);
}

#[tokio::test]
async fn reconnect_snapshot_supersedes_missed_events() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);

    h.monitor.handle_message(&snapshot(&[
        ("sensor.h2s_print_status", "idle"),
        ("sensor.h2s_print_progress", "0"),
    ]));
    h.monitor.handle_message(&status_event("h2s", Some("idle"), "running"));
    settle().await;

    // Disconnect window: the print finished while we weren't looking.
    // The post-reconnect snapshot arrives before any further events.
    h.monitor.handle_message(&snapshot(&[
        ("sensor.h2s_print_status", "finish"),
        ("sensor.h2s_print_progress", "100"),
    ]));
    settle().await;

    let state = h.monitor.current_state("h2s").expect("state cached");
    assert_eq!(state.progress_percent, 100);

    // A fresh print after the gap is detected off the snapshot-restored
    // status, not the stale pre-disconnect one.
    h.monitor.handle_message(&status_event("h2s", Some("finish"), "running"));
    h.monitor.handle_message(&progress_event("h2s", 30));
    settle().await;

    let titles = h.gateway.titles();
    assert_eq!(
        titles,
        vec![
            "Print Started 🖨️",
            "Print Started 🖨️",
            "Print 25% Complete",
        ]
    );
}

#[tokio::test]
async fn terminal_status_ends_live_activity() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);
    h.recipients
        .set_live_activity_token("h2s", "activity-tok")
        .expect("set token");

    h.monitor.handle_message(&status_event("h2s", Some("idle"), "running"));
    settle().await;
    h.monitor.handle_message(&status_event("h2s", Some("running"), "failed"));
    settle().await;

    let events = h.gateway.activity_events();
    assert!(
        matches!(events.last(), Some((_, LiveActivityEvent::End { .. }))),
        "terminal status must end the live activity, got {events:?}"
    );
    assert!(h.recipients.live_activity_token("h2s").is_none());
}

#[tokio::test]
async fn bad_token_does_not_block_other_recipients() {
    let dead = RegisteredRecipient::new("dead-tok", "h2s");
    let live = RegisteredRecipient::new("live-tok", "h2s");
    let h = harness(vec![dead, live]);
    h.gateway.fail_token("dead-tok");

    h.monitor.handle_message(&status_event("h2s", Some("idle"), "running"));
    settle().await;

    let delivered = h.gateway.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, "live-tok");
}

#[tokio::test]
async fn unrecognized_entities_are_ignored() {
    let h = harness(vec![RegisteredRecipient::new("tok", "h2s")]);

    h.monitor.handle_message(&HubMessage::StateChanged(RawEvent {
        entity_id: "sensor.h2s_wifi_signal".into(),
        old_value: Some("-40".into()),
        new_value: Some("-42".into()),
        attributes: Value::Null,
    }));
    settle().await;

    assert!(h.gateway.delivered().is_empty());
    assert!(h.monitor.current_state("h2s").is_none());
}
