// ── Notification dispatch ──
//
// Consumes detector events, looks up registered recipients and their
// per-event preferences, renders the fixed templates, and fans the
// deliveries out through the push gateway with bounded concurrency.
// At-most-once per observed transition; delivery itself is best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use uuid::Uuid;

use printwatch_api::push::Notification;

use crate::gateway::PushGateway;
use crate::model::{MilestoneCrossing, NotificationKind, RegisteredRecipient, StatusTransition};
use crate::recipients::RecipientStore;

/// Cap on parallel push calls per dispatch, so a large recipient list
/// cannot spawn unbounded concurrent requests.
const MAX_CONCURRENT_DELIVERIES: usize = 8;

// ── DeliveryReport ───────────────────────────────────────────────────

/// One failed delivery within a dispatch.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub recipient_id: Uuid,
    pub reason: String,
    /// The token itself is dead; the registration surface should prune it.
    pub bad_token: bool,
}

/// Per-recipient outcome of one dispatch. Partial failure is non-fatal:
/// it is logged here and never stops delivery to remaining recipients.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub kind: NotificationKind,
    pub prefix: String,
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    fn empty(kind: NotificationKind, prefix: &str) -> Self {
        Self {
            kind,
            prefix: prefix.to_owned(),
            attempted: 0,
            delivered: 0,
            failures: Vec::new(),
        }
    }
}

// ── NotificationDispatcher ───────────────────────────────────────────

/// Fans detector events out to registered recipients.
pub struct NotificationDispatcher<G> {
    gateway: Arc<G>,
    recipients: Arc<RecipientStore>,

    /// Friendly printer names keyed by prefix, for templates.
    printer_names: HashMap<String, String>,
}

impl<G: PushGateway> NotificationDispatcher<G> {
    pub fn new(
        gateway: Arc<G>,
        recipients: Arc<RecipientStore>,
        printer_names: HashMap<String, String>,
    ) -> Self {
        Self {
            gateway,
            recipients,
            printer_names,
        }
    }

    /// Dispatch a status transition to every opted-in recipient.
    pub async fn on_status_transition(&self, transition: &StatusTransition) -> DeliveryReport {
        let kind = transition.kind();
        let notification = self.render_status(transition, kind);
        self.fan_out(kind, &transition.prefix, notification).await
    }

    /// Dispatch a milestone crossing to every opted-in recipient.
    pub async fn on_milestone(&self, crossing: &MilestoneCrossing) -> DeliveryReport {
        let notification = self.render_milestone(crossing);
        self.fan_out(NotificationKind::Milestone, &crossing.prefix, notification)
            .await
    }

    // ── Templates ────────────────────────────────────────────────────

    fn printer_name<'a>(&'a self, prefix: &'a str) -> &'a str {
        self.printer_names
            .get(prefix)
            .map_or(prefix, String::as_str)
    }

    fn render_status(&self, t: &StatusTransition, kind: NotificationKind) -> Notification {
        let printer = self.printer_name(&t.prefix);
        let file = t.filename.as_deref().unwrap_or("Print job");

        let (title, body) = match t.new_status {
            crate::model::PrintStatus::Complete => (
                "Print Complete ✅".to_owned(),
                format!("{file} finished on {printer}"),
            ),
            crate::model::PrintStatus::Failed => (
                "Print Failed ⚠️".to_owned(),
                format!("{file} failed on {printer}"),
            ),
            crate::model::PrintStatus::Paused => (
                "Print Paused ⏸️".to_owned(),
                format!("{file} paused on {printer}"),
            ),
            _ => (
                "Print Started 🖨️".to_owned(),
                format!("{file} started on {printer}"),
            ),
        };

        Notification::new(title, body).with_custom(json!({
            "prefix": t.prefix,
            "kind": kind.to_string(),
        }))
    }

    fn render_milestone(&self, c: &MilestoneCrossing) -> Notification {
        let printer = self.printer_name(&c.prefix);
        let file = c.filename.as_deref().unwrap_or("Print job");

        Notification::new(
            format!("Print {}% Complete", c.milestone),
            format!("{file} is {}% done on {printer}", c.progress_at_crossing),
        )
        .with_custom(json!({
            "prefix": c.prefix,
            "kind": NotificationKind::Milestone.to_string(),
            "milestone": c.milestone,
        }))
    }

    // ── Fan-out ──────────────────────────────────────────────────────

    /// Deliver `notification` to every recipient of `prefix` whose
    /// preference flag for `kind` is enabled. Deliveries run with
    /// bounded concurrency; each failure is recorded and skipped.
    async fn fan_out(
        &self,
        kind: NotificationKind,
        prefix: &str,
        notification: Notification,
    ) -> DeliveryReport {
        let targets: Vec<RegisteredRecipient> = self
            .recipients
            .for_prefix(prefix)
            .into_iter()
            .filter(|r| r.preferences.enabled_for(kind))
            .collect();

        if targets.is_empty() {
            tracing::debug!(%kind, prefix, "no opted-in recipients");
            return DeliveryReport::empty(kind, prefix);
        }

        let mut report = DeliveryReport::empty(kind, prefix);
        report.attempted = targets.len();

        let gateway = Arc::clone(&self.gateway);
        let notification = &notification;

        let outcomes: Vec<(Uuid, Result<(), printwatch_api::Error>)> =
            futures_util::stream::iter(targets)
                .map(|recipient| {
                    let gateway = Arc::clone(&gateway);
                    async move {
                        let result = gateway.deliver(&recipient.push_token, notification).await;
                        (recipient.recipient_id, result)
                    }
                })
                .buffer_unordered(MAX_CONCURRENT_DELIVERIES)
                .collect()
                .await;

        for (recipient_id, result) in outcomes {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        %kind,
                        prefix,
                        %recipient_id,
                        error = %e,
                        "push delivery failed"
                    );
                    report.failures.push(DeliveryFailure {
                        recipient_id,
                        bad_token: e.is_bad_token(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            %kind,
            prefix,
            delivered = report.delivered,
            failed = report.failures.len(),
            "dispatch complete"
        );
        report
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{EventPreferences, PrintStatus};
    use crate::testing::RecordingGateway;
    use chrono::Utc;

    fn store_with(recipients: Vec<RegisteredRecipient>) -> (tempfile::TempDir, Arc<RecipientStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipientStore::load(dir.path().join("recipients.json")).unwrap();
        for r in recipients {
            store.register(r).unwrap();
        }
        (dir, Arc::new(store))
    }

    fn failed_transition(prefix: &str) -> StatusTransition {
        StatusTransition {
            prefix: prefix.to_owned(),
            old_status: PrintStatus::Running,
            new_status: PrintStatus::Failed,
            filename: Some("benchy.3mf".into()),
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn preference_flag_filters_recipients() {
        let mut muted = RegisteredRecipient::new("muted-token", "p1s");
        muted.preferences = EventPreferences {
            on_failed: false,
            ..EventPreferences::default()
        };
        let loud = RegisteredRecipient::new("loud-token", "p1s");

        let gateway = Arc::new(RecordingGateway::default());
        let (_dir, store) = store_with(vec![muted, loud]);
        let dispatcher = NotificationDispatcher::new(Arc::clone(&gateway), store, HashMap::new());

        let report = dispatcher
            .on_status_transition(&failed_transition("p1s"))
            .await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 1);
        let delivered = gateway.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "loud-token");
        assert_eq!(delivered[0].1.title, "Print Failed ⚠️");
        assert_eq!(delivered[0].1.body, "benchy.3mf failed on p1s");
    }

    #[tokio::test]
    async fn partial_failure_does_not_stop_other_deliveries() {
        let a = RegisteredRecipient::new("dead-token", "h2s");
        let b = RegisteredRecipient::new("live-token", "h2s");
        let a_id = a.recipient_id;

        let gateway = Arc::new(RecordingGateway::default());
        gateway.fail_token("dead-token");

        let (_dir, store) = store_with(vec![a, b]);
        let dispatcher = NotificationDispatcher::new(Arc::clone(&gateway), store, HashMap::new());

        let report = dispatcher
            .on_status_transition(&failed_transition("h2s"))
            .await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].recipient_id, a_id);
        assert!(report.failures[0].bad_token);
    }

    #[tokio::test]
    async fn recipients_of_other_prefixes_are_untouched() {
        let other = RegisteredRecipient::new("other-token", "x1c");

        let gateway = Arc::new(RecordingGateway::default());
        let (_dir, store) = store_with(vec![other]);
        let dispatcher = NotificationDispatcher::new(Arc::clone(&gateway), store, HashMap::new());

        let report = dispatcher
            .on_status_transition(&failed_transition("h2s"))
            .await;

        assert_eq!(report.attempted, 0);
        assert!(gateway.delivered().is_empty());
    }

    #[tokio::test]
    async fn milestone_template_carries_percentages() {
        let r = RegisteredRecipient::new("tok", "h2s");
        let gateway = Arc::new(RecordingGateway::default());
        let names = HashMap::from([("h2s".to_owned(), "Workshop H2S".to_owned())]);
        let (_dir, store) = store_with(vec![r]);
        let dispatcher = NotificationDispatcher::new(Arc::clone(&gateway), store, names);

        let crossing = MilestoneCrossing {
            prefix: "h2s".into(),
            milestone: 50,
            progress_at_crossing: 51,
            filename: Some("benchy.3mf".into()),
        };
        let report = dispatcher.on_milestone(&crossing).await;

        assert_eq!(report.delivered, 1);
        let delivered = gateway.delivered();
        assert_eq!(delivered[0].1.title, "Print 50% Complete");
        assert_eq!(delivered[0].1.body, "benchy.3mf is 51% done on Workshop H2S");
    }
}
