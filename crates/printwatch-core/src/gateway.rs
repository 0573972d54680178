// ── Push gateway boundary ──
//
// The pipeline depends on the push transport only through this trait:
// deliver an alert to a device token, deliver a live-activity event to
// an activity token. Retry policy, if any, belongs to the implementation.

use std::future::Future;

use printwatch_api::Error;
use printwatch_api::push::{ApnsClient, LiveActivityEvent, Notification};

/// Abstract outbound push contract.
///
/// The core is generic over this trait so tests can substitute a
/// recording gateway and the dispatch logic stays transport-free.
pub trait PushGateway: Send + Sync + 'static {
    /// Deliver a standard alert notification. Best-effort: the core
    /// records failures but never retries.
    fn deliver(
        &self,
        device_token: &str,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deliver a live-activity update or end event.
    fn deliver_live_activity(
        &self,
        activity_token: &str,
        event: &LiveActivityEvent,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

impl PushGateway for ApnsClient {
    async fn deliver(&self, device_token: &str, notification: &Notification) -> Result<(), Error> {
        ApnsClient::deliver(self, device_token, notification).await
    }

    async fn deliver_live_activity(
        &self,
        activity_token: &str,
        event: &LiveActivityEvent,
    ) -> Result<(), Error> {
        ApnsClient::deliver_live_activity(self, activity_token, event).await
    }
}
