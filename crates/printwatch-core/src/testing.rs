// Shared test double for the push gateway.

use std::collections::HashSet;
use std::sync::Mutex;

use printwatch_api::Error;
use printwatch_api::push::{LiveActivityEvent, Notification};

use crate::gateway::PushGateway;

/// A gateway that records every delivery instead of sending it.
/// Tokens added via [`fail_token`](Self::fail_token) fail with a
/// bad-token error.
#[derive(Default)]
pub(crate) struct RecordingGateway {
    delivered: Mutex<Vec<(String, Notification)>>,
    activity: Mutex<Vec<(String, LiveActivityEvent)>>,
    failing: Mutex<HashSet<String>>,
}

#[allow(clippy::unwrap_used)]
impl RecordingGateway {
    pub(crate) fn fail_token(&self, token: &str) {
        self.failing.lock().unwrap().insert(token.to_owned());
    }

    pub(crate) fn delivered(&self) -> Vec<(String, Notification)> {
        self.delivered.lock().unwrap().clone()
    }

    pub(crate) fn activity_events(&self) -> Vec<(String, LiveActivityEvent)> {
        self.activity.lock().unwrap().clone()
    }
}

#[allow(clippy::unwrap_used)]
impl PushGateway for RecordingGateway {
    async fn deliver(&self, device_token: &str, notification: &Notification) -> Result<(), Error> {
        if self.failing.lock().unwrap().contains(device_token) {
            return Err(Error::BadDeviceToken {
                reason: "Unregistered".into(),
            });
        }
        self.delivered
            .lock()
            .unwrap()
            .push((device_token.to_owned(), notification.clone()));
        Ok(())
    }

    async fn deliver_live_activity(
        &self,
        activity_token: &str,
        event: &LiveActivityEvent,
    ) -> Result<(), Error> {
        if self.failing.lock().unwrap().contains(activity_token) {
            return Err(Error::BadDeviceToken {
                reason: "Unregistered".into(),
            });
        }
        self.activity
            .lock()
            .unwrap()
            .push((activity_token.to_owned(), event.clone()));
        Ok(())
    }
}
