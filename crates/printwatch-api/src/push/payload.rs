// Push payload builders.
//
// The wire shape is the push service's `aps` dictionary; everything the
// core hands over stays opaque JSON until this point.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// A standard alert notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,

    /// Extra payload keys delivered alongside `aps` for the client app
    /// (deep-link target, printer prefix, etc.).
    pub custom: Value,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            custom: Value::Null,
        }
    }

    pub fn with_custom(mut self, custom: Value) -> Self {
        self.custom = custom;
        self
    }

    /// Render the full push payload.
    pub fn to_wire(&self) -> Value {
        let mut payload = json!({
            "aps": {
                "alert": {
                    "title": self.title,
                    "body": self.body,
                },
                "sound": "default",
            }
        });

        if let (Some(obj), Some(custom)) = (payload.as_object_mut(), self.custom.as_object()) {
            for (k, v) in custom {
                obj.insert(k.clone(), v.clone());
            }
        }

        payload
    }
}

/// A live-activity channel push: either a content update or the terminal
/// "end" event that dismisses the activity.
#[derive(Debug, Clone)]
pub enum LiveActivityEvent {
    Update {
        content_state: Value,
    },
    End {
        content_state: Value,
        /// When the client may remove the surface. Omitted means
        /// "dismiss at the system default".
        dismissal_date: Option<DateTime<Utc>>,
    },
}

impl LiveActivityEvent {
    /// Render the activity payload. `now` is injected so tests are
    /// deterministic.
    pub fn to_wire(&self, now: DateTime<Utc>) -> Value {
        match self {
            Self::Update { content_state } => json!({
                "aps": {
                    "timestamp": now.timestamp(),
                    "event": "update",
                    "content-state": content_state,
                }
            }),
            Self::End {
                content_state,
                dismissal_date,
            } => {
                let mut aps = json!({
                    "timestamp": now.timestamp(),
                    "event": "end",
                    "content-state": content_state,
                });
                if let (Some(obj), Some(date)) = (aps.as_object_mut(), dismissal_date) {
                    obj.insert("dismissal-date".into(), json!(date.timestamp()));
                }
                json!({ "aps": aps })
            }
        }
    }

    /// Relative delivery priority: routine content updates may be
    /// coalesced, end events must land promptly.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Update { .. } => 5,
            Self::End { .. } => 10,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn notification_wire_shape() {
        let n = Notification::new("Print Complete ✅", "benchy.3mf finished")
            .with_custom(json!({"prefix": "h2s"}));
        let wire = n.to_wire();

        assert_eq!(wire["aps"]["alert"]["title"], "Print Complete ✅");
        assert_eq!(wire["aps"]["alert"]["body"], "benchy.3mf finished");
        assert_eq!(wire["aps"]["sound"], "default");
        assert_eq!(wire["prefix"], "h2s");
    }

    #[test]
    fn live_activity_update_wire_shape() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let event = LiveActivityEvent::Update {
            content_state: json!({"progress": 42}),
        };
        let wire = event.to_wire(now);

        assert_eq!(wire["aps"]["event"], "update");
        assert_eq!(wire["aps"]["timestamp"], now.timestamp());
        assert_eq!(wire["aps"]["content-state"]["progress"], 42);
        assert_eq!(event.priority(), 5);
    }

    #[test]
    fn live_activity_end_carries_dismissal_date() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let dismiss = now + chrono::Duration::minutes(10);
        let event = LiveActivityEvent::End {
            content_state: json!({"progress": 100}),
            dismissal_date: Some(dismiss),
        };
        let wire = event.to_wire(now);

        assert_eq!(wire["aps"]["event"], "end");
        assert_eq!(wire["aps"]["dismissal-date"], dismiss.timestamp());
        assert_eq!(event.priority(), 10);
    }
}
