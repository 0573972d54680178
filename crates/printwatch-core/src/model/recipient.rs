// ── Registered notification recipients ──

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transition::NotificationKind;

/// Per-event notification opt-ins for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EventPreferences {
    pub on_start: bool,
    pub on_complete: bool,
    pub on_failed: bool,
    pub on_paused: bool,
    pub on_milestone: bool,
}

impl Default for EventPreferences {
    fn default() -> Self {
        Self {
            on_start: true,
            on_complete: true,
            on_failed: true,
            on_paused: true,
            on_milestone: true,
        }
    }
}

impl EventPreferences {
    /// Whether this recipient wants pushes of the given kind.
    pub fn enabled_for(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Started => self.on_start,
            NotificationKind::Completed => self.on_complete,
            NotificationKind::Failed => self.on_failed,
            NotificationKind::Paused => self.on_paused,
            NotificationKind::Milestone => self.on_milestone,
        }
    }
}

/// A registered push recipient for one printer prefix.
///
/// Created at device-registration time by the registration surface;
/// read-only to the dispatch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredRecipient {
    pub recipient_id: Uuid,

    /// Device token for standard alert pushes.
    pub push_token: String,

    /// Token of the currently registered live activity, if one is up.
    #[serde(default)]
    pub live_activity_token: Option<String>,

    /// The printer this recipient watches.
    pub printer_prefix: String,

    #[serde(default)]
    pub preferences: EventPreferences,
}

impl RegisteredRecipient {
    pub fn new(push_token: impl Into<String>, printer_prefix: impl Into<String>) -> Self {
        Self {
            recipient_id: Uuid::new_v4(),
            push_token: push_token.into(),
            live_activity_token: None,
            printer_prefix: printer_prefix.into(),
            preferences: EventPreferences::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_gate_each_kind() {
        let prefs = EventPreferences {
            on_failed: false,
            ..EventPreferences::default()
        };

        assert!(prefs.enabled_for(NotificationKind::Started));
        assert!(prefs.enabled_for(NotificationKind::Completed));
        assert!(!prefs.enabled_for(NotificationKind::Failed));
        assert!(prefs.enabled_for(NotificationKind::Milestone));
    }

    #[test]
    fn recipient_roundtrips_through_json() {
        let recipient = RegisteredRecipient::new("tok-1", "h2s");
        let json = serde_json::to_string(&recipient).expect("serialize");
        let back: RegisteredRecipient = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.recipient_id, recipient.recipient_id);
        assert_eq!(back.push_token, "tok-1");
        assert_eq!(back.printer_prefix, "h2s");
        assert!(back.live_activity_token.is_none());
    }
}
