// ── Print lifecycle status ──

use serde::{Deserialize, Serialize};

/// The print-lifecycle state of one printer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[non_exhaustive]
pub enum PrintStatus {
    Idle,
    Preparing,
    Running,
    Paused,
    Complete,
    Failed,
    Cancelled,
    Offline,
    /// A lifecycle value the hub reports that we don't know. Kept
    /// distinct from the sentinel states so transitions through it
    /// still work (e.g. `unknown -> running` counts as a start).
    Unknown,
}

impl PrintStatus {
    /// Lenient parse of a raw hub state value.
    ///
    /// Returns `None` for the hub's sentinel values ("unknown",
    /// "unavailable", empty) so transient sensor dropout leaves the
    /// cached status untouched instead of masquerading as a real state.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "unknown" | "unavailable" | "none" => None,
            "idle" | "ready" => Some(Self::Idle),
            "prepare" | "preparing" | "slicing" => Some(Self::Preparing),
            "running" | "printing" => Some(Self::Running),
            "pause" | "paused" => Some(Self::Paused),
            "finish" | "complete" | "completed" => Some(Self::Complete),
            "failed" | "error" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "offline" => Some(Self::Offline),
            _ => Some(Self::Unknown),
        }
    }

    /// A print is actively in flight (live-activity updates are throttled).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// The print ended; the live-activity surface should be dismissed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl Default for PrintStatus {
    fn default() -> Self {
        Self::Idle
    }
}
