// ── Transition and milestone value objects ──
//
// Ephemeral: created by the detector, consumed once by the dispatcher,
// never persisted.

use chrono::{DateTime, Utc};

use super::status::PrintStatus;

/// The externally visible notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Started,
    Completed,
    Failed,
    Paused,
    Milestone,
}

/// A notification-worthy status change on one printer.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub prefix: String,
    pub old_status: PrintStatus,
    pub new_status: PrintStatus,
    pub filename: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl StatusTransition {
    /// Notification kind for this transition. Total on the transitions
    /// the detector emits; the detector's table guarantees `new_status`
    /// is one of the four mapped states.
    pub fn kind(&self) -> NotificationKind {
        match self.new_status {
            PrintStatus::Complete => NotificationKind::Completed,
            PrintStatus::Failed => NotificationKind::Failed,
            PrintStatus::Paused => NotificationKind::Paused,
            _ => NotificationKind::Started,
        }
    }
}

/// A progress threshold crossed for the first time this print lifecycle.
#[derive(Debug, Clone)]
pub struct MilestoneCrossing {
    pub prefix: String,
    /// The configured threshold crossed, in percent.
    pub milestone: u8,
    /// The progress value that crossed it.
    pub progress_at_crossing: u8,
    pub filename: Option<String>,
}
