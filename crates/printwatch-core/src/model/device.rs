// ── Printer telemetry snapshot ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::PrintStatus;

/// Last-known telemetry for one printer prefix.
///
/// Owned exclusively by the `StateCache`; the detection and dispatch
/// components only ever see immutable snapshots. `progress_percent` is
/// monotonically non-decreasing within a single print lifecycle -- a
/// reset to 0 only occurs on a fresh `running` transition upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    /// Stable identifier grouping all sensor entities of one printer.
    pub prefix: String,

    pub status: PrintStatus,

    /// 0–100.
    pub progress_percent: u8,

    pub current_layer: Option<u32>,
    pub total_layers: Option<u32>,

    pub remaining_secs: Option<u64>,

    pub nozzle_temp: Option<f64>,
    pub bed_temp: Option<f64>,

    /// Filename of the job being printed, if any.
    pub subtask_name: Option<String>,

    pub last_updated: DateTime<Utc>,

    /// Flipped to `true` on every applied update. The only path back to
    /// `false` is a staleness check owned by a health collaborator
    /// outside this crate.
    pub is_online: bool,
}

impl DeviceState {
    /// Fresh state for a prefix seen for the first time.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            status: PrintStatus::default(),
            progress_percent: 0,
            current_layer: None,
            total_layers: None,
            remaining_secs: None,
            nozzle_temp: None,
            bed_temp: None,
            subtask_name: None,
            last_updated: Utc::now(),
            is_online: false,
        }
    }
}
