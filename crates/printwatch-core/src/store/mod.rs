// ── Per-printer telemetry cache ──
//
// Lock-free concurrent storage for the last-known DeviceState of every
// printer prefix, with push-based change notification via a `watch`
// channel. This is the single source of truth for "current state"
// queries; it is mutated only by applying inbound hub data.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;

use printwatch_api::hub::EntityState;

use crate::model::{DeviceState, PrintStatus};

// ── Field identification ─────────────────────────────────────────────

/// The telemetry fields this pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryField {
    Status,
    Progress,
    CurrentLayer,
    TotalLayers,
    RemainingTime,
    NozzleTemp,
    BedTemp,
    SubtaskName,
}

/// Fixed table of known entity-id suffixes. Longest-match-first so
/// `_total_layer_count` wins over any shorter overlap.
const FIELD_SUFFIXES: &[(&str, TelemetryField)] = &[
    ("_total_layer_count", TelemetryField::TotalLayers),
    ("_nozzle_temperature", TelemetryField::NozzleTemp),
    ("_bed_temperature", TelemetryField::BedTemp),
    ("_print_progress", TelemetryField::Progress),
    ("_remaining_time", TelemetryField::RemainingTime),
    ("_current_layer", TelemetryField::CurrentLayer),
    ("_subtask_name", TelemetryField::SubtaskName),
    ("_print_status", TelemetryField::Status),
    ("_print_state", TelemetryField::Status),
];

/// Split a hub entity id into (printer prefix, telemetry field).
///
/// `sensor.h2s_print_progress` → `("h2s", Progress)`. Entity ids whose
/// suffix is not in the table yield `None` and are ignored upstream --
/// an unrecognized sensor is not an error.
pub fn split_entity_id(entity_id: &str) -> Option<(&str, TelemetryField)> {
    // Strip the hub domain ("sensor.", "binary_sensor.", ...).
    let name = entity_id
        .split_once('.')
        .map_or(entity_id, |(_, rest)| rest);

    for (suffix, field) in FIELD_SUFFIXES {
        if let Some(prefix) = name.strip_suffix(suffix) {
            if !prefix.is_empty() {
                return Some((prefix, *field));
            }
        }
    }
    None
}

// ── Defensive value parsing ──────────────────────────────────────────

/// Hub sentinel values that mean "no reading right now".
fn is_sentinel(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "unknown" | "unavailable" | "none"
    )
}

/// Parse a numeric sensor value, tolerating float formatting.
/// Sentinels and garbage yield `None` so the previous reading survives --
/// a transient sensor dropout must not masquerade as "printer idle".
fn parse_number(raw: &str) -> Option<f64> {
    if is_sentinel(raw) {
        return None;
    }
    raw.trim().parse::<f64>().ok()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn parse_percent(raw: &str) -> Option<u8> {
    parse_number(raw).map(|v| v.clamp(0.0, 100.0).round() as u8)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn parse_count(raw: &str) -> Option<u32> {
    parse_number(raw).map(|v| v.max(0.0).round() as u32)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn parse_remaining_secs(raw: &str) -> Option<u64> {
    // The hub reports remaining time in minutes.
    parse_number(raw).map(|mins| (mins.max(0.0) * 60.0).round() as u64)
}

// ── StateCache ───────────────────────────────────────────────────────

/// In-memory, per-prefix snapshot of the last-known telemetry values.
pub struct StateCache {
    by_prefix: DashMap<String, Arc<DeviceState>>,

    /// Full snapshot, rebuilt on mutation for cheap subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<DeviceState>>>>,
}

impl StateCache {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_prefix: DashMap::new(),
            snapshot,
        }
    }

    /// Apply one field update and return the post-update snapshot.
    ///
    /// The entry is created lazily on the first event for an unseen
    /// prefix. Every apply refreshes `last_updated` and marks the
    /// printer online, even when the value itself was unusable.
    pub fn apply(&self, prefix: &str, field: TelemetryField, raw: &str) -> Arc<DeviceState> {
        let updated = {
            let mut entry = self
                .by_prefix
                .entry(prefix.to_owned())
                .or_insert_with(|| Arc::new(DeviceState::new(prefix)));

            let mut state = (**entry).clone();
            apply_field(&mut state, field, raw);
            state.last_updated = Utc::now();
            state.is_online = true;

            let arc = Arc::new(state);
            *entry = Arc::clone(&arc);
            arc
        };

        self.rebuild_snapshot();
        updated
    }

    /// Apply a full entity-state snapshot from the hub.
    ///
    /// Unrecognized entities are skipped; recognized ones flow through
    /// [`apply`](Self::apply) so the same defensive parsing holds.
    pub fn apply_snapshot(&self, states: &[EntityState]) {
        for entity in states {
            if let Some((prefix, field)) = split_entity_id(&entity.entity_id) {
                self.apply(prefix, field, &entity.state);
            }
        }
    }

    /// Current state for one prefix, if any telemetry has been seen.
    pub fn get(&self, prefix: &str) -> Option<Arc<DeviceState>> {
        self.by_prefix.get(prefix).map(|r| Arc::clone(r.value()))
    }

    /// All known printer states, sorted by prefix for stable output.
    pub fn get_all(&self) -> Vec<Arc<DeviceState>> {
        let mut all: Vec<Arc<DeviceState>> = self
            .by_prefix
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        all.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        all
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<DeviceState>>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }

    /// Collect all values into a snapshot vec and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let values = self.get_all();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one raw value to the matching field. Unusable values leave the
/// field unchanged.
fn apply_field(state: &mut DeviceState, field: TelemetryField, raw: &str) {
    match field {
        TelemetryField::Status => {
            if let Some(status) = PrintStatus::parse(raw) {
                state.status = status;
            }
        }
        TelemetryField::Progress => {
            if let Some(pct) = parse_percent(raw) {
                state.progress_percent = pct;
            }
        }
        TelemetryField::CurrentLayer => {
            if let Some(layer) = parse_count(raw) {
                state.current_layer = Some(layer);
            }
        }
        TelemetryField::TotalLayers => {
            if let Some(layers) = parse_count(raw) {
                state.total_layers = Some(layers);
            }
        }
        TelemetryField::RemainingTime => {
            if let Some(secs) = parse_remaining_secs(raw) {
                state.remaining_secs = Some(secs);
            }
        }
        TelemetryField::NozzleTemp => {
            if let Some(temp) = parse_number(raw) {
                state.nozzle_temp = Some(temp);
            }
        }
        TelemetryField::BedTemp => {
            if let Some(temp) = parse_number(raw) {
                state.bed_temp = Some(temp);
            }
        }
        TelemetryField::SubtaskName => {
            if is_sentinel(raw) {
                state.subtask_name = None;
            } else {
                state.subtask_name = Some(raw.to_owned());
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn split_recognizes_known_suffixes() {
        assert_eq!(
            split_entity_id("sensor.h2s_print_progress"),
            Some(("h2s", TelemetryField::Progress))
        );
        assert_eq!(
            split_entity_id("sensor.p1s_print_status"),
            Some(("p1s", TelemetryField::Status))
        );
        assert_eq!(
            split_entity_id("sensor.workshop_x1c_total_layer_count"),
            Some(("workshop_x1c", TelemetryField::TotalLayers))
        );
        assert_eq!(
            split_entity_id("sensor.h2s_nozzle_temperature"),
            Some(("h2s", TelemetryField::NozzleTemp))
        );
    }

    #[test]
    fn split_ignores_unknown_suffixes() {
        assert!(split_entity_id("sensor.h2s_wifi_signal").is_none());
        assert!(split_entity_id("light.kitchen").is_none());
        assert!(split_entity_id("sensor._print_progress").is_none());
    }

    #[test]
    fn apply_creates_entry_lazily() {
        let cache = StateCache::new();
        assert!(cache.get("h2s").is_none());

        let state = cache.apply("h2s", TelemetryField::Progress, "42");
        assert_eq!(state.prefix, "h2s");
        assert_eq!(state.progress_percent, 42);
        assert!(state.is_online);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sentinel_values_leave_fields_unchanged() {
        let cache = StateCache::new();
        cache.apply("h2s", TelemetryField::Progress, "80");
        cache.apply("h2s", TelemetryField::Status, "running");

        let state = cache.apply("h2s", TelemetryField::Progress, "unavailable");
        assert_eq!(state.progress_percent, 80);

        let state = cache.apply("h2s", TelemetryField::Status, "unknown");
        assert_eq!(state.status, PrintStatus::Running);
    }

    #[test]
    fn garbage_numeric_values_leave_fields_unchanged() {
        let cache = StateCache::new();
        cache.apply("h2s", TelemetryField::NozzleTemp, "215.5");

        let state = cache.apply("h2s", TelemetryField::NozzleTemp, "not-a-number");
        assert_eq!(state.nozzle_temp, Some(215.5));
    }

    #[test]
    fn replaying_the_same_update_is_idempotent() {
        let cache = StateCache::new();

        let first = cache.apply("h2s", TelemetryField::Progress, "26");
        let second = cache.apply("h2s", TelemetryField::Progress, "26");

        assert_eq!(first.progress_percent, second.progress_percent);
        assert_eq!(first.status, second.status);
        assert_eq!(first.subtask_name, second.subtask_name);
    }

    #[test]
    fn remaining_time_is_stored_in_seconds() {
        let cache = StateCache::new();
        let state = cache.apply("h2s", TelemetryField::RemainingTime, "90");
        assert_eq!(state.remaining_secs, Some(5400));
    }

    #[test]
    fn progress_is_clamped_to_percent_range() {
        let cache = StateCache::new();
        let state = cache.apply("h2s", TelemetryField::Progress, "150");
        assert_eq!(state.progress_percent, 100);
    }

    #[test]
    fn apply_snapshot_populates_recognized_entities() {
        let cache = StateCache::new();
        let states = vec![
            EntityState {
                entity_id: "sensor.h2s_print_status".into(),
                state: "running".into(),
                attributes: serde_json::Value::Null,
                last_updated: None,
            },
            EntityState {
                entity_id: "sensor.h2s_print_progress".into(),
                state: "55".into(),
                attributes: serde_json::Value::Null,
                last_updated: None,
            },
            EntityState {
                entity_id: "light.kitchen".into(),
                state: "on".into(),
                attributes: serde_json::Value::Null,
                last_updated: None,
            },
        ];

        cache.apply_snapshot(&states);

        assert_eq!(cache.len(), 1);
        let h2s = cache.get("h2s").unwrap();
        assert_eq!(h2s.status, PrintStatus::Running);
        assert_eq!(h2s.progress_percent, 55);
    }

    #[test]
    fn subscribe_sees_mutations() {
        let cache = StateCache::new();
        let rx = cache.subscribe();
        assert!(rx.borrow().is_empty());

        cache.apply("h2s", TelemetryField::Progress, "10");
        cache.apply("p1s", TelemetryField::Progress, "20");

        let snap = rx.borrow();
        assert_eq!(snap.len(), 2);
        // Sorted by prefix
        assert_eq!(snap[0].prefix, "h2s");
        assert_eq!(snap[1].prefix, "p1s");
    }
}
