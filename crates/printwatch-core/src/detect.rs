// ── Transition detection ──
//
// Pure decision logic: consumes (old, new) status pairs and progress
// updates, decides whether an externally visible event occurred. Never
// performs I/O. Per-prefix bookkeeping lives in one DetectorState
// aggregate so ownership is explicit.

use chrono::Utc;
use dashmap::DashMap;

use crate::model::{MilestoneCrossing, PrintStatus, StatusTransition};

/// Per-prefix detector bookkeeping.
#[derive(Debug, Default)]
struct DetectorState {
    /// High-water progress mark for the current print lifecycle.
    /// A transient sensor dip can never re-arm a crossed milestone;
    /// only an emitted `started` transition resets it.
    last_progress: u8,
}

/// Decides when a notification-worthy transition occurred.
pub struct TransitionDetector {
    /// Milestone thresholds in ascending order.
    milestones: Vec<u8>,
    by_prefix: DashMap<String, DetectorState>,
}

impl TransitionDetector {
    pub fn new(mut milestones: Vec<u8>) -> Self {
        milestones.sort_unstable();
        milestones.dedup();
        Self {
            milestones,
            by_prefix: DashMap::new(),
        }
    }

    /// Evaluate a status change against the transition rule table.
    ///
    /// | old                      | new        | emits     |
    /// |--------------------------|------------|-----------|
    /// | `paused`                 | `running`  | none      |
    /// | not `running`            | `running`  | started   |
    /// | `running`                | `complete` | completed |
    /// | `running`                | `failed`   | failed    |
    /// | `running`                | `paused`   | paused    |
    /// | anything else            | --         | none      |
    ///
    /// First match wins: a resume (`paused -> running`) lands on the
    /// silent row before the started row can claim it. Self-transitions
    /// also emit nothing, so hub-side sensor re-announcements stay
    /// quiet. A `started` emission re-arms the milestone counter.
    pub fn evaluate_status(
        &self,
        prefix: &str,
        old: PrintStatus,
        new: PrintStatus,
        filename: Option<&str>,
    ) -> Option<StatusTransition> {
        let notify = match (old, new) {
            // Resume: the print never stopped being "one lifecycle".
            (PrintStatus::Paused, PrintStatus::Running) => false,
            (o, PrintStatus::Running) if o != PrintStatus::Running => {
                // Fresh print: milestones re-arm.
                self.by_prefix
                    .entry(prefix.to_owned())
                    .or_default()
                    .last_progress = 0;
                true
            }
            (PrintStatus::Running, PrintStatus::Complete)
            | (PrintStatus::Running, PrintStatus::Failed)
            | (PrintStatus::Running, PrintStatus::Paused) => true,
            _ => false,
        };

        notify.then(|| StatusTransition {
            prefix: prefix.to_owned(),
            old_status: old,
            new_status: new,
            filename: filename.map(ToOwned::to_owned),
            observed_at: Utc::now(),
        })
    }

    /// Evaluate a progress update against the configured milestones.
    ///
    /// Emits the single lowest threshold `m` with
    /// `last_progress < m <= new_progress`. When progress jumps past
    /// several thresholds in one update, the higher ones are forgone --
    /// a burst of simultaneous notifications for one update is noise.
    pub fn evaluate_progress(
        &self,
        prefix: &str,
        new_progress: u8,
        filename: Option<&str>,
    ) -> Option<MilestoneCrossing> {
        let mut entry = self.by_prefix.entry(prefix.to_owned()).or_default();

        let crossed = self
            .milestones
            .iter()
            .copied()
            .find(|m| entry.last_progress < *m && *m <= new_progress);

        entry.last_progress = entry.last_progress.max(new_progress);

        crossed.map(|milestone| MilestoneCrossing {
            prefix: prefix.to_owned(),
            milestone,
            progress_at_crossing: new_progress,
            filename: filename.map(ToOwned::to_owned),
        })
    }

    /// Seed the progress mark without emitting anything.
    ///
    /// Used when applying a full snapshot: a daemon joining mid-print
    /// must not fire stale milestones for progress that happened before
    /// it was watching.
    pub fn seed_progress(&self, prefix: &str, progress: u8) {
        self.by_prefix
            .entry(prefix.to_owned())
            .or_default()
            .last_progress = progress;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
