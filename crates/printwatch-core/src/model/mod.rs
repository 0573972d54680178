// ── Domain model ──
//
// Canonical representations of printer telemetry and notification
// entities. Everything here is plain data; behavior lives in the store,
// detector, and dispatch modules.

pub mod device;
pub mod recipient;
pub mod status;
pub mod transition;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use printwatch_core::model::*` gives you everything.

pub use device::DeviceState;
pub use recipient::{EventPreferences, RegisteredRecipient};
pub use status::PrintStatus;
pub use transition::{MilestoneCrossing, NotificationKind, StatusTransition};
