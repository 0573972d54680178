// printwatch-core: Telemetry sync and notification dispatch between the hub and mobile clients.

pub mod activity;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod history;
pub mod model;
pub mod monitor;
pub mod recipients;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use activity::LiveActivityThrottle;
pub use config::MonitorConfig;
pub use detect::TransitionDetector;
pub use dispatch::{DeliveryReport, NotificationDispatcher};
pub use error::CoreError;
pub use gateway::PushGateway;
pub use history::{PrintHistory, PrintRecord};
pub use monitor::Monitor;
pub use recipients::RecipientStore;
pub use store::StateCache;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    DeviceState, EventPreferences, MilestoneCrossing, NotificationKind, PrintStatus,
    RegisteredRecipient, StatusTransition,
};
