//! AgriTrace Common Types
//!
//! Shared types used by the rate engine and the early-warning system:
//! currency pairs and rate records, farm and forecast records, disease
//! rules, risk findings and alerts, plus the `Store` and `Notifier`
//! capabilities both services persist and report through.

pub mod identifiers;
pub mod monetary;
pub mod weather;
pub mod risk;
pub mod error;
pub mod time;
pub mod store;
pub mod notify;

pub use identifiers::*;
pub use monetary::*;
pub use weather::*;
pub use risk::*;
pub use error::*;
pub use time::*;
pub use store::{MemoryStore, SharedStore, Store};
pub use notify::{EventType, LogNotifier, NotificationEvent, Notifier, SharedNotifier};
