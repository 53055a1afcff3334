//! AgriTrace Node
//!
//! Hosts the rate engine and the early-warning system in one process:
//! configuration from the environment, the Postgres store, webhook
//! notifications, and the schedulers that drive the periodic refresh and
//! the per-farm forecast batches.

pub mod config;
pub mod metrics;
pub mod node;
pub mod pg_store;
pub mod state;
pub mod webhook;

pub use config::{NodeConfig, WeatherProvider};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use node::Node;
pub use pg_store::PgStore;
pub use state::NodeState;
pub use webhook::WebhookNotifier;
