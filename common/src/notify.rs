//! Notification capability for operational events.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::NotifyError;

/// Kinds of operational events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A rate moved more than the configured threshold between refreshes.
    RateVolatilityAlert,
    /// A provider failed its health probe.
    HealthCheckFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RateVolatilityAlert => "RATE_VOLATILITY_ALERT",
            EventType::HealthCheckFailed => "HEALTH_CHECK_FAILED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event handed to a `Notifier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: EventType,
    /// Severity or short subject line.
    pub subject: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(event_type: EventType, subject: impl Into<String>, details: Value) -> Self {
        Self {
            event_type,
            subject: subject.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

/// Fire-and-forget notification sink.
///
/// Callers log a returned error and carry on; a failed notification never
/// fails the operation that raised it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError>;
}

/// Shared notifier handle.
pub type SharedNotifier = Arc<dyn Notifier>;

/// Notifier that writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        warn!(
            event_type = %event.event_type,
            subject = %event.subject,
            details = %event.details,
            "Operational notification"
        );
        Ok(())
    }
}

/// Notifier that keeps every event in memory, for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: parking_lot::Mutex<Vec<NotificationEvent>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records events and then reports delivery failure.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier
            .fail
            .store(true, std::sync::atomic::Ordering::SeqCst);
        notifier
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording notifier set to fail".to_string()));
        }
        Ok(())
    }
}
