use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

pub mod email;

/// Templated message with a flat field set. The sink owns rendering;
/// the core only names the template and supplies substitutions.
#[derive(Debug, Clone)]
pub struct Notification {
    pub customer_id: Uuid,
    pub template: Template,
    pub fields: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    BookingConfirmed,
    BookingCancelled,
    WaitlistSlotOpen,
    PackageActivated,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::BookingConfirmed => "booking_confirmed",
            Template::BookingCancelled => "booking_cancelled",
            Template::WaitlistSlotOpen => "waitlist_slot_open",
            Template::PackageActivated => "package_activated",
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Fans a notification out to every registered sink. Dispatch is strictly
/// fire-and-forget: a sink failure is logged and never reaches the state
/// transition that triggered it.
pub struct NotificationManager {
    sinks: RwLock<Vec<Arc<dyn NotificationSink>>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, sink: Arc<dyn NotificationSink>) {
        if sink.is_enabled() {
            tracing::info!("Registered notification sink: {}", sink.name());
            self.sinks.write().await.push(sink);
        }
    }

    pub async fn dispatch(&self, notification: Notification) {
        let sinks = self.sinks.read().await;

        for sink in sinks.iter() {
            if !sink.is_enabled() {
                continue;
            }

            match sink.send(&notification).await {
                Ok(_) => {
                    tracing::debug!(
                        template = notification.template.name(),
                        "Sink {} delivered notification",
                        sink.name()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        template = notification.template.name(),
                        "Sink {} failed to deliver notification: {:?}",
                        sink.name(),
                        e
                    );
                    // Keep going; delivery failures never propagate.
                }
            }
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Test sink that records everything it is asked to send.
#[cfg(any(test, feature = "test-utils"))]
pub struct RecordingSink {
    pub sent: std::sync::Mutex<Vec<Notification>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn templates(&self) -> Vec<Template> {
        self.sent
            .lock()
            .expect("recording sink poisoned")
            .iter()
            .map(|n| n.template)
            .collect()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .expect("recording sink poisoned")
            .push(notification.clone());
        Ok(())
    }
}
