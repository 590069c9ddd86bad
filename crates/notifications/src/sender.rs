//! Notification channels.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{EventId, OrderCreated};
use tokio::sync::RwLock;

use crate::{Channel, NotificationError, Result};

/// Sends one notification about an order on one channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, channel: Channel, event: &OrderCreated) -> Result<()>;
}

/// Sender that writes each notification to the log instead of a provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSender;

#[async_trait]
impl NotificationSender for LoggingSender {
    async fn send(&self, channel: Channel, event: &OrderCreated) -> Result<()> {
        tracing::info!(
            %channel,
            event_id = %event.event_id,
            order_id = %event.order_id,
            recipient = %event.customer_email,
            "notification sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemorySenderState {
    sent: Vec<(Channel, EventId)>,
    failing: HashSet<Channel>,
    latency: Option<Duration>,
}

/// In-memory sender for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemorySender {
    state: Arc<RwLock<InMemorySenderState>>,
}

impl InMemorySender {
    /// Creates a new in-memory sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures `channel` to fail every send.
    pub async fn set_failing(&self, channel: Channel, failing: bool) {
        let mut state = self.state.write().await;
        if failing {
            state.failing.insert(channel);
        } else {
            state.failing.remove(&channel);
        }
    }

    /// Delays every send by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().await.latency = latency;
    }

    /// Returns every successful send in order.
    pub async fn sent(&self) -> Vec<(Channel, EventId)> {
        self.state.read().await.sent.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.state.read().await.sent.len()
    }
}

#[async_trait]
impl NotificationSender for InMemorySender {
    async fn send(&self, channel: Channel, event: &OrderCreated) -> Result<()> {
        let (latency, failing) = {
            let state = self.state.read().await;
            (state.latency, state.failing.contains(&channel))
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if failing {
            return Err(NotificationError::Delivery {
                channel,
                reason: "provider unavailable".to_string(),
            });
        }
        self.state.write().await.sent.push((channel, event.event_id));
        Ok(())
    }
}
