//! Notification entity and the channels it can be sent on.

use chrono::{DateTime, Utc};
use common::{EventId, OrderId};
use serde::{Deserialize, Serialize};

use crate::{NotificationError, Result};

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Sms,
    Email,
    Fcm,
}

impl Channel {
    /// Every channel, in the order they are attempted.
    pub const ALL: [Channel; 3] = [Channel::Sms, Channel::Email, Channel::Fcm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "SMS",
            Self::Email => "EMAIL",
            Self::Fcm => "FCM",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SMS" => Ok(Self::Sms),
            "EMAIL" => Ok(Self::Email),
            "FCM" => Ok(Self::Fcm),
            other => Err(NotificationError::UnknownChannel(other.to_string())),
        }
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderCreated,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ORDER_CREATED" => Ok(Self::OrderCreated),
            other => Err(NotificationError::UnknownType(other.to_string())),
        }
    }
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub event_id: EventId,
    pub order_id: OrderId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub delivered: bool,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A notification produced for an event, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub delivered: bool,
    pub message: String,
}

impl NewNotification {
    /// Records a successful send of an order-created notification.
    pub fn sent(event_id: EventId, order_id: OrderId, channel: Channel) -> Self {
        Self {
            event_id,
            order_id,
            notification_type: NotificationType::OrderCreated,
            channel,
            delivered: true,
            message: format!("{channel} sent successfully"),
        }
    }

    /// Records a failed send of an order-created notification.
    pub fn failed(
        event_id: EventId,
        order_id: OrderId,
        channel: Channel,
        error: &NotificationError,
    ) -> Self {
        Self {
            event_id,
            order_id,
            notification_type: NotificationType::OrderCreated,
            channel,
            delivered: false,
            message: format!("{channel} failed to send: {error}"),
        }
    }
}
