//! Order entity, creation request and paging.

use chrono::{DateTime, Utc};
use common::{EventId, OrderCreated, OrderId};
use serde::{Deserialize, Serialize};

use crate::{OrderError, Result};

/// Maximum length of a product code.
pub const MAX_PRODUCT_CODE_LEN: usize = 100;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Created,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(Self::Created),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_email: String,
    pub product_code: String,
    pub quantity: i32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds the event announcing this order, under a fresh event id.
    pub fn created_event(&self) -> OrderCreated {
        OrderCreated {
            event_id: EventId::new(),
            occurred_at: Utc::now(),
            order_id: self.id,
            customer_email: self.customer_email.clone(),
            product_code: self.product_code.clone(),
            quantity: self.quantity,
        }
    }
}

/// A validated order, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_email: String,
    pub product_code: String,
    pub quantity: i32,
}

/// Incoming request to create an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_email: String,
    pub product_code: String,
    pub quantity: i32,
}

impl CreateOrderRequest {
    pub fn new(
        customer_email: impl Into<String>,
        product_code: impl Into<String>,
        quantity: i32,
    ) -> Self {
        Self {
            customer_email: customer_email.into(),
            product_code: product_code.into(),
            quantity,
        }
    }

    /// Checks the request and returns the order to persist.
    pub fn validate(self) -> Result<NewOrder> {
        let customer_email = self.customer_email.trim().to_string();
        if customer_email.is_empty() {
            return Err(OrderError::CustomerEmailRequired);
        }
        if !is_valid_email(&customer_email) {
            return Err(OrderError::InvalidEmail {
                email: customer_email,
            });
        }

        let product_code = self.product_code.trim().to_string();
        if product_code.is_empty() {
            return Err(OrderError::ProductCodeRequired);
        }
        let len = product_code.chars().count();
        if len > MAX_PRODUCT_CODE_LEN {
            return Err(OrderError::ProductCodeTooLong {
                len,
                max: MAX_PRODUCT_CODE_LEN,
            });
        }

        if self.quantity <= 0 {
            return Err(OrderError::InvalidQuantity {
                quantity: self.quantity,
            });
        }

        Ok(NewOrder {
            customer_email,
            product_code,
            quantity: self.quantity,
        })
    }
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, size: u32, total_elements: u64) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            total_elements.div_ceil(u64::from(size))
        };
        Self {
            items,
            page,
            size,
            total_elements,
            total_pages,
        }
    }

    pub fn is_last(&self) -> bool {
        u64::from(self.page) + 1 >= self.total_pages
    }
}
