//! Order write path.
//!
//! Creating an order persists the order row and exactly one outbox record
//! describing it in a single transaction. The bus is never contacted here;
//! delivery is left to the outbox dispatcher.

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod service;
pub mod store;

pub use error::{OrderError, Result};
pub use memory::InMemoryOrderStore;
pub use order::{CreateOrderRequest, NewOrder, Order, OrderStatus, Page};
pub use postgres::PostgresOrderStore;
pub use service::{CreateOrderResult, OrderService};
pub use store::{EventStager, OrderStore};
