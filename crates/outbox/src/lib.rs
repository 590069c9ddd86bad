//! Transactional outbox for the order service.
//!
//! Outbound events are staged as rows in the same transaction as the
//! business write that produced them, then drained to the message bus by
//! [`OutboxDispatcher`]. Claiming uses `FOR UPDATE SKIP LOCKED`, so several
//! dispatcher instances can share one store without double-processing a
//! record.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod registry;
pub mod store;

pub use config::DispatcherConfig;
pub use dispatcher::{AttemptOutcome, BatchReport, OutboxDispatcher};
pub use error::{OutboxError, Result};
pub use memory::{InMemoryClaim, InMemoryOutboxStore};
pub use postgres::{PgClaimedRecord, PostgresOutboxStore, insert_outbox_record};
pub use record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
pub use registry::EventRegistry;
pub use store::{ClaimedRecord, OutboxStore, OutboxStoreExt};
