//! Decoders that turn stored payloads back into typed events before publish.

use std::collections::HashMap;

use common::{EventId, OrderCreated, OutboxEvent};

use crate::{OutboxError, OutboxRecord, Result};

type Decoder = fn(&str) -> serde_json::Result<(EventId, Vec<u8>)>;

fn decode<E: OutboxEvent>(payload: &str) -> serde_json::Result<(EventId, Vec<u8>)> {
    let event: E = serde_json::from_str(payload)?;
    Ok((event.event_id(), serde_json::to_vec(&event)?))
}

/// Maps event type tags to payload decoders.
///
/// The default registry knows every event this system stages.
#[derive(Clone)]
pub struct EventRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl EventRegistry {
    /// Creates a registry with no event types.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers an event type, replacing any previous decoder for its tag.
    pub fn register<E: OutboxEvent>(mut self) -> Self {
        self.decoders.insert(E::EVENT_TYPE, decode::<E>);
        self
    }

    pub fn knows(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Decodes a record's payload into its typed event and returns the bytes to publish.
    ///
    /// Fails when the type is unknown, the payload does not parse, or the
    /// payload carries a different event id than the record.
    pub fn decode(&self, record: &OutboxRecord) -> Result<Vec<u8>> {
        let decoder = self
            .decoders
            .get(record.event_type.as_str())
            .ok_or_else(|| OutboxError::UnknownEventType(record.event_type.clone()))?;

        let (event_id, bytes) = decoder(&record.payload)?;
        if event_id != record.event_id {
            return Err(OutboxError::PayloadMismatch {
                expected: record.event_id,
                found: event_id,
            });
        }
        Ok(bytes)
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::empty().register::<OrderCreated>()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}
