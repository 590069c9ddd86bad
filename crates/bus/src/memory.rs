//! In-memory broker used by tests and by the API when no external bus is configured.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::EventId;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{BusError, MessageBus, MessageHandler, Result};

/// A message accepted by the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub partition: u32,
    /// Position of the message within its partition.
    pub offset: usize,
    pub payload: Vec<u8>,
}

/// A subscribed handler and the next offset it will receive, per partition.
struct Subscription {
    handler: Arc<dyn MessageHandler>,
    positions: Vec<usize>,
}

struct InMemoryBusState {
    log: Vec<PublishedMessage>,
    /// Indexes into `log`, one list per partition.
    partitions: Vec<Vec<usize>>,
    unavailable: bool,
    fail_remaining: u32,
    reject: bool,
    ack_delay: Option<Duration>,
    subscriptions: Vec<Subscription>,
}

/// In-memory message bus.
///
/// Publishing only appends to a partitioned log and acknowledges; consumers
/// are fed separately by [`deliver_pending`](Self::deliver_pending) or by a
/// task from [`spawn_consumer`](Self::spawn_consumer). Every subscription
/// keeps its own offset per partition and only advances it when the handler
/// succeeds, so a failed delivery is retried on the next pass and later
/// messages with the same key wait behind it.
///
/// Failure modes can be switched on to exercise the dispatcher's retry path.
#[derive(Clone)]
pub struct InMemoryMessageBus {
    state: Arc<RwLock<InMemoryBusState>>,
    delivery: Arc<Mutex<()>>,
    published: Arc<Notify>,
    partitions: u32,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageBus")
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl InMemoryMessageBus {
    /// How often a consumer task retries deliveries that failed.
    pub const DEFAULT_REDELIVERY_INTERVAL: Duration = Duration::from_secs(1);

    /// Creates a bus with three partitions.
    pub fn new() -> Self {
        Self::with_partitions(3)
    }

    /// Creates a bus with the given number of partitions (at least one).
    pub fn with_partitions(partitions: u32) -> Self {
        let partitions = partitions.max(1);
        let state = InMemoryBusState {
            log: Vec::new(),
            partitions: vec![Vec::new(); partitions as usize],
            unavailable: false,
            fail_remaining: 0,
            reject: false,
            ack_delay: None,
            subscriptions: Vec::new(),
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            delivery: Arc::new(Mutex::new(())),
            published: Arc::new(Notify::new()),
            partitions,
        }
    }

    /// Registers a handler that consumes the log from its first message.
    pub async fn subscribe(&self, handler: Arc<dyn MessageHandler>) {
        self.state.write().await.subscriptions.push(Subscription {
            handler,
            positions: vec![0; self.partitions as usize],
        });
    }

    /// Makes every publish fail as if the broker were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Makes the next `count` publishes fail as if the broker were unreachable.
    pub async fn fail_next(&self, count: u32) {
        self.state.write().await.fail_remaining = count;
    }

    /// Makes every publish fail with a broker rejection.
    pub async fn set_reject(&self, reject: bool) {
        self.state.write().await.reject = reject;
    }

    /// Delays every acknowledgment by `delay`.
    pub async fn set_ack_delay(&self, delay: Option<Duration>) {
        self.state.write().await.ack_delay = delay;
    }

    /// Returns all accepted messages in acceptance order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.read().await.log.clone()
    }

    /// Returns the number of accepted messages.
    pub async fn published_count(&self) -> usize {
        self.state.read().await.log.len()
    }

    /// Returns the accepted messages carrying `key`, in acceptance order.
    pub async fn messages_for_key(&self, key: &str) -> Vec<PublishedMessage> {
        self.state
            .read()
            .await
            .log
            .iter()
            .filter(|m| m.key == key)
            .cloned()
            .collect()
    }

    /// Returns how many deliveries are still owed to subscribers.
    pub async fn pending_deliveries(&self) -> usize {
        let state = self.state.read().await;
        state
            .subscriptions
            .iter()
            .map(|s| {
                s.positions
                    .iter()
                    .zip(&state.partitions)
                    .map(|(position, partition)| partition.len() - position)
                    .sum::<usize>()
            })
            .sum()
    }

    /// Feeds every subscription the messages past its offsets.
    ///
    /// A partition stops at the first message its handler fails on; that
    /// message is offered again on the next call. Returns the number of
    /// successful deliveries.
    pub async fn deliver_pending(&self) -> usize {
        let _delivery = self.delivery.lock().await;
        let subscriptions = self.state.read().await.subscriptions.len();
        let mut delivered = 0;

        for index in 0..subscriptions {
            for partition in 0..self.partitions as usize {
                while let Some((handler, message)) = self.next_delivery(index, partition).await {
                    if let Err(e) = Self::deliver(handler.as_ref(), &message).await {
                        tracing::warn!(
                            key = %message.key,
                            partition,
                            offset = message.offset,
                            error = %e,
                            "delivery failed, will retry"
                        );
                        break;
                    }
                    self.state.write().await.subscriptions[index].positions[partition] += 1;
                    delivered += 1;
                }
            }
        }

        delivered
    }

    /// Rewinds every subscription to the start of the log and delivers it
    /// again, the way a consumer group replays after an offset reset.
    pub async fn redeliver_all(&self) -> usize {
        {
            let _delivery = self.delivery.lock().await;
            let mut state = self.state.write().await;
            for subscription in &mut state.subscriptions {
                subscription.positions.fill(0);
            }
        }
        self.deliver_pending().await
    }

    /// Spawns a consumer that delivers new messages as they are published and
    /// retries failed deliveries every `retry_interval`, until `shutdown`
    /// turns true or its sender is dropped.
    pub fn spawn_consumer(
        &self,
        retry_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let bus = self.clone();

        tokio::spawn(async move {
            let mut retry = tokio::time::interval(retry_interval);
            retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = bus.published.notified() => {}
                    _ = retry.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let delivered = bus.deliver_pending().await;
                if delivered > 0 {
                    tracing::debug!(delivered, "bus messages delivered");
                }
            }

            tracing::info!("bus consumer stopped");
        })
    }

    /// Returns the partition a key is routed to.
    pub fn partition_for(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % u64::from(self.partitions)) as u32
    }

    async fn next_delivery(
        &self,
        index: usize,
        partition: usize,
    ) -> Option<(Arc<dyn MessageHandler>, PublishedMessage)> {
        let state = self.state.read().await;
        let subscription = &state.subscriptions[index];
        let position = subscription.positions[partition];
        let log_index = *state.partitions[partition].get(position)?;
        Some((Arc::clone(&subscription.handler), state.log[log_index].clone()))
    }

    async fn deliver(handler: &dyn MessageHandler, message: &PublishedMessage) -> Result<()> {
        match EventId::parse_str(&message.key) {
            Ok(event_id) => handler.on_event(event_id, &message.payload).await,
            Err(e) => {
                tracing::warn!(key = %message.key, error = %e, "skipping delivery with non-event key");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let ack_delay = {
            let mut state = self.state.write().await;
            if state.unavailable {
                return Err(BusError::Unavailable("broker is down".to_string()));
            }
            if state.fail_remaining > 0 {
                state.fail_remaining -= 1;
                return Err(BusError::Unavailable("connection refused".to_string()));
            }
            if state.reject {
                return Err(BusError::Rejected(format!("topic {topic} refused message")));
            }
            state.ack_delay
        };

        if let Some(delay) = ack_delay {
            tokio::time::sleep(delay).await;
        }

        let partition = self.partition_for(key);
        let offset = {
            let mut state = self.state.write().await;
            let index = state.log.len();
            let offset = state.partitions[partition as usize].len();
            state.log.push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                partition,
                offset,
                payload: payload.to_vec(),
            });
            state.partitions[partition as usize].push(index);
            offset
        };

        self.published.notify_one();
        tracing::debug!(topic, key, partition, offset, "message acknowledged");
        Ok(())
    }
}
