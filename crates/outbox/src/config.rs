use std::time::Duration;

/// Tuning knobs for the outbox dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum number of records handled per cycle.
    pub batch_size: usize,
    /// Delay between the end of one cycle and the start of the next.
    pub dispatch_interval: Duration,
    /// Failed attempts after which a record is dead-lettered.
    pub max_retry_attempts: u32,
    /// Topic every record is published to.
    pub topic: String,
    /// Upper bound on waiting for a broker acknowledgment.
    pub publish_timeout: Duration,
}

impl DispatcherConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_millis(5000);
    pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;
    pub const DEFAULT_TOPIC: &'static str = "order-created";
    pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration publishing to `topic` with default tuning.
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            dispatch_interval: Self::DEFAULT_DISPATCH_INTERVAL,
            max_retry_attempts: Self::DEFAULT_MAX_RETRY_ATTEMPTS,
            topic: Self::DEFAULT_TOPIC.to_string(),
            publish_timeout: Self::DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}
