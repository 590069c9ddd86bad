//! Outbox dispatcher draining pending records to the message bus.

use std::time::Instant;

use bus::{BusError, MessageBus};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::DispatcherConfig;
use crate::registry::EventRegistry;
use crate::store::{ClaimedRecord, OutboxStore};
use crate::{OutboxRecord, OutboxStatus, Result};

/// Outcome of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The broker acknowledged the message; the record is processed.
    Published,
    /// The attempt failed; the record stays pending for a later cycle.
    Retrying,
    /// The attempt failed and retries are exhausted; the record is failed.
    DeadLettered,
}

/// Summary of a single dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub published: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Published => self.published += 1,
            AttemptOutcome::Retrying => self.retried += 1,
            AttemptOutcome::DeadLettered => self.dead_lettered += 1,
        }
    }
}

/// Drains pending outbox records to the bus with at-least-once semantics.
///
/// Each cycle claims up to `batch_size` records, one short transaction per
/// record, oldest first. Records locked by another dispatcher are skipped,
/// so any number of dispatchers may share one store.
pub struct OutboxDispatcher<S, B>
where
    S: OutboxStore,
    B: MessageBus,
{
    store: S,
    bus: B,
    registry: EventRegistry,
    config: DispatcherConfig,
}

impl<S, B> OutboxDispatcher<S, B>
where
    S: OutboxStore,
    B: MessageBus,
{
    /// Creates a dispatcher decoding payloads with the default registry.
    pub fn new(store: S, bus: B, config: DispatcherConfig) -> Self {
        Self {
            store,
            bus,
            registry: EventRegistry::default(),
            config,
        }
    }

    /// Replaces the payload registry.
    pub fn with_registry(mut self, registry: EventRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs one dispatch cycle.
    ///
    /// Every attempt's outcome is saved before the next record is claimed.
    /// A record that failed in this cycle is not claimed again until the
    /// next one. Store errors end the cycle early; records already saved
    /// stay saved.
    #[tracing::instrument(skip(self), fields(topic = %self.config.topic))]
    pub async fn run_cycle(&self) -> Result<BatchReport> {
        let started = Instant::now();
        let cutoff = Utc::now();
        let mut report = BatchReport::default();

        while report.claimed < self.config.batch_size {
            let Some(mut claim) = self.store.claim_next(cutoff).await? else {
                break;
            };
            report.claimed += 1;

            let outcome = self.attempt(claim.record_mut()).await?;
            claim.save().await?;
            report.record(outcome);
        }

        metrics::histogram!("outbox_dispatch_cycle_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Publishes one claimed record and applies the resulting transition.
    async fn attempt(&self, record: &mut OutboxRecord) -> Result<AttemptOutcome> {
        if record.retries_exhausted(self.config.max_retry_attempts) {
            record.mark_dead_lettered(Utc::now())?;
            metrics::counter!("outbox_events_dead_lettered_total").increment(1);
            tracing::error!(
                event_id = %record.event_id,
                retry_count = record.retry_count,
                max_retry_attempts = self.config.max_retry_attempts,
                "outbox event dead-lettered without publishing; retries already exhausted"
            );
            return Ok(AttemptOutcome::DeadLettered);
        }

        match self.publish(record).await {
            Ok(()) => {
                record.mark_processed(Utc::now())?;
                metrics::counter!("outbox_events_published_total").increment(1);
                tracing::info!(event_id = %record.event_id, "outbox event published");
                Ok(AttemptOutcome::Published)
            }
            Err(e) => {
                let status =
                    record.record_failed_attempt(Utc::now(), self.config.max_retry_attempts)?;
                metrics::counter!("outbox_publish_failures_total").increment(1);

                if status == OutboxStatus::Failed {
                    metrics::counter!("outbox_events_dead_lettered_total").increment(1);
                    tracing::error!(
                        event_id = %record.event_id,
                        retry_count = record.retry_count,
                        error = %e,
                        "outbox event dead-lettered after exhausting retries"
                    );
                    Ok(AttemptOutcome::DeadLettered)
                } else {
                    tracing::warn!(
                        event_id = %record.event_id,
                        retry_count = record.retry_count,
                        error = %e,
                        "failed to publish outbox event"
                    );
                    Ok(AttemptOutcome::Retrying)
                }
            }
        }
    }

    async fn publish(&self, record: &OutboxRecord) -> Result<()> {
        let payload = self.registry.decode(record)?;
        let key = record.event_id.to_string();
        let timeout = self.config.publish_timeout;

        match tokio::time::timeout(
            timeout,
            self.bus.publish(&self.config.topic, &key, &payload),
        )
        .await
        {
            Ok(ack) => ack.map_err(Into::into),
            Err(_) => Err(BusError::AckTimeout(timeout).into()),
        }
    }

    /// Runs dispatch cycles on a fixed delay until `shutdown` turns true or
    /// its sender is dropped.
    ///
    /// A failing cycle is logged and the loop carries on.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.dispatch_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            batch_size = self.config.batch_size,
            interval_ms = self.config.dispatch_interval.as_millis() as u64,
            max_retry_attempts = self.config.max_retry_attempts,
            "outbox dispatcher started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_cycle().await {
                        Ok(report) if report.claimed > 0 => {
                            tracing::info!(
                                claimed = report.claimed,
                                published = report.published,
                                retried = report.retried,
                                dead_lettered = report.dead_lettered,
                                "outbox batch processed"
                            );
                        }
                        Ok(_) => tracing::debug!("no pending outbox events"),
                        Err(e) => tracing::error!(error = %e, "outbox dispatch cycle failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("outbox dispatcher stopped");
    }
}
