//! Stream configuration and its builder.
//!
//! A [`StreamBuilder`] collects options by value and validates them once, in
//! [`StreamBuilder::build`]. The resulting [`StreamConfig`] is immutable and
//! can open any number of independent streams.

use crate::client::{ObjectStore, ObjectStoreFactory, QueueService, QueueServiceFactory};
use crate::error::{ConfigurationError, QueueError, StorageError, StreamError};
use crate::message::{BucketName, QueueName};
use crate::service::Service;
use crate::stream::MessageStream;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Stream of long-poll wait times, one element per tick
pub type WaitTimes = BoxStream<'static, Duration>;

/// Produces a fresh [`WaitTimes`] stream for every opened stream
pub type WaitTimeSchedule = Arc<dyn Fn() -> WaitTimes + Send + Sync>;

// ============================================================================
// Modes
// ============================================================================

/// Where message payloads live
#[derive(Clone)]
pub enum OverflowMode {
    /// The queue message body is the payload
    Inline,
    /// The queue message body is the key of an object in `bucket`
    Overflow {
        bucket: BucketName,
        store_factory: ObjectStoreFactory,
    },
}

impl std::fmt::Debug for OverflowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Overflow { bucket, .. } => f
                .debug_struct("Overflow")
                .field("bucket", bucket)
                .finish_non_exhaustive(),
        }
    }
}

/// How receives are driven
#[derive(Clone)]
pub enum PollingMode {
    /// Back-to-back long polls
    Continuous,
    /// One long poll per schedule tick, followed by zero-wait drains
    Scheduled(WaitTimeSchedule),
}

impl std::fmt::Debug for PollingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuous => f.write_str("Continuous"),
            Self::Scheduled(_) => f.write_str("Scheduled"),
        }
    }
}

// ============================================================================
// Stream Configuration
// ============================================================================

/// Validated, immutable stream configuration
#[derive(Clone)]
pub struct StreamConfig {
    queue_name: QueueName,
    queue_factory: QueueServiceFactory,
    overflow: OverflowMode,
    polling: PollingMode,
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("queue_name", &self.queue_name)
            .field("overflow", &self.overflow)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl StreamConfig {
    /// Queue the stream reads from
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Client factory for the queue service
    pub fn queue_factory(&self) -> &QueueServiceFactory {
        &self.queue_factory
    }

    /// Payload location
    pub fn overflow(&self) -> &OverflowMode {
        &self.overflow
    }

    /// Receive cadence
    pub fn polling(&self) -> &PollingMode {
        &self.polling
    }

    /// Follow-up operations for this configuration without opening a stream
    ///
    /// Useful for producers that only send.
    pub fn service(&self) -> Service {
        Service::new(
            self.queue_name.clone(),
            Arc::clone(&self.queue_factory),
            self.overflow.clone(),
        )
    }

    /// Open a new stream with this configuration
    pub async fn open(&self) -> Result<MessageStream, StreamError> {
        MessageStream::open(self.clone()).await
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Clone)]
enum ScheduleSpec {
    Custom(WaitTimeSchedule),
    Interval(Duration),
}

/// Builder for [`StreamConfig`]
///
/// ```ignore
/// let stream = StreamBuilder::new("orders")
///     .with_queue_factory(move || Ok(Box::new(queue.client()) as Box<dyn QueueService>))
///     .with_interval(Duration::from_secs(30))
///     .open()
///     .await?;
/// ```
#[derive(Clone)]
pub struct StreamBuilder {
    queue_name: String,
    bucket_name: Option<String>,
    queue_factory: Option<QueueServiceFactory>,
    store_factory: Option<ObjectStoreFactory>,
    schedule: Option<ScheduleSpec>,
}

impl StreamBuilder {
    /// Start a configuration for `queue_name`
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            bucket_name: None,
            queue_factory: None,
            store_factory: None,
            schedule: None,
        }
    }

    /// Store payloads in this overflow bucket
    pub fn with_bucket_name(mut self, bucket: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket.into());
        self
    }

    /// Constructor for queue clients
    pub fn with_queue_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn QueueService>, QueueError> + Send + Sync + 'static,
    {
        self.queue_factory = Some(Arc::new(factory));
        self
    }

    /// Constructor for overflow-store clients
    pub fn with_store_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn ObjectStore>, StorageError> + Send + Sync + 'static,
    {
        self.store_factory = Some(Arc::new(factory));
        self
    }

    /// Poll on a schedule of wait times
    ///
    /// `factory` is called once per opened stream. Each element is one tick;
    /// its value is the long-poll wait for that tick's first receive, rounded
    /// to the nearest second. The stream completes when the schedule does.
    pub fn with_wait_times<F, S>(mut self, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: futures::Stream<Item = Duration> + Send + 'static,
    {
        self.schedule = Some(ScheduleSpec::Custom(Arc::new(move || factory().boxed())));
        self
    }

    /// Poll immediately, then once every `period`, without long-poll waits
    pub fn with_interval(mut self, period: Duration) -> Self {
        self.schedule = Some(ScheduleSpec::Interval(period));
        self
    }

    /// Validate the options and produce a [`StreamConfig`]
    ///
    /// No factory is called here.
    pub fn build(self) -> Result<StreamConfig, StreamError> {
        let queue_name = QueueName::new(self.queue_name)?;

        let queue_factory = self.queue_factory.ok_or_else(|| ConfigurationError::Missing {
            key: "queue_factory".to_string(),
        })?;

        let overflow = match (self.bucket_name, self.store_factory) {
            (None, None) => OverflowMode::Inline,
            (Some(bucket), Some(store_factory)) => OverflowMode::Overflow {
                bucket: BucketName::new(bucket)?,
                store_factory,
            },
            (Some(_), None) => {
                return Err(ConfigurationError::Missing {
                    key: "store_factory".to_string(),
                }
                .into())
            }
            (None, Some(_)) => {
                return Err(ConfigurationError::Missing {
                    key: "bucket_name".to_string(),
                }
                .into())
            }
        };

        let polling = match self.schedule {
            None => PollingMode::Continuous,
            Some(ScheduleSpec::Custom(schedule)) => PollingMode::Scheduled(schedule),
            Some(ScheduleSpec::Interval(period)) if period.is_zero() => {
                return Err(ConfigurationError::Invalid {
                    message: "polling interval must be greater than zero".to_string(),
                }
                .into())
            }
            Some(ScheduleSpec::Interval(period)) => PollingMode::Scheduled(interval_schedule(period)),
        };

        Ok(StreamConfig {
            queue_name,
            queue_factory,
            overflow,
            polling,
        })
    }

    /// Build the configuration and open a stream with it
    pub async fn open(self) -> Result<MessageStream, StreamError> {
        MessageStream::open(self.build()?).await
    }
}

/// Zero-wait ticks: one immediately, then one per `period`
///
/// Ticks missed during a long drain are delayed, not replayed.
fn interval_schedule(period: Duration) -> WaitTimeSchedule {
    Arc::new(move || {
        stream::unfold(None::<Interval>, move |interval| async move {
            // Created on first poll so the timer belongs to the consuming runtime.
            let mut interval = interval.unwrap_or_else(|| {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });
            interval.tick().await;
            Some((Duration::ZERO, Some(interval)))
        })
        .boxed()
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
