//! One bounded receive against the queue service, and in-order resolution of
//! what it returned.

use crate::client::QueueService;
use crate::error::StreamError;
use crate::message::{QueueUrl, RawMessage, ResolvedMessage};
use crate::resolver::PayloadResolver;
use chrono::Duration;
use std::collections::VecDeque;
use tracing::debug;

/// Largest batch a single receive asks for
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest wait a single receive may block for on the service side
pub const MAX_WAIT_SECONDS: u64 = 20;

/// Raw messages received but not yet resolved, in receive order
///
/// Only ever holds one batch: it is refilled only once it has been drained.
#[derive(Debug, Default)]
pub(crate) struct PollBuffer {
    messages: VecDeque<RawMessage>,
}

impl PollBuffer {
    pub(crate) fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn refill(&mut self, batch: Vec<RawMessage>) {
        debug_assert!(self.messages.is_empty());
        self.messages.extend(batch);
    }

    fn pop(&mut self) -> Option<RawMessage> {
        self.messages.pop_front()
    }
}

/// Outcome of resolving one buffered message
#[derive(Debug)]
pub(crate) enum Step {
    /// The message resolved to a payload
    Message(ResolvedMessage),
    /// The message pointed at a missing object and was deleted
    Dropped,
    /// The buffer was empty
    Drained,
}

/// Receive-and-resolve operations for one stream, borrowing its clients
pub(crate) struct PollCycle<'a> {
    queue: &'a dyn QueueService,
    queue_url: &'a QueueUrl,
    resolver: PayloadResolver<'a>,
}

impl<'a> PollCycle<'a> {
    pub(crate) fn new(
        queue: &'a dyn QueueService,
        queue_url: &'a QueueUrl,
        resolver: PayloadResolver<'a>,
    ) -> Self {
        Self {
            queue,
            queue_url,
            resolver,
        }
    }

    /// Issue one receive call and store the batch in `buffer`
    ///
    /// Returns the number of messages received.
    pub(crate) async fn receive(
        &self,
        buffer: &mut PollBuffer,
        max_messages: u32,
        wait_seconds: u64,
    ) -> Result<usize, StreamError> {
        let wait_seconds = wait_seconds.min(MAX_WAIT_SECONDS);
        debug!(
            queue_url = %self.queue_url,
            max_messages = max_messages,
            wait_seconds = wait_seconds,
            "Receiving messages"
        );

        let batch = self
            .queue
            .receive_messages(
                self.queue_url,
                max_messages.clamp(1, MAX_BATCH_SIZE),
                Duration::seconds(wait_seconds as i64),
            )
            .await?;

        let received = batch.len();
        debug!(batch_size = received, "Received batch");
        buffer.refill(batch);
        Ok(received)
    }

    /// Resolve the oldest buffered message
    pub(crate) async fn resolve_next(&self, buffer: &mut PollBuffer) -> Result<Step, StreamError> {
        let Some(raw) = buffer.pop() else {
            return Ok(Step::Drained);
        };

        Ok(match self.resolver.resolve(raw).await? {
            Some(message) => Step::Message(message),
            None => Step::Dropped,
        })
    }
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
