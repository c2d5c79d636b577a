//! Stream lifecycle: client acquisition, message delivery and release.
//!
//! A [`MessageStream`] owns one queue client and, in overflow mode, one
//! object-store client. Both are shut down exactly once, store first, when
//! the stream completes, fails, is cancelled, closed or dropped.

use crate::config::{OverflowMode, StreamConfig};
use crate::error::StreamError;
use crate::lease::{ClientLease, StoreLease, StreamClients};
use crate::message::{QueueUrl, ResolvedMessage};
use crate::poll::PollCycle;
use crate::resolver::PayloadResolver;
use crate::retrieval::RetrievalLoop;
use crate::service::Service;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

// ============================================================================
// Cancellation
// ============================================================================

/// Requests cancellation of a [`MessageStream`] from anywhere
///
/// Cancellation is observed before the next receive, between buffered
/// messages and while waiting for a schedule tick. A call that is already in
/// flight runs to completion.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Ask the stream to stop
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Receiving side of a [`CancelHandle`]
pub(crate) struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub(crate) fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested
    pub(crate) async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone: nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

/// Linked cancel handle and signal
pub(crate) fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle {
            sender: Arc::new(sender),
        },
        CancelSignal { receiver },
    )
}

// ============================================================================
// Message Stream
// ============================================================================

/// An open stream of resolved messages
pub struct MessageStream {
    clients: Option<StreamClients>,
    queue_url: QueueUrl,
    service: Arc<Service>,
    retrieval: RetrievalLoop,
    cancel_handle: CancelHandle,
    cancel: CancelSignal,
}

impl MessageStream {
    /// Acquire clients and resolve the queue URL
    ///
    /// Clients acquired before a failure are shut down before the error is
    /// returned.
    pub async fn open(config: StreamConfig) -> Result<Self, StreamError> {
        let queue_name = config.queue_name().clone();
        let queue = ClientLease::new((config.queue_factory())()?, "queue");

        let store = match config.overflow() {
            OverflowMode::Inline => None,
            OverflowMode::Overflow {
                bucket,
                store_factory,
            } => Some(StoreLease {
                bucket: bucket.clone(),
                client: ClientLease::new(store_factory()?, "object_store"),
            }),
        };

        let clients = StreamClients::new(queue, store);
        let queue_url = clients.queue().get_queue_url(&queue_name).await?;

        let service = Arc::new(config.service());
        let retrieval = RetrievalLoop::new(config.polling());
        let (cancel_handle, cancel) = cancel_pair();

        info!(
            queue = %service.queue_name(),
            queue_url = %queue_url,
            bucket = ?service.bucket_name().map(|b| b.as_str()),
            polling = ?config.polling(),
            "Opened message stream"
        );

        Ok(Self {
            clients: Some(clients),
            queue_url,
            service,
            retrieval,
            cancel_handle,
            cancel,
        })
    }

    /// Wait for the next message
    ///
    /// Returns `None` once the stream has ended. An error is yielded once and
    /// ends the stream.
    pub async fn next(&mut self) -> Option<Result<ResolvedMessage, StreamError>> {
        let clients = self.clients.as_ref()?;

        let resolver = PayloadResolver::new(
            clients.payload_source(),
            clients.queue(),
            &self.queue_url,
            &self.service,
        );
        let cycle = PollCycle::new(clients.queue(), &self.queue_url, resolver);

        let outcome = self.retrieval.next_message(&cycle, &mut self.cancel).await;
        match outcome {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                self.release();
                None
            }
            Err(e) => {
                error!(
                    queue = %self.service.queue_name(),
                    error = %e,
                    "Message stream failed"
                );
                self.release();
                Some(Err(e))
            }
        }
    }

    /// Adapt to a [`futures::Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Result<ResolvedMessage, StreamError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next().await?;
            Some((item, stream))
        })
    }

    /// Handle that cancels this stream
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// Capabilities shared with every message of this stream
    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Queue URL resolved at open time
    pub fn queue_url(&self) -> &QueueUrl {
        &self.queue_url
    }

    /// Whether the stream still holds its clients
    pub fn is_open(&self) -> bool {
        self.clients.is_some()
    }

    /// Cancel the stream and release its clients now
    pub fn close(&mut self) {
        self.cancel_handle.cancel();
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut clients) = self.clients.take() {
            clients.release();
            info!(queue = %self.service.queue_name(), "Released message stream clients");
        }
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("queue_url", &self.queue_url)
            .field("service", &self.service)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
