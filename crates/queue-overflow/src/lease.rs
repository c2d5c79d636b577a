//! Scoped ownership of queue and overflow-store clients.

use crate::client::{ManagedClient, ObjectStore, QueueService};
use crate::message::BucketName;
use crate::resolver::PayloadSource;
use std::ops::Deref;
use tracing::debug;

/// Exclusive ownership of one client, shut down exactly once
///
/// The client is shut down by [`ClientLease::release`] or, failing that,
/// when the lease is dropped.
pub(crate) struct ClientLease<C: ?Sized + ManagedClient> {
    client: Box<C>,
    label: &'static str,
    released: bool,
}

impl<C: ?Sized + ManagedClient> ClientLease<C> {
    pub(crate) fn new(client: Box<C>, label: &'static str) -> Self {
        Self {
            client,
            label,
            released: false,
        }
    }

    /// Shut the client down if that has not happened yet
    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.client.shutdown();
            debug!(client = self.label, "Client shut down");
        }
    }
}

impl<C: ?Sized + ManagedClient> Deref for ClientLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C: ?Sized + ManagedClient> Drop for ClientLease<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Overflow store client together with the bucket it serves
pub(crate) struct StoreLease {
    pub(crate) bucket: BucketName,
    pub(crate) client: ClientLease<dyn ObjectStore>,
}

/// The clients owned by one open stream
///
/// Field order matters: the store lease is declared first so that it is
/// also dropped first.
pub(crate) struct StreamClients {
    store: Option<StoreLease>,
    queue: ClientLease<dyn QueueService>,
}

impl StreamClients {
    pub(crate) fn new(queue: ClientLease<dyn QueueService>, store: Option<StoreLease>) -> Self {
        Self { store, queue }
    }

    pub(crate) fn queue(&self) -> &dyn QueueService {
        &*self.queue
    }

    /// Where payloads of this stream are read from
    pub(crate) fn payload_source(&self) -> PayloadSource<'_> {
        match &self.store {
            Some(store) => PayloadSource::Overflow {
                bucket: &store.bucket,
                store: &*store.client,
            },
            None => PayloadSource::Inline,
        }
    }

    /// Release the store client, then the queue client
    pub(crate) fn release(&mut self) {
        if let Some(store) = self.store.as_mut() {
            store.client.release();
        }
        self.queue.release();
    }
}

impl Drop for StreamClients {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
