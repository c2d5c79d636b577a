//! The retrieval loop: decides when to receive and hands out one resolved
//! message per demand.

use crate::config::{PollingMode, WaitTimes};
use crate::error::StreamError;
use crate::message::ResolvedMessage;
use crate::poll::{PollBuffer, PollCycle, Step, MAX_BATCH_SIZE, MAX_WAIT_SECONDS};
use crate::stream::CancelSignal;
use futures::StreamExt;
use std::time::Duration;
use tracing::debug;

enum Cadence {
    Continuous,
    Scheduled {
        schedule: WaitTimes,
        /// A tick's first receive returned messages; keep receiving without
        /// waiting until a batch comes back empty.
        draining: bool,
    },
}

/// Retrieval state of one stream
pub(crate) struct RetrievalLoop {
    buffer: PollBuffer,
    cadence: Cadence,
}

impl RetrievalLoop {
    pub(crate) fn new(polling: &PollingMode) -> Self {
        let cadence = match polling {
            PollingMode::Continuous => Cadence::Continuous,
            PollingMode::Scheduled(schedule) => Cadence::Scheduled {
                schedule: schedule(),
                draining: false,
            },
        };
        Self {
            buffer: PollBuffer::default(),
            cadence,
        }
    }

    /// Produce the next message
    ///
    /// Returns `Ok(None)` once the stream is cancelled or its schedule is
    /// exhausted. Receives happen only while the buffer is empty, so there is
    /// never more than one batch held or requested at a time.
    pub(crate) async fn next_message(
        &mut self,
        cycle: &PollCycle<'_>,
        cancel: &mut CancelSignal,
    ) -> Result<Option<ResolvedMessage>, StreamError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            match cycle.resolve_next(&mut self.buffer).await? {
                Step::Message(message) => return Ok(Some(message)),
                Step::Dropped => continue,
                Step::Drained => {}
            }

            match &mut self.cadence {
                Cadence::Continuous => {
                    cycle
                        .receive(&mut self.buffer, MAX_BATCH_SIZE, MAX_WAIT_SECONDS)
                        .await?;
                }
                Cadence::Scheduled { draining, .. } if *draining => {
                    if cycle.receive(&mut self.buffer, MAX_BATCH_SIZE, 0).await? == 0 {
                        debug!("Tick drained");
                        *draining = false;
                    }
                }
                Cadence::Scheduled { schedule, draining } => {
                    let wait = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(None),
                        tick = schedule.next() => match tick {
                            Some(wait) => wait,
                            None => {
                                debug!("Wait-time schedule exhausted");
                                return Ok(None);
                            }
                        },
                    };

                    if cycle
                        .receive(&mut self.buffer, MAX_BATCH_SIZE, whole_seconds(wait))
                        .await?
                        > 0
                    {
                        *draining = true;
                    }
                }
            }
        }
    }
}

/// Tick wait rounded to the nearest whole second
fn whole_seconds(wait: Duration) -> u64 {
    wait.saturating_add(Duration::from_millis(500)).as_secs()
}

#[cfg(test)]
#[path = "retrieval_tests.rs"]
mod tests;
