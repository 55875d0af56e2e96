//! Per-connection shared state.
//!
//! Everything here is mutated under the session's single lock. None of these
//! methods block or take locks of their own.

use tracing::debug;

use super::buffer::WriteBuffer;
use super::config::BrokerConfig;
use super::message_log::{LoggedMessage, MessageLog};
use super::registry::PendingRequestRegistry;
use super::request::{IoStatus, Request, RequestId};
use super::slot::DeferredCompletionSlot;
use crate::error::BrokerError;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No waiter was pending. The delivery loop stops here.
    NoPendingWaiters,
    /// The oldest waiter received `bytes_copied` bytes.
    Matched {
        request_id: RequestId,
        bytes_copied: usize,
    },
    /// The oldest waiter's buffer was gone; it completed with `TransferFailed`.
    MatchedButBufferInvalid { request_id: RequestId },
}

#[derive(Debug)]
pub struct SharedContext {
    pub registry: PendingRequestRegistry,
    pub slot: DeferredCompletionSlot,
    last_write: WriteBuffer,
    messages: MessageLog,
    closed: bool,
}

impl SharedContext {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            registry: PendingRequestRegistry::new(),
            slot: DeferredCompletionSlot::new(),
            last_write: WriteBuffer::new(config.max_write_length),
            messages: MessageLog::new(config.message_log_capacity, config.message_size),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sequence number of the last accepted write, 0 before the first.
    pub fn last_sequence(&self) -> u64 {
        self.last_write.sequence().unwrap_or(0)
    }

    pub fn last_write(&self) -> Option<&[u8]> {
        self.last_write.contents()
    }

    pub fn recent_messages(&self, n: usize) -> Vec<LoggedMessage> {
        self.messages.recent(n)
    }

    /// Store `payload` as the last write and log it.
    ///
    /// Returns the sequence number assigned to it.
    pub fn record_write(&mut self, payload: &[u8]) -> Result<u64, BrokerError> {
        let sequence = self.last_sequence() + 1;
        self.last_write.store(sequence, payload)?;
        self.messages.push(sequence, payload);
        Ok(sequence)
    }

    /// Deliver `payload` to the oldest pending waiter.
    ///
    /// At most one buffer transfer happens per call; the payload is capped to
    /// the write capacity. Waiters whose cancellation is already in flight
    /// are skipped, their cancel routine completes them.
    pub fn notify(&mut self, payload: &[u8]) -> NotifyOutcome {
        let length = payload.len().min(self.last_write.capacity());
        let payload = &payload[..length];

        loop {
            let Some(mut waiter) = self.registry.dequeue_oldest() else {
                return NotifyOutcome::NoPendingWaiters;
            };
            let request_id = waiter.id();
            if waiter.unmark_cancelable().is_err() {
                debug!(request_id = %request_id, "Skipping waiter with pending cancel");
                continue;
            }

            return match waiter.output_mut().fill(payload) {
                Ok(bytes_copied) => {
                    waiter.complete(IoStatus::Success, bytes_copied);
                    NotifyOutcome::Matched {
                        request_id,
                        bytes_copied,
                    }
                }
                Err(err) => {
                    waiter.fail(&err);
                    NotifyOutcome::MatchedButBufferInvalid { request_id }
                }
            };
        }
    }

    /// Mark the context closed and complete every held request with
    /// `ConnectionClosing`. Returns how many were completed here.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        let mut held: Vec<Request> = self.registry.drain();
        held.extend(self.slot.drain());

        let mut completed = 0;
        for request in held {
            if request.unmark_cancelable().is_ok() {
                request.fail(&BrokerError::ConnectionClosing);
                completed += 1;
            }
        }
        completed
    }
}
