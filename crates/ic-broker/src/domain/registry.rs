//! Pending request registry.
//!
//! Holds requests waiting for a notification, oldest first. Every entry is
//! marked cancelable while it sits here; the registry itself never completes
//! anything.

use std::collections::VecDeque;

use super::request::{Request, RequestId};

/// FIFO of requests waiting for the next notification.
#[derive(Debug, Default)]
pub struct PendingRequestRegistry {
    queue: VecDeque<Request>,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: Request) {
        self.queue.push_back(request);
    }

    /// Remove and return the oldest waiter.
    pub fn dequeue_oldest(&mut self) -> Option<Request> {
        self.queue.pop_front()
    }

    /// Remove a specific waiter, used by the cancel routine.
    pub fn remove(&mut self, id: RequestId) -> Option<Request> {
        let index = self.queue.iter().position(|r| r.id() == id)?;
        self.queue.remove(index)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.queue.iter().any(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove every waiter in arrival order.
    pub fn drain(&mut self) -> Vec<Request> {
        self.queue.drain(..).collect()
    }
}
