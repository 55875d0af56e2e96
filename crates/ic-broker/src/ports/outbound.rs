//! Outbound Ports (Driven Ports)
//!
//! The periodic trigger is external to the broker. Anything that can say
//! "the timer fired" implements [`TickSource`].

use async_trait::async_trait;

/// Source of periodic tick events (Driven Port)
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick.
    ///
    /// Returns `false` once the source is exhausted and will never fire again.
    async fn next_tick(&mut self) -> bool;
}
