//! Service Layer
//!
//! Orchestrates the domain under the per-connection lock.

pub mod broker;

pub use broker::{BrokerSession, WeakBrokerSession};
