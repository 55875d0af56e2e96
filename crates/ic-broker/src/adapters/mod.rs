//! Adapters Layer
//!
//! Tokio-backed tick sources and an in-process client.

pub mod client;
pub mod tick_driver;

pub use client::BrokerClient;
pub use tick_driver::{
    spawn_interval_driver, IntervalTickSource, ManualTickSource, ManualTicker, TickDriver,
};
