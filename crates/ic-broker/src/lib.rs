//! # IC Broker
//!
//! Inverted-call notification broker. A consumer issues a long-lived,
//! cancellable "wait for event" request; a producer's write later completes
//! it. Independently, a read is held until a periodic tick completes it.
//! Every request is completed exactly once, even when the tick or a write
//! races the issuer's cancellation signal.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure state, no I/O
//!   - `Request` / `IoHandle`: the two halves of one caller operation
//!   - `PendingRequestRegistry`: FIFO of notification waiters
//!   - `DeferredCompletionSlot`: single read awaiting the tick
//!   - `SharedContext`: per-connection state behind one lock
//!   - `BrokerConfig`: configuration with validation
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `NotificationBrokerApi`: Driving port
//!   - `TickSource`: Driven port (the periodic trigger)
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `BrokerSession`: Implements `NotificationBrokerApi`
//!
//! - **Handler Layer** (`handler/`): Control codes and buffer validation
//!
//! - **Adapters Layer** (`adapters/`): Tokio tick driver, in-process client
//!
//! ## Invariants
//!
//! - A request is completed exactly once: by the broker, by its cancel
//!   routine, or by the close drain. Never by two of them.
//! - A request sits in at most one of {registry, slot} at a time.
//! - Writes are delivered to waiters in arrival order.
//!
//! ## Usage Example
//!
//! ```ignore
//! use ic_broker::{BrokerClient, BrokerConfig, BrokerSession, spawn_interval_driver};
//!
//! let session = BrokerSession::open(BrokerConfig::default())?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let driver = spawn_interval_driver(&session, shutdown_rx);
//!
//! let client = BrokerClient::new(session.clone());
//! let registration = client.register_reader().await?;
//! let waiter = client.await_notification(registration);
//! client.write("Hello, world!").await?;
//! let notification = waiter.wait().await?;
//!
//! shutdown_tx.send(true)?;
//! driver.await?;
//! session.close();
//! ```

#![warn(clippy::all)]
#![warn(clippy::unwrap_used, clippy::expect_used)]
#![deny(unsafe_code)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::{
    spawn_interval_driver, BrokerClient, IntervalTickSource, ManualTickSource, ManualTicker,
    TickDriver,
};
pub use domain::{
    BrokerConfig, BrokerConfigBuilder, CancelSignal, Completion, IoHandle, IoStatus,
    LoggedMessage, NotifyOutcome, OutputBuffer, PrecomputedResult, Request, RequestId,
    RequestKind, TickOutcome,
};
pub use error::{BrokerError, ConfigError};
pub use handler::{ControlCode, ReaderRegistration, IOCTL_ADD_READER, IOCTL_AWAIT_NOTIFICATION};
pub use metrics::{BrokerMetrics, Metrics, MetricsSnapshot, NoOpMetrics};
pub use ports::{Dispatch, NotificationBrokerApi, TickSource};
pub use service::{BrokerSession, WeakBrokerSession};
