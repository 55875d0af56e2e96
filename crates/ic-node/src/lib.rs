//! # IC Node Runtime
//!
//! Runs one broker session with a live tick and replays the notification
//! round trip a client application performs against it.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (env)
//! 2. Open the broker session
//! 3. Spawn the tick driver
//! 4. Run the demo client flow
//! 5. Shut down: stop the driver, close the session
//!
//! ## Demo Flow
//!
//! ```text
//! client ──AddReader──────────→ broker   (0, 0)
//! client ──AwaitNotification──→ broker   pending
//! client ──Write(message)─────→ broker ──→ waiter completes with message
//! client ──Read(n)────────────→ broker   armed
//!                      tick ──→ broker ──→ read completes with message
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;

pub use config::{NodeConfig, DEFAULT_DEMO_MESSAGE};

use std::sync::Arc;

use ic_broker::{
    spawn_interval_driver, BrokerClient, BrokerError, BrokerSession, ConfigError, Metrics,
    MetricsSnapshot, ReaderRegistration,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Runtime errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker request failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("Tick driver is not running")]
    DriverNotStarted,
}

/// What the demo flow observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    pub reader_id: u32,
    pub message_id: u32,
    pub bytes_written: usize,
    pub sequence: u64,
    pub notification: Vec<u8>,
    pub read_back: Vec<u8>,
}

impl DemoReport {
    pub fn notification_text(&self) -> String {
        String::from_utf8_lossy(&self.notification).into_owned()
    }
}

/// The node runtime owning one broker session.
pub struct NodeRuntime {
    config: NodeConfig,
    session: BrokerSession,
    metrics: Arc<Metrics>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    driver: Option<JoinHandle<u64>>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        info!("Creating inverted-call node runtime");
        let metrics = Arc::new(Metrics::new());
        let session = BrokerSession::with_metrics(config.broker.clone(), metrics.clone())?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            session,
            metrics,
            shutdown_tx,
            shutdown_rx,
            driver: None,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn session(&self) -> &BrokerSession {
        &self.session
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Spawn the tick driver. Idempotent.
    pub fn start(&mut self) {
        if self.driver.is_some() {
            return;
        }
        info!(
            tick_interval_ms = self.config.broker.tick_interval_ms,
            "Starting tick driver"
        );
        self.driver = Some(spawn_interval_driver(
            &self.session,
            self.shutdown_rx.clone(),
        ));
    }

    /// Run the client round trip against the session.
    ///
    /// The deferred read at the end needs a tick, so the driver must be
    /// running.
    pub async fn run_demo(&self) -> Result<DemoReport, NodeError> {
        if self.driver.is_none() {
            return Err(NodeError::DriverNotStarted);
        }
        let client = BrokerClient::new(self.session.clone());

        let ReaderRegistration {
            reader_id,
            message_id,
        } = client.register_reader().await?;
        info!(reader_id, message_id, "Reader registered");

        let waiter = client.await_notification(ReaderRegistration {
            reader_id,
            message_id,
        });
        let bytes_written = client.write(self.config.demo_message.as_bytes()).await?;
        let sequence = self.session.last_sequence();

        let notification = waiter.wait().await?.into_result()?;
        info!(
            sequence,
            bytes = notification.len(),
            payload = %String::from_utf8_lossy(&notification),
            ">>> Notification received"
        );

        let read = client.read(self.config.read_length);
        let read_back = read.wait().await?.into_result()?;
        info!(bytes = read_back.len(), "Deferred read completed by tick");

        Ok(DemoReport {
            reader_id,
            message_id,
            bytes_written,
            sequence,
            notification,
            read_back,
        })
    }

    /// Stop the tick driver and close the session.
    ///
    /// Returns the number of ticks the driver delivered.
    pub async fn shutdown(mut self) -> u64 {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let ticks = match self.driver.take() {
            Some(driver) => driver.await.unwrap_or_else(|e| {
                error!("Tick driver task failed: {}", e);
                0
            }),
            None => 0,
        };

        let drained = self.session.close();
        info!(ticks, drained, metrics = ?self.metrics.snapshot(), "Shutdown complete");
        ticks
    }
}
