//! Periodic tick driver.
//!
//! Calls [`BrokerSession::tick`] every time a [`TickSource`] fires, until the
//! shutdown signal is raised, the source runs dry or the session is gone.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::ports::TickSource;
use crate::service::{BrokerSession, WeakBrokerSession};

/// Tokio interval. The first tick fires one period after creation; missed
/// ticks are skipped rather than bunched.
pub struct IntervalTickSource {
    interval: Interval,
}

impl IntervalTickSource {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl TickSource for IntervalTickSource {
    async fn next_tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Tick source fired by hand, for tests and single-step tools.
pub struct ManualTickSource {
    receiver: mpsc::UnboundedReceiver<()>,
}

/// Sending half of a [`ManualTickSource`]. Dropping it exhausts the source.
#[derive(Clone)]
pub struct ManualTicker {
    sender: mpsc::UnboundedSender<()>,
}

impl ManualTickSource {
    /// A connected ticker and source.
    pub fn channel() -> (ManualTicker, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ManualTicker { sender }, Self { receiver })
    }
}

impl ManualTicker {
    /// Fire one tick. Returns `false` if the source is gone.
    pub fn fire(&self) -> bool {
        self.sender.send(()).is_ok()
    }
}

#[async_trait]
impl TickSource for ManualTickSource {
    async fn next_tick(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }
}

pub struct TickDriver<S> {
    session: WeakBrokerSession,
    source: S,
    shutdown: watch::Receiver<bool>,
}

impl<S: TickSource + 'static> TickDriver<S> {
    /// The driver holds the session weakly so it never keeps a connection
    /// open by itself.
    pub fn new(session: &BrokerSession, source: S, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            session: session.downgrade(),
            source,
            shutdown,
        }
    }

    /// Run until stopped. Returns the number of ticks delivered.
    pub async fn run(mut self) -> u64 {
        let mut ticks = 0u64;
        if *self.shutdown.borrow() {
            return ticks;
        }

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!("Tick driver received shutdown");
                        break;
                    }
                }
                fired = self.source.next_tick() => {
                    if !fired {
                        debug!("Tick source exhausted");
                        break;
                    }
                    let Some(session) = self.session.upgrade() else {
                        debug!("Session dropped, stopping tick driver");
                        break;
                    };
                    if session.is_closed() {
                        break;
                    }
                    session.tick();
                    ticks += 1;
                }
            }
        }

        info!(ticks, "Tick driver stopped");
        ticks
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }
}

/// Interval-driven tick task for `session` using its configured period.
pub fn spawn_interval_driver(
    session: &BrokerSession,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    let source = IntervalTickSource::new(session.config().tick_interval());
    TickDriver::new(session, source, shutdown).spawn()
}
