//! # Broker Session
//!
//! One `BrokerSession` per logical connection. It owns the [`SharedContext`]
//! behind a single mutex; every mutation of the registry, the slot, the write
//! buffer and the sequence counter happens while holding it.
//!
//! ## Request routing
//!
//! | Request | Outcome |
//! |---------|---------|
//! | `Read` of 0 bytes, or nothing written yet | completed, success / 0 |
//! | `Read` otherwise | armed in the slot, completed by the next tick |
//! | `Write` over the write cap | completed, `BufferOverflow` |
//! | `Write` otherwise | delivered to every pending waiter, then completed |
//! | `AddReader` | completed with the placeholder registration |
//! | `AwaitNotification` | held in the registry until a write |
//!
//! Cancel routines capture a weak reference to the session. They lock the
//! context before touching it, so they serialize with notify and tick the same
//! way every other operation does.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::domain::{
    BrokerConfig, CancelRoutine, CancelledRequest, IoStatus, LoggedMessage, NotifyOutcome,
    PrecomputedResult, Request, RequestKind, SharedContext, TickOutcome,
};
use crate::error::{BrokerError, ConfigError};
use crate::handler::{
    validate_add_reader, validate_await_notification, ControlCode, ReaderRegistration,
};
use crate::metrics::{BrokerMetrics, NoOpMetrics};
use crate::ports::{Dispatch, NotificationBrokerApi};

/// Where a held request lives, so its cancel routine knows what to clear.
#[derive(Debug, Clone, Copy)]
enum Holder {
    Registry,
    Slot,
}

struct SessionInner {
    config: BrokerConfig,
    context: Mutex<SharedContext>,
    metrics: Arc<dyn BrokerMetrics>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let context = self.context.get_mut();
        if !context.is_closed() {
            let drained = context.close();
            if drained > 0 {
                warn!(drained, "Session dropped with held requests");
            }
            self.metrics.record_drained(drained);
        }
    }
}

/// A per-connection notification broker.
///
/// Cheap to clone; clones share the same context. The context is closed when
/// [`BrokerSession::close`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct BrokerSession {
    inner: Arc<SessionInner>,
}

impl BrokerSession {
    /// Open a session with metrics disabled.
    pub fn open(config: BrokerConfig) -> Result<Self, ConfigError> {
        Self::with_metrics(config, Arc::new(NoOpMetrics))
    }

    pub fn with_metrics(
        config: BrokerConfig,
        metrics: Arc<dyn BrokerMetrics>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let context = SharedContext::new(&config);
        info!(
            tick_interval_ms = config.tick_interval_ms,
            max_write_length = config.max_write_length,
            "Broker session opened"
        );
        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                context: Mutex::new(context),
                metrics,
            }),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// A handle that does not keep the session alive.
    pub fn downgrade(&self) -> WeakBrokerSession {
        WeakBrokerSession {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Route a request. See the module docs for the routing table.
    pub fn submit(&self, request: Request) -> Dispatch {
        self.inner.metrics.record_submitted();
        debug!(request_id = %request.id(), kind = request.kind().label(), "Request submitted");

        match *request.kind() {
            RequestKind::Read { length } => self.submit_read(request, length),
            RequestKind::Write { .. } => self.submit_write(request),
            RequestKind::DeviceControl { code, .. } => self.submit_control(request, code),
        }
    }

    /// One delivery attempt for `payload`.
    pub fn notify(&self, payload: &[u8]) -> NotifyOutcome {
        let outcome = self.inner.context.lock().notify(payload);
        self.inner.metrics.record_notify(&outcome);
        match outcome {
            NotifyOutcome::Matched {
                request_id,
                bytes_copied,
            } => debug!(request_id = %request_id, bytes_copied, "Notification delivered"),
            NotifyOutcome::MatchedButBufferInvalid { request_id } => {
                warn!(request_id = %request_id, "Waiter buffer unavailable")
            }
            NotifyOutcome::NoPendingWaiters => {}
        }
        outcome
    }

    /// Resolve the deferred read, if one is armed. No-op after close.
    pub fn tick(&self) -> TickOutcome {
        let outcome = {
            let mut context = self.inner.context.lock();
            if context.is_closed() {
                return TickOutcome::Idle;
            }
            context.slot.tick()
        };
        self.inner.metrics.record_tick(&outcome);
        match outcome {
            TickOutcome::Completed { request_id, result } => debug!(
                request_id = %request_id,
                status = ?result.status,
                information = result.information,
                "Deferred request completed by tick"
            ),
            TickOutcome::LostToCancel { request_id } => {
                debug!(request_id = %request_id, "Tick lost race to cancel")
            }
            TickOutcome::Idle => {}
        }
        outcome
    }

    /// Drain every held request with `ConnectionClosing`.
    ///
    /// Later submissions complete immediately with `ConnectionClosing`.
    /// Returns how many held requests this call completed.
    pub fn close(&self) -> usize {
        let drained = {
            let mut context = self.inner.context.lock();
            if context.is_closed() {
                return 0;
            }
            context.close()
        };
        self.inner.metrics.record_drained(drained);
        info!(drained, "Broker session closed");
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.inner.context.lock().is_closed()
    }

    pub fn pending_waiters(&self) -> usize {
        self.inner.context.lock().registry.len()
    }

    pub fn has_deferred_request(&self) -> bool {
        self.inner.context.lock().slot.is_armed()
    }

    pub fn last_sequence(&self) -> u64 {
        self.inner.context.lock().last_sequence()
    }

    pub fn recent_messages(&self, n: usize) -> Vec<LoggedMessage> {
        self.inner.context.lock().recent_messages(n)
    }

    fn submit_read(&self, mut request: Request, length: usize) -> Dispatch {
        let mut context = self.inner.context.lock();
        if context.is_closed() {
            drop(context);
            return self.fail_now(request, &BrokerError::ConnectionClosing);
        }
        if length == 0 {
            drop(context);
            return self.complete_now(request, IoStatus::Success, 0);
        }
        let Some(stored) = context.last_write() else {
            drop(context);
            return self.complete_now(request, IoStatus::Success, 0);
        };

        let available = stored.len().min(length);
        let copied = match request.output_mut().fill(&stored[..available]) {
            Ok(copied) => copied,
            Err(err) => {
                drop(context);
                return self.fail_now(request, &err);
            }
        };

        let request_id = request.id();
        let routine = self.cancel_routine(Holder::Slot);
        let armed = context
            .slot
            .arm(request, PrecomputedResult::success(copied), routine);
        drop(context);

        match armed {
            Ok(()) => {
                self.inner.metrics.record_pended();
                debug!(request_id = %request_id, copied, "Read armed for next tick");
                Dispatch::Pending { request_id }
            }
            Err(rejected) => {
                if rejected.reason == BrokerError::Busy {
                    self.inner.metrics.record_busy();
                }
                self.fail_now(rejected.request, &rejected.reason)
            }
        }
    }

    fn submit_write(&self, request: Request) -> Dispatch {
        let length = request.input().len();
        if self.is_closed() {
            return self.fail_now(request, &BrokerError::ConnectionClosing);
        }
        if length == 0 {
            return self.complete_now(request, IoStatus::Success, 0);
        }
        let capacity = self.inner.config.max_write_length;
        if length > capacity {
            warn!(length, capacity, "Write too long");
            return self.fail_now(request, &BrokerError::BufferOverflow { length, capacity });
        }

        let recorded = {
            let mut context = self.inner.context.lock();
            if context.is_closed() {
                Err(BrokerError::ConnectionClosing)
            } else {
                context.record_write(request.input())
            }
        };
        let sequence = match recorded {
            Ok(sequence) => sequence,
            Err(err) => return self.fail_now(request, &err),
        };
        self.inner.metrics.record_write(length);

        let mut delivered = 0usize;
        while self.notify(request.input()) != NotifyOutcome::NoPendingWaiters {
            delivered += 1;
        }
        debug!(sequence, delivered, length, "Write processed");

        self.complete_now(request, IoStatus::Success, length)
    }

    fn submit_control(&self, request: Request, code: u32) -> Dispatch {
        let control = match ControlCode::try_from(code) {
            Ok(control) => control,
            Err(err) => return self.fail_now(request, &err),
        };
        if self.is_closed() {
            return self.fail_now(request, &BrokerError::ConnectionClosing);
        }

        match control {
            ControlCode::AddReader => self.add_reader(request),
            ControlCode::AwaitNotification => self.await_notification(request),
        }
    }

    fn add_reader(&self, mut request: Request) -> Dispatch {
        if let Err(err) = validate_add_reader(request.output().capacity()) {
            return self.fail_now(request, &err);
        }
        let encoded = ReaderRegistration::PLACEHOLDER.encode();
        match request.output_mut().fill(&encoded) {
            Ok(written) => self.complete_now(request, IoStatus::Success, written),
            Err(err) => self.fail_now(request, &err),
        }
    }

    fn await_notification(&self, request: Request) -> Dispatch {
        let capacity = request.output().capacity();
        let registration = match validate_await_notification(request.input(), capacity) {
            Ok(registration) => registration,
            Err(err) => return self.fail_now(request, &err),
        };

        let request_id = request.id();
        let mut context = self.inner.context.lock();
        if context.is_closed() {
            drop(context);
            return self.fail_now(request, &BrokerError::ConnectionClosing);
        }
        if let Err(err) = request.mark_cancelable(self.cancel_routine(Holder::Registry)) {
            drop(context);
            return self.fail_now(request, &err);
        }
        context.registry.enqueue(request);
        let waiters = context.registry.len();
        drop(context);

        self.inner.metrics.record_pended();
        debug!(
            request_id = %request_id,
            reader_id = registration.reader_id,
            message_id = registration.message_id,
            waiters,
            "Waiter registered"
        );
        Dispatch::Pending { request_id }
    }

    fn complete_now(&self, request: Request, status: IoStatus, information: usize) -> Dispatch {
        let request_id = request.id();
        let information = if status.is_success() { information } else { 0 };
        request.complete(status, information);
        self.inner.metrics.record_inline_completion(status);
        Dispatch::Completed {
            request_id,
            status,
            information,
        }
    }

    fn fail_now(&self, request: Request, err: &BrokerError) -> Dispatch {
        debug!(request_id = %request.id(), error = %err, "Request failed");
        self.complete_now(request, err.status(), 0)
    }

    fn cancel_routine(&self, holder: Holder) -> CancelRoutine {
        let session: Weak<SessionInner> = Arc::downgrade(&self.inner);
        Box::new(move |cancelled: CancelledRequest| {
            let Some(inner) = session.upgrade() else {
                cancelled.complete();
                return;
            };
            let request_id = cancelled.id();
            {
                let mut context = inner.context.lock();
                match holder {
                    Holder::Slot => {
                        context.slot.cancel(cancelled);
                    }
                    Holder::Registry => {
                        context.registry.remove(request_id);
                        cancelled.complete();
                    }
                }
            }
            inner.metrics.record_cancelled();
            debug!(request_id = %request_id, holder = ?holder, "Request cancelled");
        })
    }
}

/// Non-owning reference to a [`BrokerSession`].
#[derive(Clone)]
pub struct WeakBrokerSession {
    inner: Weak<SessionInner>,
}

impl WeakBrokerSession {
    pub fn upgrade(&self) -> Option<BrokerSession> {
        self.inner.upgrade().map(|inner| BrokerSession { inner })
    }
}

impl fmt::Debug for WeakBrokerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBrokerSession")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl NotificationBrokerApi for BrokerSession {
    fn submit(&self, request: Request) -> Dispatch {
        BrokerSession::submit(self, request)
    }

    fn notify(&self, payload: &[u8]) -> NotifyOutcome {
        BrokerSession::notify(self, payload)
    }

    fn tick(&self) -> TickOutcome {
        BrokerSession::tick(self)
    }

    fn close(&self) -> usize {
        BrokerSession::close(self)
    }

    fn last_sequence(&self) -> u64 {
        BrokerSession::last_sequence(self)
    }

    fn recent_messages(&self, n: usize) -> Vec<LoggedMessage> {
        BrokerSession::recent_messages(self, n)
    }
}

impl fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSession")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputBuffer;
    use crate::handler::{IOCTL_ADD_READER, IOCTL_AWAIT_NOTIFICATION};
    use crate::metrics::Metrics;

    fn session() -> BrokerSession {
        BrokerSession::open(BrokerConfig::default()).unwrap()
    }

    fn waiter(session: &BrokerSession, capacity: usize) -> crate::domain::IoHandle {
        let (request, handle) =
            Request::device_control(IOCTL_AWAIT_NOTIFICATION, [0u8; 8], capacity);
        assert!(session.submit(request).is_pending());
        handle
    }

    #[test]
    fn test_read_before_any_write_returns_zero() {
        let session = session();
        let (request, mut handle) = Request::read(16);
        let dispatch = session.submit(request);

        assert_eq!(dispatch.status(), Some(IoStatus::Success));
        let completion = handle.try_completion().unwrap();
        assert_eq!(completion.information, 0);
        assert!(!session.has_deferred_request());
    }

    #[test]
    fn test_read_after_write_waits_for_tick() {
        let session = session();
        let (write, _w) = Request::write(b"hello".to_vec());
        session.submit(write);

        let (read, mut handle) = Request::read(3);
        assert!(session.submit(read).is_pending());
        assert!(handle.try_completion().is_none());

        assert!(matches!(session.tick(), TickOutcome::Completed { .. }));
        let completion = handle.try_completion().unwrap();
        assert_eq!(completion.data, b"hel");
    }

    #[test]
    fn test_second_read_is_busy() {
        let metrics = Arc::new(Metrics::new());
        let session = BrokerSession::with_metrics(BrokerConfig::default(), metrics.clone()).unwrap();
        let (write, _w) = Request::write(b"x".to_vec());
        session.submit(write);

        let (first, _h1) = Request::read(4);
        let (second, mut h2) = Request::read(4);
        session.submit(first);
        let dispatch = session.submit(second);

        assert_eq!(dispatch.status(), Some(IoStatus::Busy));
        assert_eq!(h2.try_completion().unwrap().status, IoStatus::Busy);
        assert_eq!(metrics.snapshot().busy_rejections, 1);
    }

    #[test]
    fn test_read_with_unavailable_buffer_fails_immediately() {
        let session = session();
        let (write, _w) = Request::write(b"hello".to_vec());
        session.submit(write);

        let (read, mut handle) = Request::read(4);
        let read = read.with_output(OutputBuffer::unavailable(4));
        let dispatch = session.submit(read);
        assert_eq!(dispatch.status(), Some(IoStatus::TransferFailed));
        assert_eq!(handle.try_completion().unwrap().information, 0);
    }

    #[test]
    fn test_write_delivers_to_all_waiters() {
        let session = session();
        let mut first = waiter(&session, 16);
        let mut second = waiter(&session, 2);

        let (write, mut writer) = Request::write(b"hello".to_vec());
        session.submit(write);

        assert_eq!(first.try_completion().unwrap().data, b"hello");
        assert_eq!(second.try_completion().unwrap().data, b"he");
        let completion = writer.try_completion().unwrap();
        assert_eq!(completion.status, IoStatus::Success);
        assert_eq!(completion.information, 5);
        assert_eq!(session.pending_waiters(), 0);
    }

    #[test]
    fn test_add_reader_returns_placeholder_pair() {
        let session = session();
        let (request, mut handle) = Request::device_control(IOCTL_ADD_READER, Vec::new(), 8);
        session.submit(request);

        let completion = handle.try_completion().unwrap();
        assert_eq!(completion.status, IoStatus::Success);
        assert_eq!(completion.information, 8);
        assert_eq!(completion.data, [0u8; 8]);
    }

    #[test]
    fn test_unknown_control_code_is_rejected() {
        let session = session();
        let (request, mut handle) = Request::device_control(0xdead_beef, [0u8; 8], 8);
        session.submit(request);
        assert_eq!(
            handle.try_completion().unwrap().status,
            IoStatus::InvalidArgument
        );
    }

    #[test]
    fn test_cancel_waiter_removes_it() {
        let session = session();
        let mut handle = waiter(&session, 8);

        assert!(handle.cancel());
        assert_eq!(session.pending_waiters(), 0);
        assert_eq!(handle.try_completion().unwrap().status, IoStatus::Cancelled);
        assert_eq!(session.notify(b"late"), NotifyOutcome::NoPendingWaiters);
    }

    #[test]
    fn test_cancel_before_submit_completes_cancelled() {
        let session = session();
        let (request, mut handle) =
            Request::device_control(IOCTL_AWAIT_NOTIFICATION, [0u8; 8], 4);
        handle.cancel();

        let dispatch = session.submit(request);
        assert_eq!(dispatch.status(), Some(IoStatus::Cancelled));
        assert_eq!(handle.try_completion().unwrap().status, IoStatus::Cancelled);
        assert_eq!(session.pending_waiters(), 0);
    }

    #[test]
    fn test_closed_session_rejects_and_ignores_ticks() {
        let session = session();
        let mut held = waiter(&session, 8);

        assert_eq!(session.close(), 1);
        assert_eq!(
            held.try_completion().unwrap().status,
            IoStatus::ConnectionClosing
        );

        let (read, _h) = Request::read(4);
        assert_eq!(
            session.submit(read).status(),
            Some(IoStatus::ConnectionClosing)
        );
        assert_eq!(session.tick(), TickOutcome::Idle);
        assert_eq!(session.close(), 0);
    }

    #[test]
    fn test_unbounded_read_length_returns_stored_payload() {
        let session = session();
        let (write, _w) = Request::write(b"hello".to_vec());
        session.submit(write);

        let (read, mut handle) = Request::read(usize::MAX);
        assert!(session.submit(read).is_pending());
        assert!(matches!(session.tick(), TickOutcome::Completed { .. }));

        let completion = handle.try_completion().unwrap();
        assert_eq!(completion.information, 5);
        assert_eq!(completion.data, b"hello");
    }

    #[test]
    fn test_closed_session_rejects_every_request_kind() {
        let session = session();
        session.close();

        let requests = [
            Request::read(0),
            Request::read(4),
            Request::write(Vec::new()),
            Request::write(b"late".to_vec()),
            Request::device_control(IOCTL_AWAIT_NOTIFICATION, [0u8; 8], 8),
            Request::device_control(IOCTL_ADD_READER, Vec::new(), 8),
        ];
        for (request, mut handle) in requests {
            let kind = request.kind().label();
            assert_eq!(
                session.submit(request).status(),
                Some(IoStatus::ConnectionClosing),
                "{kind} after close"
            );
            assert_eq!(
                handle.try_completion().unwrap().status,
                IoStatus::ConnectionClosing
            );
        }
        assert_eq!(session.last_sequence(), 0);
        assert_eq!(session.pending_waiters(), 0);
    }

    #[test]
    fn test_dropping_session_drains_held_requests() {
        let session = session();
        let mut held = waiter(&session, 8);
        drop(session);

        assert_eq!(
            held.try_completion().unwrap().status,
            IoStatus::ConnectionClosing
        );
        // The cancel routine outlives the session and must not panic.
        assert!(!held.cancel());
    }

    #[test]
    fn test_sequence_and_message_log_track_writes() {
        let session = session();
        for payload in [&b"one"[..], b"two", b"three"] {
            let (write, _w) = Request::write(payload.to_vec());
            session.submit(write);
        }
        assert_eq!(session.last_sequence(), 3);
        let recent = session.recent_messages(2);
        assert_eq!(recent[0].payload, b"two");
        assert_eq!(recent[1].sequence, 3);
    }
}
