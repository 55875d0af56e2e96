//! # Requests and Cancellation
//!
//! A [`Request`] is the broker-side half of one caller operation. The issuer
//! keeps the other half, an [`IoHandle`], which receives the completion and
//! carries the cancellation signal for exactly that request.
//!
//! ## Cancellation State Machine
//!
//! ```text
//!            mark_cancelable              cancel()
//!   [Idle] ─────────────────→ [Cancelable] ─────────→ [CancelRequested]
//!     ↑  │                         │                         │
//!     │  │ cancel()                │ unmark_cancelable       │ cancel routine
//!     │  ↓                         ↓                         ↓
//!     │ [CancelRequested]       [Idle] ──complete──→ [Completed]
//!     └────────────────────────────┘
//! ```
//!
//! `unmark_cancelable` and `cancel()` race on the same compare-exchange out of
//! `Cancelable`. The winner owns completion; the loser observes the other
//! state and does nothing.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::BrokerError;

const STATE_IDLE: u8 = 0;
const STATE_CANCELABLE: u8 = 1;
const STATE_CANCEL_REQUESTED: u8 = 2;
const STATE_COMPLETED: u8 = 3;

/// Caller-visible identity of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal status of a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoStatus {
    Success,
    InvalidArgument,
    BufferOverflow,
    TransferFailed,
    Cancelled,
    Busy,
    ConnectionClosing,
    Unsuccessful,
}

impl IoStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == IoStatus::Success
    }
}

/// What the issuer asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Read back the last written payload.
    Read { length: usize },
    /// Deliver a payload to pending waiters and store it.
    Write { payload: Vec<u8> },
    /// Control-code tagged call with an input buffer.
    DeviceControl { code: u32, input: Vec<u8> },
}

impl RequestKind {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Read { .. } => "read",
            RequestKind::Write { .. } => "write",
            RequestKind::DeviceControl { .. } => "device_control",
        }
    }
}

/// Caller output buffer.
///
/// The capacity is known when the request arrives. A transport may hand the
/// broker a buffer it can no longer map; writing into it then fails with
/// [`BrokerError::TransferFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputBuffer {
    Mapped { capacity: usize, bytes: Vec<u8> },
    Unavailable { capacity: usize },
}

impl OutputBuffer {
    /// A mapped buffer of `capacity` bytes.
    ///
    /// Nothing is allocated until [`fill`](Self::fill) copies data in.
    pub fn new(capacity: usize) -> Self {
        OutputBuffer::Mapped {
            capacity,
            bytes: Vec::new(),
        }
    }

    pub fn unavailable(capacity: usize) -> Self {
        OutputBuffer::Unavailable { capacity }
    }

    pub fn capacity(&self) -> usize {
        match self {
            OutputBuffer::Mapped { capacity, .. } | OutputBuffer::Unavailable { capacity } => {
                *capacity
            }
        }
    }

    /// Copy as much of `src` as fits, replacing previous contents.
    ///
    /// Returns the number of bytes copied.
    pub fn fill(&mut self, src: &[u8]) -> Result<usize, BrokerError> {
        match self {
            OutputBuffer::Mapped { capacity, bytes } => {
                let n = src.len().min(*capacity);
                bytes.clear();
                bytes.extend_from_slice(&src[..n]);
                Ok(n)
            }
            OutputBuffer::Unavailable { .. } => Err(BrokerError::TransferFailed),
        }
    }

    fn take(&mut self) -> Vec<u8> {
        match self {
            OutputBuffer::Mapped { bytes, .. } => std::mem::take(bytes),
            OutputBuffer::Unavailable { .. } => Vec::new(),
        }
    }
}

/// Outcome delivered to the issuer exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub request_id: RequestId,
    pub status: IoStatus,
    /// Bytes transferred.
    pub information: usize,
    /// Output bytes, empty unless the status is success.
    pub data: Vec<u8>,
}

impl Completion {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Bytes transferred on success, the matching error otherwise.
    pub fn transferred(&self) -> Result<usize, BrokerError> {
        match BrokerError::from_status(self.status) {
            None => Ok(self.information),
            Some(err) => Err(err),
        }
    }

    /// Output bytes on success, the matching error otherwise.
    pub fn into_result(self) -> Result<Vec<u8>, BrokerError> {
        match BrokerError::from_status(self.status) {
            None => Ok(self.data),
            Some(err) => Err(err),
        }
    }
}

/// Routine run when a cancellation wins against the broker.
pub type CancelRoutine = Box<dyn FnOnce(CancelledRequest) + Send + 'static>;

struct RequestCore {
    id: RequestId,
    state: AtomicU8,
    on_cancel: Mutex<Option<CancelRoutine>>,
    completer: Mutex<Option<oneshot::Sender<Completion>>>,
}

impl RequestCore {
    /// Deliver the completion. Only the first call sends anything.
    fn finish(&self, status: IoStatus, information: usize, data: Vec<u8>) -> bool {
        self.state.store(STATE_COMPLETED, Ordering::Release);
        let Some(sender) = self.completer.lock().take() else {
            return false;
        };
        let completion = Completion {
            request_id: self.id,
            status,
            information,
            data,
        };
        if sender.send(completion).is_err() {
            debug!(request_id = %self.id, "Issuer dropped before completion");
        }
        true
    }
}

/// Broker-side half of a caller operation.
pub struct Request {
    core: Arc<RequestCore>,
    kind: RequestKind,
    output: OutputBuffer,
}

impl Request {
    /// Create a request and the issuer handle that observes it.
    pub fn new(kind: RequestKind, output: OutputBuffer) -> (Self, IoHandle) {
        let (sender, receiver) = oneshot::channel();
        let core = Arc::new(RequestCore {
            id: RequestId::new(),
            state: AtomicU8::new(STATE_IDLE),
            on_cancel: Mutex::new(None),
            completer: Mutex::new(Some(sender)),
        });
        let handle = IoHandle {
            signal: CancelSignal {
                core: Arc::clone(&core),
            },
            receiver,
        };
        (Self { core, kind, output }, handle)
    }

    pub fn read(length: usize) -> (Self, IoHandle) {
        Self::new(RequestKind::Read { length }, OutputBuffer::new(length))
    }

    pub fn write(payload: impl Into<Vec<u8>>) -> (Self, IoHandle) {
        Self::new(
            RequestKind::Write {
                payload: payload.into(),
            },
            OutputBuffer::new(0),
        )
    }

    pub fn device_control(code: u32, input: impl Into<Vec<u8>>, output_capacity: usize) -> (Self, IoHandle) {
        Self::new(
            RequestKind::DeviceControl {
                code,
                input: input.into(),
            },
            OutputBuffer::new(output_capacity),
        )
    }

    pub fn id(&self) -> RequestId {
        self.core.id
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Bytes the caller sent: the write payload or the control input.
    pub fn input(&self) -> &[u8] {
        match &self.kind {
            RequestKind::Read { .. } => &[],
            RequestKind::Write { payload } => payload,
            RequestKind::DeviceControl { input, .. } => input,
        }
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputBuffer {
        &mut self.output
    }

    /// Replace the output buffer (transports use this to revoke a mapping).
    pub fn with_output(mut self, output: OutputBuffer) -> Self {
        self.output = output;
        self
    }

    /// Whether a cancellation signal has been raised and not yet resolved.
    pub fn is_cancel_requested(&self) -> bool {
        self.core.state.load(Ordering::Acquire) == STATE_CANCEL_REQUESTED
    }

    /// Allow the issuer's cancellation signal to reach `routine`.
    ///
    /// # Errors
    ///
    /// `BrokerError::Cancelled` if cancellation was requested before the
    /// request could be marked. The caller must complete it as cancelled.
    pub fn mark_cancelable(&self, routine: CancelRoutine) -> Result<(), BrokerError> {
        *self.core.on_cancel.lock() = Some(routine);
        match self.core.state.compare_exchange(
            STATE_IDLE,
            STATE_CANCELABLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) | Err(STATE_CANCELABLE) => Ok(()),
            Err(_) => {
                self.core.on_cancel.lock().take();
                Err(BrokerError::Cancelled)
            }
        }
    }

    /// Withdraw cancelability before completing the request.
    ///
    /// # Errors
    ///
    /// `BrokerError::Cancelled` if the cancellation signal got there first.
    /// The cancel routine has run or is about to; the caller must not
    /// complete the request.
    pub fn unmark_cancelable(&self) -> Result<(), BrokerError> {
        match self.core.state.compare_exchange(
            STATE_CANCELABLE,
            STATE_IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.core.on_cancel.lock().take();
                Ok(())
            }
            Err(STATE_CANCEL_REQUESTED) => Err(BrokerError::Cancelled),
            Err(_) => Ok(()),
        }
    }

    /// Complete the request. Output bytes are returned only on success.
    pub fn complete(mut self, status: IoStatus, information: usize) {
        let data = if status.is_success() {
            let mut bytes = self.output.take();
            bytes.truncate(information);
            bytes
        } else {
            Vec::new()
        };
        let information = if status.is_success() { information } else { 0 };
        self.core.finish(status, information, data);
    }

    /// Complete the request with a failure status and zero bytes.
    pub fn fail(self, error: &BrokerError) {
        self.complete(error.status(), 0);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.core.id)
            .field("kind", &self.kind.label())
            .field("output_capacity", &self.output.capacity())
            .finish()
    }
}

/// A request whose cancellation won the race.
///
/// Completing it (or dropping it) delivers `IoStatus::Cancelled`.
pub struct CancelledRequest {
    core: Arc<RequestCore>,
}

impl CancelledRequest {
    pub fn id(&self) -> RequestId {
        self.core.id
    }

    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for CancelledRequest {
    fn drop(&mut self) {
        self.core.finish(IoStatus::Cancelled, 0, Vec::new());
    }
}

impl fmt::Debug for CancelledRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelledRequest")
            .field("id", &self.core.id)
            .finish()
    }
}

/// Cancellation signal tied 1:1 to one request.
#[derive(Clone)]
pub struct CancelSignal {
    core: Arc<RequestCore>,
}

impl CancelSignal {
    pub fn request_id(&self) -> RequestId {
        self.core.id
    }

    /// Raise the cancellation signal.
    ///
    /// Returns `true` if the signal was recorded, `false` if the request
    /// had already been completed or cancelled.
    pub fn cancel(&self) -> bool {
        let mut current = self.core.state.load(Ordering::Acquire);
        loop {
            match current {
                STATE_IDLE => match self.core.state.compare_exchange(
                    STATE_IDLE,
                    STATE_CANCEL_REQUESTED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return true,
                    Err(observed) => current = observed,
                },
                STATE_CANCELABLE => match self.core.state.compare_exchange(
                    STATE_CANCELABLE,
                    STATE_CANCEL_REQUESTED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        let cancelled = CancelledRequest {
                            core: Arc::clone(&self.core),
                        };
                        let routine = self.core.on_cancel.lock().take();
                        if let Some(routine) = routine {
                            routine(cancelled);
                        }
                        return true;
                    }
                    Err(observed) => current = observed,
                },
                _ => return false,
            }
        }
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("request_id", &self.core.id)
            .finish()
    }
}

/// Issuer-side half of a request.
#[derive(Debug)]
pub struct IoHandle {
    signal: CancelSignal,
    receiver: oneshot::Receiver<Completion>,
}

impl IoHandle {
    pub fn id(&self) -> RequestId {
        self.signal.request_id()
    }

    /// Raise the cancellation signal for this request.
    pub fn cancel(&self) -> bool {
        self.signal.cancel()
    }

    /// A cloneable signal, usable while another task awaits [`IoHandle::wait`].
    pub fn cancel_signal(&self) -> CancelSignal {
        self.signal.clone()
    }

    /// Take the completion if it has been delivered.
    pub fn try_completion(&mut self) -> Option<Completion> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the completion.
    ///
    /// # Errors
    ///
    /// `BrokerError::RequestAbandoned` if the request was dropped without
    /// being completed.
    pub async fn wait(self) -> Result<Completion, BrokerError> {
        self.receiver
            .await
            .map_err(|_| BrokerError::RequestAbandoned)
    }
}
