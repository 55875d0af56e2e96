//! Domain layer for the notification broker
//!
//! Pure state: requests and their cancellation state machine, the pending
//! registry, the deferred completion slot and the shared per-connection
//! context. No I/O and no async.

pub mod buffer;
pub mod config;
pub mod context;
pub mod message_log;
pub mod registry;
pub mod request;
pub mod slot;

pub use buffer::WriteBuffer;
pub use config::{
    BrokerConfig, BrokerConfigBuilder, DEFAULT_TICK_INTERVAL_MS, MAX_WRITE_LENGTH, MESSAGE_SIZE,
    NUM_MESSAGES,
};
pub use context::{NotifyOutcome, SharedContext};
pub use message_log::{LoggedMessage, MessageLog};
pub use registry::PendingRequestRegistry;
pub use request::{
    CancelRoutine, CancelSignal, CancelledRequest, Completion, IoHandle, IoStatus, OutputBuffer,
    Request, RequestId, RequestKind,
};
pub use slot::{ArmRejected, DeferredCompletionSlot, PrecomputedResult, SlotPhase, TickOutcome};
