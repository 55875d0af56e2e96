//! Inbound Ports (Driving Ports)
//!
//! The API a transport uses to hand requests to a session and the API the
//! periodic trigger uses to drive it.

use crate::domain::{IoStatus, LoggedMessage, NotifyOutcome, Request, RequestId, TickOutcome};

/// Immediate result of submitting a request.
///
/// `Completed` means the completion was already delivered to the issuer's
/// handle. `Pending` means the broker holds the request and a later notify,
/// tick, cancel or close completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Completed {
        request_id: RequestId,
        status: IoStatus,
        information: usize,
    },
    Pending {
        request_id: RequestId,
    },
}

impl Dispatch {
    pub fn request_id(&self) -> RequestId {
        match self {
            Dispatch::Completed { request_id, .. } | Dispatch::Pending { request_id } => *request_id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Dispatch::Pending { .. })
    }

    pub fn status(&self) -> Option<IoStatus> {
        match self {
            Dispatch::Completed { status, .. } => Some(*status),
            Dispatch::Pending { .. } => None,
        }
    }
}

/// Notification broker API (Driving Port)
pub trait NotificationBrokerApi: Send + Sync {
    /// Route a request: complete it now or hold it.
    fn submit(&self, request: Request) -> Dispatch;

    /// Deliver `payload` to the oldest pending waiter, one transfer per call.
    fn notify(&self, payload: &[u8]) -> NotifyOutcome;

    /// Periodic trigger for the deferred completion slot.
    fn tick(&self) -> TickOutcome;

    /// Drain every held request with `ConnectionClosing`.
    ///
    /// Returns the number of requests completed by the drain.
    fn close(&self) -> usize;

    /// Sequence number of the last accepted write.
    fn last_sequence(&self) -> u64;

    /// Up to `n` most recent logged writes, oldest first.
    fn recent_messages(&self, n: usize) -> Vec<LoggedMessage>;
}
