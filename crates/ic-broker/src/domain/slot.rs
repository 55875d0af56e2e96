//! # Deferred Completion Slot
//!
//! Holds at most one request awaiting completion by the periodic tick, plus
//! the result to apply when the tick fires.
//!
//! ```text
//!   [Empty] ──arm──→ [Armed(req, result)] ──tick──→ [Completing] ──→ [Empty]
//!      ↑                     │
//!      └──────cancel─────────┘
//! ```
//!
//! The slot never decides the tick-vs-cancel race by itself. `tick` asks the
//! request to unmark itself; a failed unmark means the cancel routine owns the
//! completion and the slot only forgets the request.

use super::request::{CancelRoutine, CancelledRequest, IoStatus, Request, RequestId};
use crate::error::BrokerError;

/// Result computed when the request was armed, applied on tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecomputedResult {
    pub status: IoStatus,
    pub information: usize,
}

impl PrecomputedResult {
    pub fn success(information: usize) -> Self {
        Self {
            status: IoStatus::Success,
            information,
        }
    }
}

/// Observable phase of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Empty,
    Armed,
    Completing,
}

#[derive(Debug)]
enum SlotState {
    Empty,
    Armed {
        request: Request,
        result: PrecomputedResult,
    },
    Completing,
}

/// A request the slot refused to arm. The caller completes it with `reason`.
#[derive(Debug)]
pub struct ArmRejected {
    pub request: Request,
    pub reason: BrokerError,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was armed.
    Idle,
    /// The tick won and completed the request.
    Completed {
        request_id: RequestId,
        result: PrecomputedResult,
    },
    /// The cancel routine won; the slot was cleared without completing.
    LostToCancel { request_id: RequestId },
}

#[derive(Debug)]
pub struct DeferredCompletionSlot {
    state: SlotState,
}

impl Default for DeferredCompletionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredCompletionSlot {
    pub fn new() -> Self {
        Self {
            state: SlotState::Empty,
        }
    }

    pub fn phase(&self) -> SlotPhase {
        match self.state {
            SlotState::Empty => SlotPhase::Empty,
            SlotState::Armed { .. } => SlotPhase::Armed,
            SlotState::Completing => SlotPhase::Completing,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, SlotState::Armed { .. })
    }

    pub fn armed_id(&self) -> Option<RequestId> {
        match &self.state {
            SlotState::Armed { request, .. } => Some(request.id()),
            _ => None,
        }
    }

    /// Arm the slot with `request`, making it cancelable through `on_cancel`.
    ///
    /// # Errors
    ///
    /// The request is handed back with `Busy` when the slot is occupied, or
    /// with `Cancelled` when its cancellation signal was raised before it
    /// could be marked.
    pub fn arm(
        &mut self,
        request: Request,
        result: PrecomputedResult,
        on_cancel: CancelRoutine,
    ) -> Result<(), ArmRejected> {
        if !matches!(self.state, SlotState::Empty) {
            return Err(ArmRejected {
                request,
                reason: BrokerError::Busy,
            });
        }
        if let Err(reason) = request.mark_cancelable(on_cancel) {
            return Err(ArmRejected { request, reason });
        }
        self.state = SlotState::Armed { request, result };
        Ok(())
    }

    /// Resolve the armed request, if any.
    pub fn tick(&mut self) -> TickOutcome {
        let SlotState::Armed { request, result } =
            std::mem::replace(&mut self.state, SlotState::Completing)
        else {
            self.state = SlotState::Empty;
            return TickOutcome::Idle;
        };

        let request_id = request.id();
        let won = request.unmark_cancelable().is_ok();
        self.state = SlotState::Empty;
        if won {
            request.complete(result.status, result.information);
            TickOutcome::Completed { request_id, result }
        } else {
            TickOutcome::LostToCancel { request_id }
        }
    }

    /// Cancel routine body for a request armed here.
    ///
    /// Clears the slot if it still holds this request and completes the
    /// request as cancelled. Returns whether the slot held it.
    pub fn cancel(&mut self, cancelled: CancelledRequest) -> bool {
        let held = self.armed_id() == Some(cancelled.id());
        if held {
            self.state = SlotState::Empty;
        }
        cancelled.complete();
        held
    }

    /// Take the armed request out without completing it.
    pub fn drain(&mut self) -> Option<Request> {
        match std::mem::replace(&mut self.state, SlotState::Empty) {
            SlotState::Armed { request, .. } => Some(request),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn noop_routine() -> CancelRoutine {
        Box::new(|cancelled: CancelledRequest| cancelled.complete())
    }

    /// Cancel routine that goes through the slot, like the session does.
    fn slot_routine(slot: &Arc<Mutex<DeferredCompletionSlot>>) -> CancelRoutine {
        let slot = Arc::clone(slot);
        Box::new(move |cancelled: CancelledRequest| {
            slot.lock().cancel(cancelled);
        })
    }

    #[test]
    fn test_tick_on_empty_is_idle() {
        let mut slot = DeferredCompletionSlot::new();
        assert_eq!(slot.tick(), TickOutcome::Idle);
        assert_eq!(slot.phase(), SlotPhase::Empty);
    }

    #[test]
    fn test_tick_completes_with_precomputed_result() {
        let mut slot = DeferredCompletionSlot::new();
        let (mut request, mut handle) = Request::read(8);
        request.output_mut().fill(b"hello").unwrap();
        let id = request.id();

        slot.arm(request, PrecomputedResult::success(5), noop_routine())
            .unwrap();
        assert_eq!(slot.phase(), SlotPhase::Armed);
        assert!(handle.try_completion().is_none());

        let outcome = slot.tick();
        assert_eq!(
            outcome,
            TickOutcome::Completed {
                request_id: id,
                result: PrecomputedResult::success(5),
            }
        );
        let completion = handle.try_completion().unwrap();
        assert_eq!(completion.data, b"hello");
        assert_eq!(slot.phase(), SlotPhase::Empty);
    }

    #[test]
    fn test_second_arm_is_busy() {
        let mut slot = DeferredCompletionSlot::new();
        let (first, _h1) = Request::read(4);
        let (second, _h2) = Request::read(4);

        slot.arm(first, PrecomputedResult::success(0), noop_routine())
            .unwrap();
        let rejected = slot
            .arm(second, PrecomputedResult::success(0), noop_routine())
            .unwrap_err();
        assert_eq!(rejected.reason, BrokerError::Busy);
    }

    #[test]
    fn test_cancel_wins_then_tick_is_noop() {
        let slot = Arc::new(Mutex::new(DeferredCompletionSlot::new()));
        let (request, mut handle) = Request::read(4);
        let id = request.id();
        slot.lock()
            .arm(request, PrecomputedResult::success(0), slot_routine(&slot))
            .unwrap();

        assert!(handle.cancel());
        assert_eq!(slot.lock().phase(), SlotPhase::Empty);
        assert_eq!(slot.lock().tick(), TickOutcome::Idle);

        let completion = handle.try_completion().unwrap();
        assert_eq!(completion.request_id, id);
        assert_eq!(completion.status, IoStatus::Cancelled);
        assert!(handle.try_completion().is_none());
    }

    #[test]
    fn test_tick_observes_pending_cancel() {
        let mut slot = DeferredCompletionSlot::new();
        let (request, mut handle) = Request::read(4);
        let id = request.id();

        // Routine parks the cancelled request instead of completing it, as a
        // cancel routine blocked on the session lock would.
        let parked = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&parked);
        slot.arm(
            request,
            PrecomputedResult::success(0),
            Box::new(move |cancelled: CancelledRequest| {
                *sink.lock() = Some(cancelled);
            }),
        )
        .unwrap();

        handle.cancel();
        assert_eq!(slot.tick(), TickOutcome::LostToCancel { request_id: id });
        assert!(handle.try_completion().is_none());

        let cancelled = parked.lock().take().unwrap();
        assert!(!slot.cancel(cancelled));
        assert_eq!(handle.try_completion().unwrap().status, IoStatus::Cancelled);
    }

    #[test]
    fn test_rearm_after_resolution() {
        let mut slot = DeferredCompletionSlot::new();
        let (first, _h1) = Request::read(4);
        slot.arm(first, PrecomputedResult::success(0), noop_routine())
            .unwrap();
        slot.tick();

        let (second, _h2) = Request::read(4);
        assert!(slot
            .arm(second, PrecomputedResult::success(0), noop_routine())
            .is_ok());
    }

    #[test]
    fn test_arm_after_cancel_signal_is_rejected() {
        let mut slot = DeferredCompletionSlot::new();
        let (request, handle) = Request::read(4);
        handle.cancel();

        let rejected = slot
            .arm(request, PrecomputedResult::success(0), noop_routine())
            .unwrap_err();
        assert_eq!(rejected.reason, BrokerError::Cancelled);
        assert_eq!(slot.phase(), SlotPhase::Empty);
    }
}
