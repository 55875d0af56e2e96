//! # Broker Property Tests
//!
//! End-to-end checks through the public API:
//!
//! 1. The read/write/tick scenario
//! 2. FIFO delivery of one payload to several waiters
//! 3. Drain semantics of `notify`
//! 4. Buffer bounds on control calls and writes
//! 5. Slot reset after every terminal resolution
//! 6. Close drains everything with `ConnectionClosing`

use ic_broker::{
    BrokerConfig, BrokerSession, Dispatch, IoStatus, Metrics, NotifyOutcome, Request,
    TickOutcome, IOCTL_AWAIT_NOTIFICATION,
};
use std::sync::Arc;

fn open() -> BrokerSession {
    BrokerSession::open(BrokerConfig::default()).expect("default config is valid")
}

fn waiter(session: &BrokerSession, capacity: usize) -> ic_broker::IoHandle {
    let (request, handle) = Request::device_control(IOCTL_AWAIT_NOTIFICATION, [0u8; 8], capacity);
    assert!(session.submit(request).is_pending());
    handle
}

#[test]
fn test_read_write_tick_scenario() {
    let session = open();

    // R1: nothing written yet
    let (r1, mut r1_handle) = Request::read(10);
    let dispatch = session.submit(r1);
    assert!(matches!(
        dispatch,
        Dispatch::Completed {
            status: IoStatus::Success,
            information: 0,
            ..
        }
    ));
    assert_eq!(r1_handle.try_completion().unwrap().information, 0);

    // Write with no waiters
    assert_eq!(session.notify(b"hello"), NotifyOutcome::NoPendingWaiters);
    let (write, mut writer) = Request::write(b"hello".to_vec());
    session.submit(write);
    let completion = writer.try_completion().unwrap();
    assert_eq!(completion.status, IoStatus::Success);
    assert_eq!(completion.information, 5);

    // R2: held until the tick
    let (r2, mut r2_handle) = Request::read(3);
    assert!(session.submit(r2).is_pending());
    assert!(r2_handle.try_completion().is_none());
    assert!(session.has_deferred_request());

    assert!(matches!(session.tick(), TickOutcome::Completed { .. }));
    let completion = r2_handle.try_completion().unwrap();
    assert_eq!(completion.status, IoStatus::Success);
    assert_eq!(completion.information, 3);
    assert_eq!(completion.data, b"hel");
}

#[test]
fn test_fifo_delivery_to_three_waiters() {
    let session = open();
    let mut w1 = waiter(&session, 64);
    let mut w2 = waiter(&session, 64);
    let mut w3 = waiter(&session, 3);
    let ids = [w1.id(), w2.id(), w3.id()];

    for expected in ids {
        match session.notify(b"payload") {
            NotifyOutcome::Matched { request_id, .. } => assert_eq!(request_id, expected),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(session.notify(b"payload"), NotifyOutcome::NoPendingWaiters);

    assert_eq!(w1.try_completion().unwrap().data, b"payload");
    assert_eq!(w2.try_completion().unwrap().data, b"payload");
    assert_eq!(w3.try_completion().unwrap().data, b"pay");
}

#[test]
fn test_notify_on_empty_registry_mutates_nothing() {
    let metrics = Arc::new(Metrics::new());
    let session = BrokerSession::with_metrics(BrokerConfig::default(), metrics.clone()).unwrap();

    assert_eq!(session.notify(b"x"), NotifyOutcome::NoPendingWaiters);
    assert_eq!(session.pending_waiters(), 0);
    assert_eq!(session.last_sequence(), 0);
    assert!(session.recent_messages(1).is_empty());
    assert_eq!(metrics.snapshot().deliveries_matched, 0);
}

#[test]
fn test_await_with_six_byte_input_is_invalid() {
    let session = open();
    let (request, mut handle) = Request::device_control(IOCTL_AWAIT_NOTIFICATION, [0u8; 6], 4);
    let dispatch = session.submit(request);

    assert_eq!(dispatch.status(), Some(IoStatus::InvalidArgument));
    let completion = handle.try_completion().unwrap();
    assert_eq!(completion.status, IoStatus::InvalidArgument);
    assert_eq!(completion.information, 0);
    assert_eq!(session.pending_waiters(), 0);
}

#[test]
fn test_write_of_513_bytes_overflows() {
    let session = open();
    let (request, mut handle) = Request::write(vec![7u8; 513]);
    session.submit(request);

    let completion = handle.try_completion().unwrap();
    assert_eq!(completion.status, IoStatus::BufferOverflow);
    assert_eq!(completion.information, 0);
    assert_eq!(session.last_sequence(), 0);
}

#[test]
fn test_write_of_512_bytes_is_accepted() {
    let session = open();
    let (request, mut handle) = Request::write(vec![7u8; 512]);
    session.submit(request);
    assert_eq!(handle.try_completion().unwrap().information, 512);
}

#[test]
fn test_slot_rearms_after_tick_and_after_cancel() {
    let session = open();
    let (write, _w) = Request::write(b"data".to_vec());
    session.submit(write);

    // Resolved by tick
    let (first, _h1) = Request::read(4);
    assert!(session.submit(first).is_pending());
    session.tick();

    // Resolved by cancel
    let (second, mut h2) = Request::read(4);
    assert!(session.submit(second).is_pending());
    assert!(h2.cancel());
    assert_eq!(h2.try_completion().unwrap().status, IoStatus::Cancelled);
    assert_eq!(session.tick(), TickOutcome::Idle);

    let (third, _h3) = Request::read(4);
    assert!(session.submit(third).is_pending());
}

#[test]
fn test_close_drains_registry_and_slot() {
    let session = open();
    let (write, _w) = Request::write(b"data".to_vec());
    session.submit(write);

    let mut w1 = waiter(&session, 8);
    let mut w2 = waiter(&session, 8);
    let (read, mut reader) = Request::read(4);
    session.submit(read);

    assert_eq!(session.close(), 3);
    for handle in [&mut w1, &mut w2, &mut reader] {
        assert_eq!(
            handle.try_completion().unwrap().status,
            IoStatus::ConnectionClosing
        );
    }
    assert!(!session.has_deferred_request());
    assert_eq!(session.pending_waiters(), 0);
}

#[tokio::test]
async fn test_cancel_from_another_task_while_waiting() {
    let session = open();
    let handle = waiter(&session, 8);
    let signal = handle.cancel_signal();

    let waiting = tokio::spawn(handle.wait());
    tokio::task::yield_now().await;
    assert!(signal.cancel());

    let completion = waiting.await.unwrap().unwrap();
    assert_eq!(completion.status, IoStatus::Cancelled);
    assert_eq!(session.pending_waiters(), 0);
}
