//! In-process client.
//!
//! Issues requests against a [`BrokerSession`] the way an application would
//! through a device handle: build a request, submit it, keep the handle and
//! wait on it.

use tracing::debug;

use crate::domain::{IoHandle, Request};
use crate::error::BrokerError;
use crate::handler::{ReaderRegistration, IOCTL_ADD_READER, IOCTL_AWAIT_NOTIFICATION};
use crate::service::BrokerSession;

/// Output buffer size used for notification waits.
pub const NOTIFICATION_BUFFER_SIZE: usize = 512;

#[derive(Debug, Clone)]
pub struct BrokerClient {
    session: BrokerSession,
}

impl BrokerClient {
    pub fn new(session: BrokerSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BrokerSession {
        &self.session
    }

    /// `AddReader` round trip.
    pub async fn register_reader(&self) -> Result<ReaderRegistration, BrokerError> {
        let (request, handle) = Request::device_control(
            IOCTL_ADD_READER,
            Vec::new(),
            crate::handler::control::REGISTRATION_SIZE,
        );
        self.session.submit(request);
        let bytes = handle.wait().await?.into_result()?;
        ReaderRegistration::decode(&bytes)
    }

    /// Queue a notification wait. The returned handle completes on the next
    /// write, on cancel or on close.
    pub fn await_notification(&self, registration: ReaderRegistration) -> IoHandle {
        self.await_notification_with_capacity(registration, NOTIFICATION_BUFFER_SIZE)
    }

    pub fn await_notification_with_capacity(
        &self,
        registration: ReaderRegistration,
        capacity: usize,
    ) -> IoHandle {
        let (request, handle) = Request::device_control(
            IOCTL_AWAIT_NOTIFICATION,
            registration.encode().to_vec(),
            capacity,
        );
        let dispatch = self.session.submit(request);
        debug!(request_id = %dispatch.request_id(), pending = dispatch.is_pending(), "Notification wait issued");
        handle
    }

    /// Write `payload` and wait for the write to complete.
    ///
    /// Returns the number of bytes accepted. An overflow reports the
    /// payload length against the session's write cap.
    pub async fn write(&self, payload: impl Into<Vec<u8>>) -> Result<usize, BrokerError> {
        let (request, handle) = Request::write(payload);
        let length = request.input().len();
        self.session.submit(request);
        handle
            .wait()
            .await?
            .transferred()
            .map_err(|err| match err {
                BrokerError::BufferOverflow { .. } => BrokerError::BufferOverflow {
                    length,
                    capacity: self.session.config().max_write_length,
                },
                other => other,
            })
    }

    /// Issue a read. It completes on the next tick when data has been written.
    pub fn read(&self, length: usize) -> IoHandle {
        let (request, handle) = Request::read(length);
        self.session.submit(request);
        handle
    }
}
