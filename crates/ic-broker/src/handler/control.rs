//! Control codes and buffer validation for device-control requests.
//!
//! Codes follow the `CTL_CODE` layout:
//! `(device << 16) | (access << 14) | (function << 2) | method`.
//! Buffers carry little-endian 32-bit fields.

use crate::error::BrokerError;

pub const FILE_DEVICE_INVERTED: u32 = 0xCF54;
pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_ANY_ACCESS: u32 = 0;

pub const fn ctl_code(device: u32, function: u32, method: u32, access: u32) -> u32 {
    (device << 16) | (access << 14) | (function << 2) | method
}

pub const IOCTL_AWAIT_NOTIFICATION: u32 =
    ctl_code(FILE_DEVICE_INVERTED, 2049, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_ADD_READER: u32 =
    ctl_code(FILE_DEVICE_INVERTED, 2050, METHOD_BUFFERED, FILE_ANY_ACCESS);

/// Size of one encoded field.
pub const FIELD_SIZE: usize = 4;
/// Size of an encoded `(reader_id, message_id)` pair.
pub const REGISTRATION_SIZE: usize = 2 * FIELD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    AwaitNotification,
    AddReader,
}

impl TryFrom<u32> for ControlCode {
    type Error = BrokerError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            IOCTL_AWAIT_NOTIFICATION => Ok(ControlCode::AwaitNotification),
            IOCTL_ADD_READER => Ok(ControlCode::AddReader),
            other => Err(BrokerError::InvalidArgument(format!(
                "unknown control code {other:#010x}"
            ))),
        }
    }
}

impl From<ControlCode> for u32 {
    fn from(code: ControlCode) -> Self {
        match code {
            ControlCode::AwaitNotification => IOCTL_AWAIT_NOTIFICATION,
            ControlCode::AddReader => IOCTL_ADD_READER,
        }
    }
}

/// `(reader_id, message_id)` pair exchanged by both control calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderRegistration {
    pub reader_id: u32,
    pub message_id: u32,
}

impl ReaderRegistration {
    /// Placeholder pair handed out by `AddReader`.
    pub const PLACEHOLDER: Self = Self {
        reader_id: 0,
        message_id: 0,
    };

    pub fn encode(&self) -> [u8; REGISTRATION_SIZE] {
        let mut out = [0u8; REGISTRATION_SIZE];
        out[..FIELD_SIZE].copy_from_slice(&self.reader_id.to_le_bytes());
        out[FIELD_SIZE..].copy_from_slice(&self.message_id.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BrokerError> {
        if bytes.len() < REGISTRATION_SIZE {
            return Err(BrokerError::InvalidArgument(format!(
                "registration needs {REGISTRATION_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut reader = [0u8; FIELD_SIZE];
        let mut message = [0u8; FIELD_SIZE];
        reader.copy_from_slice(&bytes[..FIELD_SIZE]);
        message.copy_from_slice(&bytes[FIELD_SIZE..REGISTRATION_SIZE]);
        Ok(Self {
            reader_id: u32::from_le_bytes(reader),
            message_id: u32::from_le_bytes(message),
        })
    }
}

/// Check the buffers of an `AddReader` call.
pub fn validate_add_reader(output_capacity: usize) -> Result<(), BrokerError> {
    if output_capacity < REGISTRATION_SIZE {
        return Err(BrokerError::InvalidArgument(format!(
            "AddReader output buffer {output_capacity} < {REGISTRATION_SIZE}"
        )));
    }
    Ok(())
}

/// Check the buffers of an `AwaitNotification` call.
pub fn validate_await_notification(
    input: &[u8],
    output_capacity: usize,
) -> Result<ReaderRegistration, BrokerError> {
    if output_capacity < FIELD_SIZE {
        return Err(BrokerError::InvalidArgument(format!(
            "AwaitNotification output buffer {output_capacity} < {FIELD_SIZE}"
        )));
    }
    ReaderRegistration::decode(input)
}
