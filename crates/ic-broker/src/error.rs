//! Error types for the broker

use thiserror::Error;

use crate::domain::IoStatus;

/// Errors surfaced to callers of the broker.
///
/// Every variant except `RequestAbandoned` corresponds to a terminal
/// [`IoStatus`] that a request can be completed with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Write length {length} exceeds buffer capacity {capacity}")]
    BufferOverflow { length: usize, capacity: usize },

    #[error("Output buffer could not be obtained at completion time")]
    TransferFailed,

    #[error("Request was cancelled")]
    Cancelled,

    #[error("A deferred request is already outstanding")]
    Busy,

    #[error("Connection is closing")]
    ConnectionClosing,

    #[error("Request failed")]
    Unsuccessful,

    #[error("Request was dropped without being completed")]
    RequestAbandoned,
}

impl BrokerError {
    /// Status a request is completed with when it fails with this error.
    pub fn status(&self) -> IoStatus {
        match self {
            BrokerError::InvalidArgument(_) => IoStatus::InvalidArgument,
            BrokerError::BufferOverflow { .. } => IoStatus::BufferOverflow,
            BrokerError::TransferFailed => IoStatus::TransferFailed,
            BrokerError::Cancelled => IoStatus::Cancelled,
            BrokerError::Busy => IoStatus::Busy,
            BrokerError::ConnectionClosing => IoStatus::ConnectionClosing,
            BrokerError::Unsuccessful | BrokerError::RequestAbandoned => IoStatus::Unsuccessful,
        }
    }

    /// Map a failed completion status back to an error.
    ///
    /// Returns `None` for [`IoStatus::Success`]. A status carries no sizes,
    /// so `BufferOverflow` comes back with zero length and capacity; callers
    /// that know the sizes fill them in.
    pub fn from_status(status: IoStatus) -> Option<Self> {
        match status {
            IoStatus::Success => None,
            IoStatus::InvalidArgument => {
                Some(BrokerError::InvalidArgument("rejected by broker".to_string()))
            }
            IoStatus::BufferOverflow => Some(BrokerError::BufferOverflow {
                length: 0,
                capacity: 0,
            }),
            IoStatus::TransferFailed => Some(BrokerError::TransferFailed),
            IoStatus::Cancelled => Some(BrokerError::Cancelled),
            IoStatus::Busy => Some(BrokerError::Busy),
            IoStatus::ConnectionClosing => Some(BrokerError::ConnectionClosing),
            IoStatus::Unsuccessful => Some(BrokerError::Unsuccessful),
        }
    }
}

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Tick interval must be greater than zero")]
    ZeroTickInterval,

    #[error("{field} must be greater than zero")]
    ZeroCapacity { field: &'static str },

    #[error("max_write_length {max_write_length} exceeds message_size {message_size}")]
    WriteLengthExceedsMessageSize {
        max_write_length: usize,
        message_size: usize,
    },
}
