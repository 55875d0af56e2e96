//! Handler Layer
//!
//! Decodes control-code tagged calls and validates their buffers before the
//! session touches any shared state.

pub mod control;

pub use control::{
    ctl_code, validate_add_reader, validate_await_notification, ControlCode, ReaderRegistration,
    IOCTL_ADD_READER, IOCTL_AWAIT_NOTIFICATION,
};
