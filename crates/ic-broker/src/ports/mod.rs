//! Ports Layer
//!
//! - Driving Ports (inbound): what transports and triggers call
//! - Driven Ports (outbound): what the broker needs from outside

pub mod inbound;
pub mod outbound;

pub use inbound::{Dispatch, NotificationBrokerApi};
pub use outbound::TickSource;
