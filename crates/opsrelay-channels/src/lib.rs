//! Notification channels for OpsRelay.

pub mod messenger;

pub use messenger::MessengerChannel;
