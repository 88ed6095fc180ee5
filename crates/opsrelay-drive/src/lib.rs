//! Google Drive file source for OpsRelay.

pub mod client;

pub use client::DriveClient;
