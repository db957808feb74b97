//! DJD Transport - HTTP exchanges with individual devices
//!
//! Each call performs exactly one request against one device and reduces
//! the outcome to either the device's `(status, body)` reply or one of two
//! transport failure classes.

pub mod client;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use client::{DeviceClient, DeviceReply, TransportError, DEFAULT_TIMEOUT_SECS, MAX_RELAYS};
