//! DJD Core - Domain types shared by the device registration daemon
//!
//! This crate provides the foundational types for the DJD system:
//! - Device identity derived from a normalized address and device type
//! - The closed set of supported device types and their command paths
//! - Address validation and canonicalization
//! - The caller-facing error taxonomy and the uniform response triple

pub mod address;
pub mod device;
pub mod error;
pub mod outcome;

pub use address::DeviceAddress;
pub use device::{Device, DeviceId, DeviceType, SwitchProfile};
pub use error::DeviceError;
pub use outcome::Outcome;
