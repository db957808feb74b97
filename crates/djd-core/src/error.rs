//! Caller-facing error taxonomy
//!
//! Every failure the daemon can report maps onto one of these variants, each
//! with a fixed HTTP status and the short message sent back to the caller.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Unknown action: {0}")]
    InvalidAction(String),
    #[error("Malformed request: {0}")]
    InvalidInput(String),
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
    #[error("Unsupported device type: {0}")]
    UnsupportedDevice(String),
    #[error("Device already registered: {0}")]
    Duplicate(String),
    #[error("Device not found: {0}")]
    NotFound(String),
    #[error("Switch number {number} out of range, device has {count} switches")]
    InvalidSwitchIndex { number: i64, count: i64 },
    #[error("Device unreachable: {0}")]
    ConnectionFailure(String),
    #[error("Bad device response: {0}")]
    ProtocolFailure(String),
    /// The device answered 400 or 500 with its own message
    #[error("Device reported failure ({status}): {info}")]
    DeviceRejected { status: u16, info: Value },
    /// The device answered with a status outside 200/400/500
    #[error("Unexpected device status: {0}")]
    UnexpectedStatus(u16),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl DeviceError {
    /// HTTP status reported to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            DeviceError::InvalidAction(_) => 400,
            DeviceError::InvalidInput(_) => 400,
            DeviceError::InvalidAddress(_) => 400,
            DeviceError::UnsupportedDevice(_) => 400,
            DeviceError::Duplicate(_) => 400,
            DeviceError::NotFound(_) => 400,
            DeviceError::InvalidSwitchIndex { .. } => 400,
            DeviceError::ConnectionFailure(_) => 500,
            DeviceError::ProtocolFailure(_) => 400,
            DeviceError::DeviceRejected { status, .. } => *status,
            DeviceError::UnexpectedStatus(status) => *status,
            DeviceError::PersistenceFailure(_) => 500,
        }
    }

    /// Payload of the `info` field reported to the caller
    pub fn info(&self) -> Value {
        let msg = match self {
            DeviceError::InvalidAction(_) => "Not valid action",
            DeviceError::InvalidInput(_)
            | DeviceError::InvalidAddress(_)
            | DeviceError::UnsupportedDevice(_)
            | DeviceError::Duplicate(_) => "Not valid input",
            DeviceError::NotFound(_) => "Not valid id",
            DeviceError::InvalidSwitchIndex { .. } => "Not valid switch number",
            DeviceError::ConnectionFailure(_) => "Server error",
            DeviceError::ProtocolFailure(_) | DeviceError::UnexpectedStatus(_) => "Request error",
            DeviceError::DeviceRejected { info, .. } => return info.clone(),
            DeviceError::PersistenceFailure(_) => "Error",
        };
        Value::String(msg.to_string())
    }
}
