//! The uniform (valid, info, code) response triple

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeviceError;

/// Result of one dispatched action, as handed back to the HTTP boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub valid: bool,
    pub info: Value,
    pub code: u16,
}

impl Outcome {
    pub fn success(info: impl Into<Value>, code: u16) -> Self {
        Self {
            valid: true,
            info: info.into(),
            code,
        }
    }

    pub fn failure(info: impl Into<Value>, code: u16) -> Self {
        Self {
            valid: false,
            info: info.into(),
            code,
        }
    }

    /// `200 "Ok"`, the reply of every plain mutation
    pub fn ok() -> Self {
        Self::success("Ok", 200)
    }
}

impl From<DeviceError> for Outcome {
    fn from(err: DeviceError) -> Self {
        Self::failure(err.info(), err.status_code())
    }
}
