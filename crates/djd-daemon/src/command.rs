//! Device actions as carried by `POST /device`
//!
//! A request names an `action` and carries an `info` object whose keys
//! depend on the action. Unknown actions and malformed `info` objects are
//! rejected before anything touches the store or the network.

use djd_core::{DeviceError, DeviceId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// A parsed, well-formed device action
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    Create {
        ip: String,
    },
    Delete {
        device_id: DeviceId,
    },
    RenameProfile {
        device_id: DeviceId,
        new_name: String,
    },
    RenameSwitch {
        device_id: DeviceId,
        /// 1-based, as shown to users
        switch_number: i64,
        new_name: String,
    },
    Send {
        id: DeviceId,
        params: Value,
    },
    Get {
        id: DeviceId,
    },
}

#[derive(Deserialize)]
struct CreateInfo {
    ip: String,
}

#[derive(Deserialize)]
struct DeleteInfo {
    device_id: String,
}

#[derive(Deserialize)]
struct RenameProfileInfo {
    device_id: String,
    new_name: String,
}

#[derive(Deserialize)]
struct RenameSwitchInfo {
    device_id: String,
    switch_number: i64,
    new_name: String,
}

#[derive(Deserialize)]
struct SendInfo {
    id: String,
    params: Value,
}

#[derive(Deserialize)]
struct GetInfo {
    id: String,
}

fn info_as<T: DeserializeOwned>(action: &str, info: Value) -> Result<T, DeviceError> {
    serde_json::from_value(info)
        .map_err(|e| DeviceError::InvalidInput(format!("{}: {}", action, e)))
}

impl DeviceCommand {
    /// Parse an action name and its `info` payload
    pub fn parse(action: &str, info: Value) -> Result<Self, DeviceError> {
        let command = match action {
            "create" => {
                let info: CreateInfo = info_as(action, info)?;
                DeviceCommand::Create { ip: info.ip }
            }
            "delete" => {
                let info: DeleteInfo = info_as(action, info)?;
                DeviceCommand::Delete {
                    device_id: DeviceId(info.device_id),
                }
            }
            "change_ps_name" => {
                let info: RenameProfileInfo = info_as(action, info)?;
                DeviceCommand::RenameProfile {
                    device_id: DeviceId(info.device_id),
                    new_name: info.new_name,
                }
            }
            "change_switch_name" => {
                let info: RenameSwitchInfo = info_as(action, info)?;
                DeviceCommand::RenameSwitch {
                    device_id: DeviceId(info.device_id),
                    switch_number: info.switch_number,
                    new_name: info.new_name,
                }
            }
            "send" => {
                let info: SendInfo = info_as(action, info)?;
                DeviceCommand::Send {
                    id: DeviceId(info.id),
                    params: info.params,
                }
            }
            "get" => {
                let info: GetInfo = info_as(action, info)?;
                DeviceCommand::Get {
                    id: DeviceId(info.id),
                }
            }
            other => return Err(DeviceError::InvalidAction(other.to_string())),
        };
        Ok(command)
    }

    /// Wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            DeviceCommand::Create { .. } => "create",
            DeviceCommand::Delete { .. } => "delete",
            DeviceCommand::RenameProfile { .. } => "change_ps_name",
            DeviceCommand::RenameSwitch { .. } => "change_switch_name",
            DeviceCommand::Send { .. } => "send",
            DeviceCommand::Get { .. } => "get",
        }
    }
}
