//! Device HTTP client
//!
//! Devices speak a small JSON protocol:
//! - `GET  /get_type`                      -> `{"type": "..."}`
//! - `GET  <command_path>/get_relay_number` -> `{"number": n}`
//! - `GET  <command_path>/status`           -> arbitrary JSON
//! - `POST <command_path>`                  -> `{"msg": "...", ...}`

use djd_core::DeviceError;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default bound on every device exchange
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Largest relay count a power strip may report
pub const MAX_RELAYS: u32 = 64;

/// Why an exchange with a device failed before a usable reply came back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, unreachable host or timeout
    #[error("Device not reachable: {0}")]
    Connection(String),
    /// Anything else: malformed body, missing field, broken response
    #[error("Request failed: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Fixed code standing in for the missing device status
    pub fn sentinel_code(&self) -> u16 {
        match self {
            TransportError::Connection(_) => 500,
            TransportError::Protocol(_) => 400,
        }
    }
}

impl From<TransportError> for DeviceError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connection(msg) => DeviceError::ConnectionFailure(msg),
            TransportError::Protocol(msg) => DeviceError::ProtocolFailure(msg),
        }
    }
}

/// A reply received from a device, whatever its status
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReply {
    pub status: u16,
    pub body: Value,
}

impl DeviceReply {
    /// The device's `msg` field, or the whole body when it has none
    pub fn message(&self) -> Value {
        self.body
            .get("msg")
            .cloned()
            .unwrap_or_else(|| self.body.clone())
    }
}

/// Client for device exchanges
///
/// Holds no per-device state; every method names the device it talks to.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
}

impl DeviceClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Ask a device what kind of device it is
    pub async fn probe_type(&self, address: &str) -> Result<String, TransportError> {
        let url = format!("{}/get_type", address);
        let reply = self.exchange("probe_type", self.http.get(&url), &url).await?;

        reply
            .body
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                warn!(url = %url, body = %reply.body, "Type probe reply has no type field");
                TransportError::Protocol(format!("no type in reply from {}", url))
            })
    }

    /// Ask a power strip how many relays it drives
    pub async fn probe_relay_count(
        &self,
        address: &str,
        command_path: &str,
    ) -> Result<u32, TransportError> {
        let url = format!("{}{}/get_relay_number", address, command_path);
        let reply = self
            .exchange("probe_relay_count", self.http.get(&url), &url)
            .await?;

        let number = reply.body.get("number").and_then(Value::as_u64).ok_or_else(|| {
            warn!(url = %url, body = %reply.body, "Relay probe reply has no usable number");
            TransportError::Protocol(format!("no relay number in reply from {}", url))
        })?;

        match u32::try_from(number) {
            Ok(count) if count <= MAX_RELAYS => Ok(count),
            _ => {
                warn!(url = %url, number, max = MAX_RELAYS, "Relay count out of range");
                Err(TransportError::Protocol(format!(
                    "relay count {} from {} exceeds {}",
                    number, url, MAX_RELAYS
                )))
            }
        }
    }

    /// Post an action for the device to carry out
    pub async fn send_action(
        &self,
        address: &str,
        command_path: &str,
        params: &Value,
    ) -> Result<DeviceReply, TransportError> {
        let url = format!("{}{}", address, command_path);
        self.exchange("send_action", self.http.post(&url).json(params), &url)
            .await
    }

    /// Read the device's current status
    pub async fn get_status(
        &self,
        address: &str,
        command_path: &str,
    ) -> Result<DeviceReply, TransportError> {
        let url = format!("{}{}/status", address, command_path);
        self.exchange("get_status", self.http.get(&url), &url).await
    }

    async fn exchange(
        &self,
        op: &'static str,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<DeviceReply, TransportError> {
        let response = request.send().await.map_err(|e| classify(op, url, e))?;
        let status = response.status().as_u16();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| classify(op, url, e))?;

        debug!(op, url = %url, status, "Device replied");
        Ok(DeviceReply { status, body })
    }
}

fn classify(op: &'static str, url: &str, err: reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() {
        warn!(op, url = %url, error = %err, "Device unreachable");
        TransportError::Connection(err.to_string())
    } else {
        warn!(op, url = %url, error = %err, "Device exchange failed");
        TransportError::Protocol(err.to_string())
    }
}
