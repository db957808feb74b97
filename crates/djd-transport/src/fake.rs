//! In-process fake device for tests
//!
//! Serves the device protocol on `127.0.0.1:<ephemeral>` with canned replies
//! and records every action body it receives.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use djd_core::DeviceType;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// A canned HTTP reply
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: ReplyBody,
}

#[derive(Debug, Clone)]
enum ReplyBody {
    Json(Value),
    Raw(String),
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: ReplyBody::Json(body),
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: ReplyBody::Raw(body.to_string()),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.body {
            ReplyBody::Json(body) => (status, Json(body)).into_response(),
            ReplyBody::Raw(body) => (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response(),
        }
    }
}

struct FakeState {
    type_reply: Reply,
    relay_reply: Reply,
    status_reply: Reply,
    action_reply: Reply,
    actions: Mutex<Vec<Value>>,
}

/// Builder for a [`FakeDevice`]
pub struct FakeDeviceBuilder {
    command_path: String,
    type_reply: Reply,
    relay_reply: Reply,
    status_reply: Reply,
    action_reply: Reply,
}

impl FakeDeviceBuilder {
    /// Serve commands under a path other than the one implied by the type
    pub fn command_path(mut self, path: &str) -> Self {
        self.command_path = path.to_string();
        self
    }

    pub fn relays(mut self, count: u32) -> Self {
        self.relay_reply = Reply::json(200, json!({ "number": count }));
        self
    }

    pub fn type_reply(mut self, reply: Reply) -> Self {
        self.type_reply = reply;
        self
    }

    pub fn relay_reply(mut self, reply: Reply) -> Self {
        self.relay_reply = reply;
        self
    }

    pub fn status_reply(mut self, reply: Reply) -> Self {
        self.status_reply = reply;
        self
    }

    pub fn action_reply(mut self, reply: Reply) -> Self {
        self.action_reply = reply;
        self
    }

    /// Bind an ephemeral port and start serving
    pub async fn spawn(self) -> std::io::Result<FakeDevice> {
        let state = Arc::new(FakeState {
            type_reply: self.type_reply,
            relay_reply: self.relay_reply,
            status_reply: self.status_reply,
            action_reply: self.action_reply,
            actions: Mutex::new(Vec::new()),
        });

        let path = self.command_path;
        let app = Router::new()
            .route("/get_type", get(get_type))
            .route(&format!("{}/get_relay_number", path), get(get_relay_number))
            .route(&format!("{}/status", path), get(get_status))
            .route(&path, axum::routing::post(post_action))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(FakeDevice {
            address: format!("http://{}", local),
            host: local.to_string(),
            state,
        })
    }
}

/// A running fake device
pub struct FakeDevice {
    /// Canonical base URL, e.g. `http://127.0.0.1:40123`
    pub address: String,
    /// `127.0.0.1:<port>`, the form a caller would type
    pub host: String,
    state: Arc<FakeState>,
}

impl FakeDevice {
    /// Start building a device that reports `device_type` from `/get_type`
    pub fn builder(device_type: &str) -> FakeDeviceBuilder {
        let command_path = device_type
            .parse::<DeviceType>()
            .map(|t| t.command_path().to_string())
            .unwrap_or_else(|_| "/unknown".to_string());

        FakeDeviceBuilder {
            command_path,
            type_reply: Reply::json(200, json!({ "type": device_type })),
            relay_reply: Reply::json(200, json!({ "number": 4 })),
            status_reply: Reply::json(200, json!({ "state": "idle" })),
            action_reply: Reply::json(200, json!({ "msg": "ok" })),
        }
    }

    /// Bodies of every action posted so far
    pub async fn received_actions(&self) -> Vec<Value> {
        self.state.actions.lock().await.clone()
    }
}

/// A base URL on which nothing is listening
pub async fn unreachable_address() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", local))
}

async fn get_type(State(state): State<Arc<FakeState>>) -> Reply {
    state.type_reply.clone()
}

async fn get_relay_number(State(state): State<Arc<FakeState>>) -> Reply {
    state.relay_reply.clone()
}

async fn get_status(State(state): State<Arc<FakeState>>) -> Reply {
    state.status_reply.clone()
}

async fn post_action(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Reply {
    state.actions.lock().await.push(body);
    state.action_reply.clone()
}
