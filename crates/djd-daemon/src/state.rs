//! Application state management

use anyhow::{Context, Result};
use djd_registry::Registry;
use djd_transport::DeviceClient;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::service::DeviceService;

/// Shared application state
pub struct AppState {
    /// Device orchestration service
    pub service: DeviceService,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Connect the store, build the device client and wire up the service
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let registry = Registry::connect(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to open device store")?;

        let transport = DeviceClient::new(config.transport.timeout())
            .context("Failed to create device HTTP client")?;

        info!(
            timeout_secs = config.transport.timeout_secs,
            api_keys = config.auth.api_keys.len(),
            "Device service ready"
        );

        Ok(Self::with_service(DeviceService::new(registry, transport), config))
    }

    pub fn with_service(service: DeviceService, config: Config) -> Arc<Self> {
        Arc::new(Self { service, config })
    }
}
