//! Device and power strip profile persistence

use djd_core::{Device, DeviceError, DeviceId, SwitchProfile};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::schema;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Store error during {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Corrupt row during {op}: {detail}")]
    Corrupt { op: &'static str, detail: String },
}

impl From<RegistryError> for DeviceError {
    fn from(err: RegistryError) -> Self {
        DeviceError::PersistenceFailure(err.to_string())
    }
}

/// Log a store error with the failing operation and wrap it
fn store_error(op: &'static str) -> impl FnOnce(sqlx::Error) -> RegistryError {
    move |source| {
        error!(op, error = %source, "Registry operation failed");
        RegistryError::Store { op, source }
    }
}

/// Pool-backed access to the `device` and `power_strip` tables
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    /// Open (creating if missing) the database at `url` and bootstrap the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RegistryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(store_error("connect"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(store_error("connect"))?;

        info!(url = %url, max_connections, "Connected to device store");
        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests
    ///
    /// A single pooled connection keeps the database alive for the life of
    /// the registry.
    pub async fn in_memory() -> Result<Self, RegistryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(store_error("connect"))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(store_error("connect"))?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating any missing table
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, RegistryError> {
        schema::init_schema(&pool)
            .await
            .map_err(store_error("init_schema"))?;
        Ok(Self { pool })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // --- device table ---

    pub async fn insert_device(&self, device: &Device) -> Result<(), RegistryError> {
        sqlx::query("INSERT INTO device (id, address, type, command_path) VALUES (?, ?, ?, ?)")
            .bind(device.id.as_str())
            .bind(&device.address)
            .bind(device.device_type.as_str())
            .bind(&device.command_path)
            .execute(&self.pool)
            .await
            .map_err(store_error("insert_device"))?;

        debug!(device = %device.id, "Inserted device row");
        Ok(())
    }

    /// Delete a device; its switch rows go with it. Returns whether a row existed.
    pub async fn delete_device(&self, id: &DeviceId) -> Result<bool, RegistryError> {
        let result = sqlx::query("DELETE FROM device WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error("delete_device"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn device_exists(&self, id: &DeviceId) -> Result<bool, RegistryError> {
        let found: i64 = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM device WHERE id = ?)")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("device_exists"))?;
        Ok(found != 0)
    }

    pub async fn get_address(&self, id: &DeviceId) -> Result<Option<String>, RegistryError> {
        sqlx::query_scalar::<_, String>("SELECT address FROM device WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("get_address"))
    }

    pub async fn get_command_path(&self, id: &DeviceId) -> Result<Option<String>, RegistryError> {
        sqlx::query_scalar::<_, String>("SELECT command_path FROM device WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("get_command_path"))
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, RegistryError> {
        let row: Option<(String, String, String, String)> =
            sqlx::query_as("SELECT id, address, type, command_path FROM device WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error("get_device"))?;

        row.map(|(id, address, kind, command_path)| {
            let device_type = djd_core::DeviceType::from_str(&kind).map_err(|_| {
                error!(device = %id, kind = %kind, "Stored device has unknown type");
                RegistryError::Corrupt {
                    op: "get_device",
                    detail: format!("unknown type {:?} for {}", kind, id),
                }
            })?;
            Ok(Device {
                id: DeviceId(id),
                address,
                device_type,
                command_path,
            })
        })
        .transpose()
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn count_devices(&self) -> Result<i64, RegistryError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM device")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("count_devices"))
    }

    // --- power_strip table ---

    /// Insert `switch_count` default-named switch rows at indices `0..switch_count`
    ///
    /// Rows are committed one at a time; the first failure stops the loop and
    /// rows already written stay. Returns how many rows were inserted.
    pub async fn insert_switch_rows(
        &self,
        device_id: &DeviceId,
        profile_name: &str,
        switch_count: u32,
    ) -> Result<usize, RegistryError> {
        for index in 0..switch_count {
            sqlx::query(
                "INSERT INTO power_strip (device_id, profile_name, switch_index, switch_name) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(device_id.as_str())
            .bind(profile_name)
            .bind(i64::from(index))
            .bind(SwitchProfile::default_switch_name(index))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                debug!(device = %device_id, written = index, "Switch row insert stopped");
                store_error("insert_switch_rows")(e)
            })?;
        }

        debug!(device = %device_id, profile = %profile_name, count = switch_count, "Inserted switch rows");
        Ok(switch_count as usize)
    }

    /// Delete every switch row of a device. Returns the number removed.
    pub async fn delete_profile(&self, device_id: &DeviceId) -> Result<u64, RegistryError> {
        let result = sqlx::query("DELETE FROM power_strip WHERE device_id = ?")
            .bind(device_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error("delete_profile"))?;
        Ok(result.rows_affected())
    }

    /// Relabel every switch row of a device. Returns the number updated.
    pub async fn rename_profile(
        &self,
        device_id: &DeviceId,
        new_name: &str,
    ) -> Result<u64, RegistryError> {
        let result = sqlx::query("UPDATE power_strip SET profile_name = ? WHERE device_id = ?")
            .bind(new_name)
            .bind(device_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error("rename_profile"))?;
        Ok(result.rows_affected())
    }

    /// Rename the switch stored at 0-based `switch_index`. Returns the number updated.
    pub async fn rename_switch(
        &self,
        device_id: &DeviceId,
        switch_index: i64,
        new_name: &str,
    ) -> Result<u64, RegistryError> {
        let result = sqlx::query(
            "UPDATE power_strip SET switch_name = ? WHERE device_id = ? AND switch_index = ?",
        )
        .bind(new_name)
        .bind(device_id.as_str())
        .bind(switch_index)
        .execute(&self.pool)
        .await
        .map_err(store_error("rename_switch"))?;
        Ok(result.rows_affected())
    }

    pub async fn count_switches(&self, device_id: &DeviceId) -> Result<i64, RegistryError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM power_strip WHERE device_id = ?")
            .bind(device_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("count_switches"))
    }

    pub async fn profile_name_taken(&self, name: &str) -> Result<bool, RegistryError> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM power_strip WHERE profile_name = ?)")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(store_error("profile_name_taken"))?;
        Ok(found != 0)
    }

    /// Switch rows of a device ordered by index
    #[cfg(any(test, feature = "test-support"))]
    pub async fn list_switches(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<SwitchProfile>, RegistryError> {
        let rows: Vec<(String, i64, String)> = sqlx::query_as(
            "SELECT profile_name, switch_index, switch_name FROM power_strip \
             WHERE device_id = ? ORDER BY switch_index",
        )
        .bind(device_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("list_switches"))?;

        Ok(rows
            .into_iter()
            .map(|(profile_name, switch_index, switch_name)| SwitchProfile {
                device_id: device_id.clone(),
                profile_name,
                switch_index,
                switch_name,
            })
            .collect())
    }

    // --- printer_host table ---

    /// Record a 3D-printer host reachable at `ip`, authorized by `api_key`
    pub async fn insert_printer_host(
        &self,
        ip: &str,
        host: &str,
        api_key: &str,
    ) -> Result<(), RegistryError> {
        sqlx::query("INSERT INTO printer_host (ip, host, api_key) VALUES (?, ?, ?)")
            .bind(ip)
            .bind(host)
            .bind(api_key)
            .execute(&self.pool)
            .await
            .map_err(store_error("insert_printer_host"))?;

        debug!(ip = %ip, host = %host, "Inserted printer host");
        Ok(())
    }

    /// Forget the printer host owning `api_key`. Returns whether a row existed.
    pub async fn delete_printer_host(&self, api_key: &str) -> Result<bool, RegistryError> {
        let result = sqlx::query("DELETE FROM printer_host WHERE api_key = ?")
            .bind(api_key)
            .execute(&self.pool)
            .await
            .map_err(store_error("delete_printer_host"))?;
        Ok(result.rows_affected() > 0)
    }
}
