//! Table definitions and idempotent schema bootstrap

use sqlx::SqlitePool;
use tracing::debug;

/// A table the registry owns
pub trait Table {
    fn name(&self) -> &'static str;

    /// `CREATE TABLE IF NOT EXISTS` statement
    fn create(&self) -> &'static str;
}

pub struct DeviceTable;

impl Table for DeviceTable {
    fn name(&self) -> &'static str {
        "device"
    }

    fn create(&self) -> &'static str {
        r#"
        CREATE TABLE IF NOT EXISTS device (
            id CHAR(40) NOT NULL PRIMARY KEY,
            address VARCHAR(64) NOT NULL,
            type VARCHAR(255) NOT NULL,
            command_path VARCHAR(10) NOT NULL
        );
        "#
    }
}

/// Switch rows of power strips; references `device`
pub struct PowerStripTable;

impl Table for PowerStripTable {
    fn name(&self) -> &'static str {
        "power_strip"
    }

    fn create(&self) -> &'static str {
        r#"
        CREATE TABLE IF NOT EXISTS power_strip (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id CHAR(40) NOT NULL,
            profile_name VARCHAR(255) NOT NULL,
            switch_index INTEGER NOT NULL,
            switch_name VARCHAR(255) NOT NULL,
            UNIQUE (device_id, switch_index),
            FOREIGN KEY (device_id) REFERENCES device (id) ON DELETE CASCADE
        );
        "#
    }
}

/// 3D-printer hosts, keyed by the host's API key
pub struct PrinterHostTable;

impl Table for PrinterHostTable {
    fn name(&self) -> &'static str {
        "printer_host"
    }

    fn create(&self) -> &'static str {
        r#"
        CREATE TABLE IF NOT EXISTS printer_host (
            ip CHAR(22) NOT NULL UNIQUE,
            host VARCHAR(255) NOT NULL,
            api_key CHAR(32) NOT NULL PRIMARY KEY
        );
        "#
    }
}

/// Tables in creation order; a referenced table precedes its referrers
pub fn tables() -> Vec<Box<dyn Table + Send + Sync>> {
    vec![
        Box::new(DeviceTable),
        Box::new(PowerStripTable),
        Box::new(PrinterHostTable),
    ]
}

/// Create any missing table
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for table in tables() {
        debug!(table = table.name(), "Ensuring table");
        sqlx::query(table.create()).execute(pool).await?;
    }
    Ok(())
}
