//! Device orchestration: registration, profile bookkeeping and command routing
//!
//! Nothing is cached here. Every call reads the registry afresh, so the
//! store stays the single source of truth for device state.

use djd_core::{Device, DeviceAddress, DeviceError, DeviceId, DeviceType, Outcome, SwitchProfile};
use djd_registry::{Registry, RegistryError};
use djd_transport::{DeviceClient, DeviceReply};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::command::DeviceCommand;

/// Registers devices and routes commands to them
#[derive(Debug, Clone)]
pub struct DeviceService {
    registry: Registry,
    transport: DeviceClient,
}

impl DeviceService {
    pub fn new(registry: Registry, transport: DeviceClient) -> Self {
        Self { registry, transport }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one action and fold the result into the response triple
    pub async fn dispatch(&self, action: &str, info: Value) -> Outcome {
        let result = match DeviceCommand::parse(action, info) {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(action = %action, error = %e, "Action failed");
                e.into()
            }
        }
    }

    async fn execute(&self, command: DeviceCommand) -> Result<Outcome, DeviceError> {
        debug!(action = command.action(), "Executing device action");
        match command {
            DeviceCommand::Create { ip } => {
                let id = self.create(&ip).await?;
                Ok(Outcome::success(id.0, 201))
            }
            DeviceCommand::Delete { device_id } => {
                self.delete(&device_id).await?;
                Ok(Outcome::ok())
            }
            DeviceCommand::RenameProfile { device_id, new_name } => {
                self.rename_profile(&device_id, &new_name).await?;
                Ok(Outcome::ok())
            }
            DeviceCommand::RenameSwitch {
                device_id,
                switch_number,
                new_name,
            } => {
                self.rename_switch(&device_id, switch_number, &new_name)
                    .await?;
                Ok(Outcome::ok())
            }
            DeviceCommand::Send { id, params } => {
                let msg = self.send_action(&id, &params).await?;
                Ok(Outcome::success(msg, 200))
            }
            DeviceCommand::Get { id } => {
                let status = self.get_status(&id).await?;
                Ok(Outcome::success(status, 200))
            }
        }
    }

    /// Register the device answering at `raw_address`
    ///
    /// 1. Normalize and validate the address
    /// 2. Probe the device for its type
    /// 3. Derive the identifier and reject duplicates
    /// 4. Persist the device row
    /// 5. For power strips, bootstrap the switch profile (best effort)
    pub async fn create(&self, raw_address: &str) -> Result<DeviceId, DeviceError> {
        let address = DeviceAddress::normalize(raw_address)?;

        let reported = self.transport.probe_type(address.as_str()).await?;
        let device_type: DeviceType = reported.parse()?;

        let device = Device::new(&address, device_type);

        if self.registry.device_exists(&device.id).await? {
            debug!(device = %device.id, address = %address, "Device already registered");
            return Err(DeviceError::Duplicate(device.id.0));
        }

        // A concurrent create of the same device can pass the check above;
        // the primary key rejects the second insert.
        self.registry.insert_device(&device).await?;
        info!(
            device = %device.id,
            address = %address,
            kind = %device_type,
            "Registered device"
        );

        if device_type == DeviceType::PowerStrip {
            // The device row is authoritative; a missing profile is not reported to the caller
            if let Err(e) = self.bootstrap_profile(&device).await {
                warn!(
                    event = "profile_bootstrap_failed",
                    device = %device.id,
                    error = %e,
                    "Power strip profile not created"
                );
            }
        }

        Ok(device.id)
    }

    async fn bootstrap_profile(&self, device: &Device) -> Result<usize, DeviceError> {
        let relay_count = self
            .transport
            .probe_relay_count(&device.address, &device.command_path)
            .await?;
        self.ps_create(&device.id, relay_count).await
    }

    /// Create the switch rows of a power strip under a fresh `PS_<n>` name
    ///
    /// Rows are written one by one; a failure part way leaves the rows
    /// already written in place.
    pub async fn ps_create(&self, id: &DeviceId, relay_count: u32) -> Result<usize, DeviceError> {
        let profile_name = self.next_profile_name().await?;
        let inserted = self
            .registry
            .insert_switch_rows(id, &profile_name, relay_count)
            .await?;

        info!(device = %id, profile = %profile_name, switches = inserted, "Created power strip profile");
        Ok(inserted)
    }

    /// First of `PS_1`, `PS_2`, ... not used by any profile
    async fn next_profile_name(&self) -> Result<String, RegistryError> {
        let mut n = 1;
        loop {
            let candidate = SwitchProfile::profile_name_candidate(n);
            if !self.registry.profile_name_taken(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Remove a device and its profile
    ///
    /// The two deletes are independent; if the second fails the first is not
    /// rolled back.
    pub async fn delete(&self, id: &DeviceId) -> Result<(), DeviceError> {
        self.require_device(id).await?;

        let removed = self.registry.delete_profile(id).await.map_err(|e| {
            error!(device = %id, "Profile delete failed, device kept");
            DeviceError::from(e)
        })?;
        self.registry.delete_device(id).await.map_err(|e| {
            error!(device = %id, switches = removed, "Device delete failed after its profile was removed");
            DeviceError::from(e)
        })?;

        info!(device = %id, switches = removed, "Deleted device");
        Ok(())
    }

    /// Relabel every switch of a power strip
    pub async fn rename_profile(&self, id: &DeviceId, new_name: &str) -> Result<(), DeviceError> {
        self.require_device(id).await?;
        let updated = self.registry.rename_profile(id, new_name).await?;
        debug!(device = %id, name = %new_name, rows = updated, "Renamed profile");
        Ok(())
    }

    /// Rename one switch, addressed 1-based as users count them
    ///
    /// Switch `k` is stored at index `k - 1`; valid numbers are `1..=count`.
    pub async fn rename_switch(
        &self,
        id: &DeviceId,
        switch_number: i64,
        new_name: &str,
    ) -> Result<(), DeviceError> {
        self.require_device(id).await?;

        let count = self.registry.count_switches(id).await?;
        let index = switch_index(switch_number, count).ok_or(DeviceError::InvalidSwitchIndex {
            number: switch_number,
            count,
        })?;

        self.registry.rename_switch(id, index, new_name).await?;
        debug!(device = %id, index, name = %new_name, "Renamed switch");
        Ok(())
    }

    /// Forward an action to the device; returns the device's message
    pub async fn send_action(&self, id: &DeviceId, params: &Value) -> Result<Value, DeviceError> {
        let (address, command_path) = self.resolve(id).await?;
        let reply = self
            .transport
            .send_action(&address, &command_path, params)
            .await?;
        interpret(reply, |r| r.message())
    }

    /// Read the device's status; returns the device's whole reply body
    pub async fn get_status(&self, id: &DeviceId) -> Result<Value, DeviceError> {
        let (address, command_path) = self.resolve(id).await?;
        let reply = self.transport.get_status(&address, &command_path).await?;
        interpret(reply, |r| r.body)
    }

    async fn require_device(&self, id: &DeviceId) -> Result<(), DeviceError> {
        if self.registry.device_exists(id).await? {
            Ok(())
        } else {
            debug!(device = %id, "Unknown device id");
            Err(DeviceError::NotFound(id.0.clone()))
        }
    }

    /// Stored address and command path of a registered device
    async fn resolve(&self, id: &DeviceId) -> Result<(String, String), DeviceError> {
        self.require_device(id).await?;

        let address = self.registry.get_address(id).await?;
        let command_path = self.registry.get_command_path(id).await?;
        match (address, command_path) {
            (Some(address), Some(command_path)) => Ok((address, command_path)),
            // Deleted between the existence check and the reads
            _ => Err(DeviceError::NotFound(id.0.clone())),
        }
    }
}

/// Stored index for a 1-based switch number, if in range
fn switch_index(switch_number: i64, count: i64) -> Option<i64> {
    let index = switch_number.checked_sub(1)?;
    (0..count).contains(&index).then_some(index)
}

/// Map a device reply onto success or the device-reported failure
fn interpret(
    reply: DeviceReply,
    on_success: impl FnOnce(DeviceReply) -> Value,
) -> Result<Value, DeviceError> {
    match reply.status {
        200 => Ok(on_success(reply)),
        400 | 500 => Err(DeviceError::DeviceRejected {
            status: reply.status,
            info: reply.message(),
        }),
        other => Err(DeviceError::UnexpectedStatus(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use djd_transport::fake::{unreachable_address, FakeDevice, Reply};
    use serde_json::json;
    use std::time::Duration;
    use tracing_test::traced_test;

    async fn service() -> DeviceService {
        let registry = Registry::in_memory().await.unwrap();
        let transport = DeviceClient::new(Duration::from_secs(2)).unwrap();
        DeviceService::new(registry, transport)
    }

    async fn power_strip(relays: u32) -> FakeDevice {
        FakeDevice::builder("power_strip")
            .relays(relays)
            .spawn()
            .await
            .unwrap()
    }

    #[test]
    fn test_switch_numbers_are_one_based() {
        assert_eq!(switch_index(1, 4), Some(0));
        assert_eq!(switch_index(4, 4), Some(3));
        assert_eq!(switch_index(0, 4), None);
        assert_eq!(switch_index(5, 4), None);
        assert_eq!(switch_index(-3, 4), None);
        assert_eq!(switch_index(1, 0), None);
        assert_eq!(switch_index(i64::MIN, 4), None);
    }

    #[tokio::test]
    async fn test_create_power_strip() {
        let svc = service().await;
        let device = power_strip(3).await;

        let outcome = svc.dispatch("create", json!({"ip": device.host})).await;
        assert!(outcome.valid);
        assert_eq!(outcome.code, 201);

        let address = DeviceAddress::normalize(&device.host).unwrap();
        let expected = DeviceId::derive(&address, DeviceType::PowerStrip);
        assert_eq!(outcome.info, json!(expected.as_str()));

        let stored = svc.registry().get_device(&expected).await.unwrap().unwrap();
        assert_eq!(stored.address, device.address);
        assert_eq!(stored.command_path, "/ps");

        let rows = svc.registry().list_switches(&expected).await.unwrap();
        assert_eq!(rows.len(), 3);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.switch_index, i as i64);
            assert_eq!(row.switch_name, format!("Switch {}", i));
            assert_eq!(row.profile_name, "PS_1");
        }
    }

    #[tokio::test]
    async fn test_profile_names_skip_taken_ones() {
        let svc = service().await;
        let first = power_strip(1).await;
        let second = power_strip(2).await;

        let a = svc.create(&first.host).await.unwrap();
        let b = svc.create(&second.host).await.unwrap();

        let rows_a = svc.registry().list_switches(&a).await.unwrap();
        let rows_b = svc.registry().list_switches(&b).await.unwrap();
        assert_eq!(rows_a[0].profile_name, "PS_1");
        assert!(rows_b.iter().all(|r| r.profile_name == "PS_2"));

        // A freed name is reused
        svc.delete(&a).await.unwrap();
        let third = power_strip(1).await;
        let c = svc.create(&third.host).await.unwrap();
        assert_eq!(svc.registry().list_switches(&c).await.unwrap()[0].profile_name, "PS_1");
    }

    #[tokio::test]
    async fn test_create_other_types_has_no_profile() {
        let svc = service().await;
        let device = FakeDevice::builder("led_strip_controller").spawn().await.unwrap();

        let id = svc.create(&device.host).await.unwrap();
        assert_eq!(svc.registry().count_switches(&id).await.unwrap(), 0);
        assert_eq!(
            svc.registry().get_command_path(&id).await.unwrap().as_deref(),
            Some("/rgb")
        );
    }

    #[tokio::test]
    async fn test_create_rejects_bad_address() {
        let svc = service().await;
        let outcome = svc.dispatch("create", json!({"ip": "192.168.1.10/x"})).await;
        assert_eq!(outcome, Outcome::failure("Not valid input", 400));
        assert_eq!(svc.registry().count_devices().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_unsupported_type() {
        let svc = service().await;
        let device = FakeDevice::builder("toaster").spawn().await.unwrap();

        let err = svc.create(&device.host).await.unwrap_err();
        assert_eq!(err, DeviceError::UnsupportedDevice("toaster".into()));
        assert_eq!(svc.registry().count_devices().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_unreachable_device() {
        let svc = service().await;
        let address = unreachable_address().await.unwrap();

        let outcome = svc.dispatch("create", json!({"ip": address})).await;
        assert_eq!(outcome, Outcome::failure("Server error", 500));
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let svc = service().await;
        let device = power_strip(2).await;

        svc.create(&device.host).await.unwrap();
        let outcome = svc.dispatch("create", json!({"ip": device.address})).await;
        assert_eq!(outcome, Outcome::failure("Not valid input", 400));
        assert_eq!(svc.registry().count_devices().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_create() {
        let svc = service().await;
        let device = power_strip(3).await;

        let (a, b) = tokio::join!(
            svc.dispatch("create", json!({"ip": device.host})),
            svc.dispatch("create", json!({"ip": device.host})),
        );

        let successes = [&a, &b].iter().filter(|o| o.valid).count();
        assert_eq!(successes, 1);
        let winner = if a.valid { &a } else { &b };
        let loser = if a.valid { &b } else { &a };
        assert_eq!(winner.code, 201);
        assert!(!loser.valid);
        assert!(loser.code == 400 || loser.code == 500);

        assert_eq!(svc.registry().count_devices().await.unwrap(), 1);
        let id = DeviceId(winner.info.as_str().unwrap().to_string());
        assert_eq!(svc.registry().count_switches(&id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_relay_probe_still_registers() {
        let svc = service().await;
        let device = FakeDevice::builder("power_strip")
            .relay_reply(Reply::raw(200, "garbage"))
            .spawn()
            .await
            .unwrap();

        let outcome = svc.dispatch("create", json!({"ip": device.host})).await;
        assert!(outcome.valid);
        assert_eq!(outcome.code, 201);

        let id = DeviceId(outcome.info.as_str().unwrap().to_string());
        assert!(svc.registry().device_exists(&id).await.unwrap());
        assert_eq!(svc.registry().count_switches(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_oversized_relay_count_still_registers() {
        let svc = service().await;
        let device = FakeDevice::builder("power_strip")
            .relay_reply(Reply::json(200, json!({"number": 4294967295u64})))
            .spawn()
            .await
            .unwrap();

        let outcome = svc.dispatch("create", json!({"ip": device.host})).await;
        assert!(outcome.valid);
        assert_eq!(outcome.code, 201);

        let id = DeviceId(outcome.info.as_str().unwrap().to_string());
        assert!(svc.registry().device_exists(&id).await.unwrap());
        assert_eq!(svc.registry().count_switches(&id).await.unwrap(), 0);
        assert!(logs_contain("profile_bootstrap_failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_switch_insert_failure_keeps_earlier_rows() {
        let svc = service().await;
        sqlx::query(
            "CREATE TRIGGER reject_third_switch BEFORE INSERT ON power_strip \
             WHEN NEW.switch_index = 2 \
             BEGIN SELECT RAISE(ABORT, 'switch rejected'); END",
        )
        .execute(svc.registry().pool())
        .await
        .unwrap();
        let device = power_strip(4).await;

        let outcome = svc.dispatch("create", json!({"ip": device.host})).await;
        assert!(outcome.valid);
        assert_eq!(outcome.code, 201);

        let id = DeviceId(outcome.info.as_str().unwrap().to_string());
        let rows = svc.registry().list_switches(&id).await.unwrap();
        let indices: Vec<_> = rows.iter().map(|r| r.switch_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(rows.iter().all(|r| r.profile_name == "PS_1"));
        assert!(logs_contain("profile_bootstrap_failed"));
    }

    #[tokio::test]
    async fn test_delete() {
        let svc = service().await;
        let device = power_strip(2).await;
        let id = svc.create(&device.host).await.unwrap();

        let outcome = svc.dispatch("delete", json!({"device_id": id.as_str()})).await;
        assert_eq!(outcome, Outcome::ok());
        assert!(!svc.registry().device_exists(&id).await.unwrap());
        assert_eq!(svc.registry().count_switches(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_device() {
        let svc = service().await;
        let device = power_strip(1).await;
        svc.create(&device.host).await.unwrap();

        let outcome = svc.dispatch("delete", json!({"device_id": "missing"})).await;
        assert_eq!(outcome, Outcome::failure("Not valid id", 400));
        assert_eq!(svc.registry().count_devices().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rename_profile() {
        let svc = service().await;
        let device = power_strip(2).await;
        let id = svc.create(&device.host).await.unwrap();

        let outcome = svc
            .dispatch("change_ps_name", json!({"device_id": id.as_str(), "new_name": "Desk"}))
            .await;
        assert_eq!(outcome, Outcome::ok());
        let rows = svc.registry().list_switches(&id).await.unwrap();
        assert!(rows.iter().all(|r| r.profile_name == "Desk"));

        let outcome = svc
            .dispatch("change_ps_name", json!({"device_id": "missing", "new_name": "Desk"}))
            .await;
        assert_eq!(outcome, Outcome::failure("Not valid id", 400));
    }

    #[tokio::test]
    async fn test_rename_switch_bounds() {
        let svc = service().await;
        let device = power_strip(3).await;
        let id = svc.create(&device.host).await.unwrap();

        let rename = |k: i64| {
            svc.dispatch(
                "change_switch_name",
                json!({"device_id": id.as_str(), "switch_number": k, "new_name": format!("S{}", k)}),
            )
        };

        assert_eq!(rename(0).await, Outcome::failure("Not valid switch number", 400));
        assert_eq!(rename(4).await, Outcome::failure("Not valid switch number", 400));
        assert_eq!(rename(1).await, Outcome::ok());
        assert_eq!(rename(3).await, Outcome::ok());

        let rows = svc.registry().list_switches(&id).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.switch_name.as_str()).collect();
        assert_eq!(names, vec!["S1", "Switch 1", "S3"]);
    }

    #[tokio::test]
    async fn test_send_action() {
        let svc = service().await;
        let device = power_strip(2).await;
        let id = svc.create(&device.host).await.unwrap();

        let params = json!({"relay": 1, "state": "on"});
        let outcome = svc
            .dispatch("send", json!({"id": id.as_str(), "params": params}))
            .await;
        assert_eq!(outcome, Outcome::success("ok", 200));
        assert_eq!(device.received_actions().await, vec![params]);
    }

    #[tokio::test]
    async fn test_send_action_device_failure() {
        let svc = service().await;
        let device = FakeDevice::builder("remote_controller")
            .action_reply(Reply::json(400, json!({"msg": "unknown button"})))
            .spawn()
            .await
            .unwrap();
        let id = svc.create(&device.host).await.unwrap();

        let outcome = svc
            .dispatch("send", json!({"id": id.as_str(), "params": {"button": "x"}}))
            .await;
        assert_eq!(outcome, Outcome::failure("unknown button", 400));
    }

    #[tokio::test]
    async fn test_send_action_unexpected_status() {
        let svc = service().await;
        let device = FakeDevice::builder("remote_controller")
            .action_reply(Reply::json(404, json!({"msg": "no route"})))
            .spawn()
            .await
            .unwrap();
        let id = svc.create(&device.host).await.unwrap();

        let outcome = svc
            .dispatch("send", json!({"id": id.as_str(), "params": {}}))
            .await;
        assert_eq!(outcome, Outcome::failure("Request error", 404));
    }

    #[tokio::test]
    async fn test_send_to_unknown_device() {
        let svc = service().await;
        let outcome = svc
            .dispatch("send", json!({"id": "missing", "params": {}}))
            .await;
        assert_eq!(outcome, Outcome::failure("Not valid id", 400));
    }

    #[tokio::test]
    async fn test_get_status() {
        let svc = service().await;
        let status = json!({"relays": [true, false], "uptime": 12});
        let device = FakeDevice::builder("power_strip")
            .relays(2)
            .status_reply(Reply::json(200, status.clone()))
            .spawn()
            .await
            .unwrap();
        let id = svc.create(&device.host).await.unwrap();

        let outcome = svc.dispatch("get", json!({"id": id.as_str()})).await;
        assert_eq!(outcome, Outcome::success(status, 200));
    }

    #[tokio::test]
    async fn test_get_status_unreachable() {
        let svc = service().await;
        let address = DeviceAddress::normalize(&unreachable_address().await.unwrap()).unwrap();
        let device = Device::new(&address, DeviceType::RemoteController);
        svc.registry().insert_device(&device).await.unwrap();

        let outcome = svc.dispatch("get", json!({"id": device.id.as_str()})).await;
        assert_eq!(outcome, Outcome::failure("Server error", 500));
    }

    #[tokio::test]
    async fn test_get_status_malformed_reply() {
        let svc = service().await;
        let device = FakeDevice::builder("remote_controller")
            .status_reply(Reply::raw(200, "not json"))
            .spawn()
            .await
            .unwrap();
        let id = svc.create(&device.host).await.unwrap();

        let outcome = svc.dispatch("get", json!({"id": id.as_str()})).await;
        assert_eq!(outcome, Outcome::failure("Request error", 400));
    }

    #[tokio::test]
    async fn test_unknown_action_and_bad_info() {
        let svc = service().await;
        assert_eq!(
            svc.dispatch("explode", json!({})).await,
            Outcome::failure("Not valid action", 400)
        );
        assert_eq!(
            svc.dispatch("create", json!({"address": "10.0.0.1"})).await,
            Outcome::failure("Not valid input", 400)
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_persistence_failure() {
        let svc = service().await;
        svc.registry().pool().close().await;

        let outcome = svc.dispatch("delete", json!({"device_id": "any"})).await;
        assert_eq!(outcome, Outcome::failure("Error", 500));
    }
}
