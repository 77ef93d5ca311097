//! Adapts the gateway's `tokio` runtime to `bacnet_client_core::Driver`'s
//! blocking, OS-thread API via `spawn_blocking` — the same seam the original
//! raw-socket engine used for its own receive loop, just one layer up: the
//! driver now owns the receive loop and the request/response correlation,
//! and this module only has to hand it calls and read back results.

use crate::config::BacnetConfig;
use bacnet_client_core::{DiscoveredDevice, Driver, DriverConfig, DriverError, PropertyValue};
use bacnet_rs::object::ObjectType;
use std::sync::Arc;
use tracing::info;

pub struct BacnetEngine {
    driver: Arc<Driver>,
}

impl BacnetEngine {
    pub fn new(config: BacnetConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!(bind_addr = %config.bind_addr, device_id = config.device_id, "initializing BACnet driver");

        let driver_config = DriverConfig {
            bind_addr: config.bind_addr,
            apdu_timeout_ms: config.apdu_timeout_ms,
            apdu_retries: config.apdu_retries,
            bbmd_address: config.bbmd_address,
            bbmd_port: config.bbmd_port,
            iface: None,
        };

        let driver = Driver::init(driver_config)?;
        Ok(Self {
            driver: Arc::new(driver),
        })
    }

    /// Broadcasts Who-Is and returns whatever I-Ams arrived within the APDU
    /// timeout budget. A repeat call only returns devices discovered since
    /// the last one (the core drains its address-entry table on each call).
    pub async fn discover(&self) -> Vec<DiscoveredDevice> {
        let driver = self.driver.clone();
        tokio::task::spawn_blocking(move || driver.who_is())
            .await
            .unwrap_or_default()
    }

    /// Reads Present_Value (property 85) off `object_type:object_instance`
    /// at `device_instance`, binding the device first if necessary.
    pub async fn read_present_value(
        &self,
        device_instance: u32,
        object_type: ObjectType,
        object_instance: u32,
    ) -> Option<PropertyValue> {
        const PRESENT_VALUE: u32 = 85;
        let driver = self.driver.clone();
        tokio::task::spawn_blocking(move || {
            driver.read_property(device_instance, object_type, object_instance, PRESENT_VALUE, None, None)
        })
        .await
        .ok()
        .flatten()
    }

    /// Writes Present_Value at the given priority.
    pub async fn write_present_value(
        &self,
        device_instance: u32,
        object_type: ObjectType,
        object_instance: u32,
        priority: Option<u8>,
        value: PropertyValue,
    ) -> Result<(), DriverError> {
        const PRESENT_VALUE: u32 = 85;
        let driver = self.driver.clone();
        tokio::task::spawn_blocking(move || {
            driver.write_property(
                device_instance,
                object_type,
                object_instance,
                PRESENT_VALUE,
                None,
                None,
                priority,
                value,
            )
        })
        .await
        .unwrap_or_else(|_| Err(DriverError::Resource("driver task panicked".to_string())))
    }

    /// Translates a caller-supplied IP into the device instance bound to it,
    /// running a fresh Who-Is if the mapping isn't already cached.
    pub async fn ip_to_instance(&self, ip: String) -> Option<u32> {
        let driver = self.driver.clone();
        tokio::task::spawn_blocking(move || driver.ip_to_instance(&ip))
            .await
            .ok()
            .flatten()
    }

    /// Stops the receiver thread and releases the datalink. Only succeeds if
    /// no other clone of the engine's `Arc<Driver>` is outstanding; callers
    /// that spawned background tasks holding the engine must drop those
    /// first.
    pub fn shutdown(self) {
        match Arc::try_unwrap(self.driver) {
            Ok(driver) => driver.deinit(),
            Err(_) => tracing::warn!("BACnet driver still has outstanding references; skipping deinit"),
        }
    }
}
