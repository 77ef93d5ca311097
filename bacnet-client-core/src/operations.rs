//! Public operations (§4.O): read-property, write-property, who-is, and the
//! T4-backed `ip_to_instance` translation. Each creates a T1 record, arms it
//! before sending (record mutex held across `send_*_request` and into the
//! wait — see §5's ordering guarantee), waits, then tears the record down.

use bacnet_rs::object::ObjectType;
use tracing::debug;

use crate::address::BacnetAddress;
use crate::bind::find_and_bind;
use crate::codec::PropertyValue;
use crate::driver::DriverInner;
use crate::error::DriverError;
use crate::tables::transaction::{apdu_deadline, BROADCAST_INVOKE_ID};

/// A device discovered via Who-Is, drained from T3.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub device_id: u32,
    pub max_apdu: u32,
    pub address: BacnetAddress,
}

pub fn read_property(
    inner: &DriverInner,
    device_instance: u32,
    object_type: ObjectType,
    object_instance: u32,
    property_id: u32,
    array_index: Option<u32>,
    port: Option<u16>,
) -> Option<PropertyValue> {
    let record = inner.t1.insert(0);

    if !find_and_bind(inner, &record, port, device_instance) {
        inner.t1.remove(&record);
        return None;
    }

    let deadline = apdu_deadline(inner.stack.apdu_timeout_ms(), inner.stack.apdu_retries());

    // The record mutex is held from here straight into wait_until so a
    // response cannot be signalled before the caller has begun waiting.
    let mut guard = record.lock();
    let invoke_id = match inner.stack.send_read_property_request(
        &guard.target_address,
        object_type,
        object_instance,
        property_id,
        array_index,
    ) {
        Ok(id) => id,
        Err(e) => {
            debug!(error = %e, device_instance, "send_read_property_request failed");
            drop(guard);
            inner.t1.remove(&record);
            return None;
        }
    };
    guard.invoke_id = invoke_id;
    let guard = record.wait_until(guard, deadline);

    let result = guard.result.clone();
    drop(guard);
    inner.t1.remove(&record);
    result
}

#[allow(clippy::too_many_arguments)]
pub fn write_property(
    inner: &DriverInner,
    device_instance: u32,
    object_type: ObjectType,
    object_instance: u32,
    property_id: u32,
    array_index: Option<u32>,
    port: Option<u16>,
    priority: Option<u8>,
    value: PropertyValue,
) -> Result<(), DriverError> {
    let record = inner.t1.insert(0);

    if !find_and_bind(inner, &record, port, device_instance) {
        let detail = record.lock().error_detail.clone();
        inner.t1.remove(&record);
        return Err(detail.unwrap_or(DriverError::BindFailed { device_instance }));
    }

    let deadline = apdu_deadline(inner.stack.apdu_timeout_ms(), inner.stack.apdu_retries());

    let mut guard = record.lock();
    let invoke_id = match inner.stack.send_write_property_request(
        &guard.target_address,
        object_type,
        object_instance,
        property_id,
        array_index,
        priority,
        value,
    ) {
        Ok(id) => id,
        Err(e) => {
            drop(guard);
            inner.t1.remove(&record);
            return Err(e);
        }
    };
    guard.invoke_id = invoke_id;
    let guard = record.wait_until(guard, deadline);

    let outcome = if guard.error {
        Err(guard.error_detail.clone().unwrap_or(DriverError::Timeout))
    } else {
        Ok(())
    };
    drop(guard);
    inner.t1.remove(&record);
    outcome
}

pub fn who_is(inner: &DriverInner) -> Vec<DiscoveredDevice> {
    let record = inner.t1.insert(BROADCAST_INVOKE_ID);
    record.lock().error = false;

    let dest = inner.stack.datalink_get_broadcast_address();
    let deadline = apdu_deadline(inner.stack.apdu_timeout_ms(), inner.stack.apdu_retries());

    let guard = record.lock();
    if let Err(e) = inner.stack.send_who_is_to_network(&dest, None, None) {
        debug!(error = %e, "send_who_is_to_network failed");
    }
    let guard = record.wait_until(guard, deadline);
    drop(guard);
    inner.t1.remove(&record);

    inner
        .t3
        .drain_all()
        .into_iter()
        .map(|e| DiscoveredDevice {
            device_id: e.device_id,
            max_apdu: e.max_apdu,
            address: e.address,
        })
        .collect()
}

pub fn ip_to_instance(inner: &DriverInner, ip: &str) -> Option<u32> {
    if inner.config.bbmd_address.is_some() {
        return None;
    }

    if let Some(instance) = inner.t4.get(ip) {
        return Some(instance);
    }

    for device in who_is(inner) {
        if let Some(socket) = device.address.to_socket_addr() {
            inner.t4.set(&socket.ip().to_string(), device.device_id);
        }
    }

    inner.t4.get(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::stack::mock::MockStack;

    fn test_inner() -> DriverInner {
        let mut stack = MockStack::new();
        stack.apdu_timeout_ms = 30;
        stack.apdu_retries = 1;
        DriverInner::new_for_test(Box::new(stack), DriverConfig::default())
    }

    #[test]
    fn read_property_returns_none_when_bind_never_resolves() {
        let inner = test_inner();
        let value = read_property(&inner, 77, ObjectType::AnalogInput, 1, 85, None, None);
        assert!(value.is_none());
        assert!(inner.t1.is_empty());
        assert!(inner.t2.is_empty());
    }

    #[test]
    fn who_is_drains_t3_into_discovered_devices() {
        let inner = test_inner();
        let addr = BacnetAddress::from_socket_addr("10.0.0.9:47808".parse().unwrap());
        inner.t3.set(42, 1476, addr.clone());

        let devices = who_is(&inner);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, 42);
        assert!(inner.t3.is_empty());
    }

    #[test]
    fn ip_to_instance_populates_t4_from_a_fresh_who_is() {
        let inner = test_inner();
        let addr = BacnetAddress::from_socket_addr("192.0.2.20:47808".parse().unwrap());
        inner.t3.set(55, 1476, addr);

        assert_eq!(ip_to_instance(&inner, "192.0.2.20"), Some(55));
        assert_eq!(inner.t4.get("192.0.2.20"), Some(55));
    }

    #[test]
    fn ip_to_instance_returns_none_when_bbmd_configured() {
        let mut config = DriverConfig::default();
        config.bbmd_address = Some("10.0.0.1".to_string());
        config.bbmd_port = Some(47808);
        let inner = DriverInner::new_for_test(Box::new(MockStack::new()), config);
        assert_eq!(ip_to_instance(&inner, "10.0.0.2"), None);
    }
}
