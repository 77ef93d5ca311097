//! End-to-end scenarios against `mock::MockStack`, exercising the full
//! receiver → handler → operation path without a live socket.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bacnet_rs::object::ObjectType;

use bacnet_client_core::mock::MockStack;
use bacnet_client_core::{BacnetAddress, DecodedApdu, Driver, DriverConfig, PropertyValue};

fn fast_config() -> DriverConfig {
    DriverConfig {
        apdu_timeout_ms: 40,
        apdu_retries: 2,
        ..Default::default()
    }
}

fn mock_with(timeout_ms: u64, retries: u32) -> Arc<MockStack> {
    let mut mock = MockStack::new();
    mock.apdu_timeout_ms = timeout_ms;
    mock.apdu_retries = retries;
    Arc::new(mock)
}

#[test]
fn s1_ip_read_warm_bind() {
    let mock = mock_with(40, 2);
    let addr = BacnetAddress::from_socket_addr("10.0.2.1:47808".parse().unwrap());
    mock.seed_binding(1234, addr.clone(), 1476);

    let driver = Driver::from_stack(Box::new(mock.clone()), fast_config());

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            mock.inject(
                addr.clone(),
                DecodedApdu::ReadPropertyAck {
                    invoke_id: 1,
                    value: Some(PropertyValue::Real(42.5)),
                },
            );
        });

        let value = driver.read_property(1234, ObjectType::AnalogInput, 1, 85, None, None);
        assert_eq!(value, Some(PropertyValue::Real(42.5)));
    });

    driver.deinit();
}

#[test]
fn s2_ip_read_cold_bind_via_who_is() {
    let mock = mock_with(200, 2);
    let addr = BacnetAddress::from_socket_addr("10.0.2.2:47808".parse().unwrap());

    let driver = Driver::from_stack(Box::new(mock.clone()), fast_config());

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            mock.inject(
                addr.clone(),
                DecodedApdu::IAm {
                    device_id: 2001,
                    max_apdu: 1476,
                    segmentation: 0,
                    vendor_id: 0,
                },
            );
            thread::sleep(Duration::from_millis(10));
            mock.inject(
                addr.clone(),
                DecodedApdu::ReadPropertyAck {
                    invoke_id: 1,
                    value: Some(PropertyValue::Real(7.0)),
                },
            );
        });

        let value = driver.read_property(2001, ObjectType::AnalogInput, 1, 85, None, None);
        assert_eq!(value, Some(PropertyValue::Real(7.0)));
    });

    driver.deinit();
}

#[test]
fn s3_error_response_fails_write() {
    let mock = mock_with(40, 2);
    let addr = BacnetAddress::from_socket_addr("10.0.2.3:47808".parse().unwrap());
    mock.seed_binding(2, addr.clone(), 1476);

    let driver = Driver::from_stack(Box::new(mock.clone()), fast_config());

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            mock.inject(
                addr.clone(),
                DecodedApdu::Error {
                    invoke_id: 1,
                    class_name: "property",
                    code_name: "write-access-denied",
                },
            );
        });

        let result = driver.write_property(
            2,
            ObjectType::BinaryOutput,
            2,
            85,
            None,
            None,
            None,
            PropertyValue::Boolean(true),
        );
        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("property"));
        assert!(message.contains("write-access-denied"));
    });

    driver.deinit();
}

#[test]
fn s4_timeout_returns_within_deadline() {
    let mock = mock_with(30, 1);
    let driver = Driver::from_stack(Box::new(mock), fast_config());

    let start = Instant::now();
    let value = driver.read_property(9999, ObjectType::AnalogInput, 1, 85, None, None);
    assert!(value.is_none());
    assert!(start.elapsed() < Duration::from_secs(2));

    driver.deinit();
}

#[test]
fn s5_concurrent_reads_no_cross_delivery() {
    let mock = mock_with(300, 2);
    let addr_a = BacnetAddress::from_socket_addr("10.0.2.10:47808".parse().unwrap());
    let addr_b = BacnetAddress::from_socket_addr("10.0.2.11:47808".parse().unwrap());
    mock.seed_binding(4001, addr_a.clone(), 1476);
    mock.seed_binding(4002, addr_b.clone(), 1476);

    let driver = Driver::from_stack(Box::new(mock.clone()), fast_config());

    thread::scope(|s| {
        // Both reads warm-bind instantly; staggering the spawns by a few
        // milliseconds pins invoke-id 1 to device A and 2 to device B so
        // the test can inject deterministically, without weakening the
        // property under test: both requests are in flight and waiting
        // concurrently when the (reversed-order) acks arrive.
        let handle_a = s.spawn(|| driver.read_property(4001, ObjectType::AnalogInput, 1, 85, None, None));
        thread::sleep(Duration::from_millis(5));
        let handle_b = s.spawn(|| driver.read_property(4002, ObjectType::AnalogInput, 1, 85, None, None));
        thread::sleep(Duration::from_millis(5));

        mock.inject(
            addr_b.clone(),
            DecodedApdu::ReadPropertyAck {
                invoke_id: 2,
                value: Some(PropertyValue::Real(2.0)),
            },
        );
        mock.inject(
            addr_a.clone(),
            DecodedApdu::ReadPropertyAck {
                invoke_id: 1,
                value: Some(PropertyValue::Real(1.0)),
            },
        );

        assert_eq!(handle_a.join().unwrap(), Some(PropertyValue::Real(1.0)));
        assert_eq!(handle_b.join().unwrap(), Some(PropertyValue::Real(2.0)));
    });

    driver.deinit();
}

#[test]
fn s6_discovery_drains_once() {
    let mock = mock_with(30, 1);
    let driver = Driver::from_stack(Box::new(mock.clone()), fast_config());

    let devices = [
        (5001, BacnetAddress::from_socket_addr("10.0.2.20:47808".parse().unwrap())),
        (5002, BacnetAddress::from_socket_addr("10.0.2.21:47808".parse().unwrap())),
        (5003, BacnetAddress::from_socket_addr("10.0.2.22:47808".parse().unwrap())),
    ];
    for (device_id, addr) in &devices {
        mock.inject(
            addr.clone(),
            DecodedApdu::IAm {
                device_id: *device_id,
                max_apdu: 1476,
                segmentation: 0,
                vendor_id: 0,
            },
        );
    }
    // Let the receiver thread drain the injected queue into T3 before the
    // first who-is call races it.
    thread::sleep(Duration::from_millis(30));

    let mut found = driver.who_is();
    found.sort_by_key(|d| d.device_id);
    assert_eq!(found.len(), 3);
    assert_eq!(found[0].device_id, 5001);
    assert_eq!(found[1].device_id, 5002);
    assert_eq!(found[2].device_id, 5003);

    let second = driver.who_is();
    assert!(second.is_empty());

    driver.deinit();
}
