//! Service handlers (§4.H). Every handler looks up its transaction by
//! invoke-id (or device-wait by device-id for I-Am), checks the source
//! address against the record's expectation, and signals regardless of
//! match so the waiter re-evaluates its predicate on every wake.

use tracing::{debug, trace, warn};

use crate::address::BacnetAddress;
use crate::codec::PropertyValue;
use crate::driver::DriverInner;
use crate::error::DriverError;
use crate::stack::DecodedApdu;

pub fn dispatch(inner: &DriverInner, source: BacnetAddress, decoded: DecodedApdu) {
    match decoded {
        DecodedApdu::IAm {
            device_id,
            max_apdu,
            segmentation,
            vendor_id,
        } => handle_iam(inner, source, device_id, max_apdu, segmentation, vendor_id),
        DecodedApdu::ReadPropertyAck { invoke_id, value } => {
            handle_read_property_ack(inner, source, invoke_id, value)
        }
        DecodedApdu::WritePropertySimpleAck { invoke_id } => {
            handle_simple_ack(inner, source, invoke_id)
        }
        DecodedApdu::Error {
            invoke_id,
            class_name,
            code_name,
        } => handle_error(inner, source, invoke_id, class_name, code_name),
        DecodedApdu::Abort { invoke_id, reason_name } => handle_abort(inner, source, invoke_id, reason_name),
        DecodedApdu::Reject { invoke_id, reason_name } => handle_reject(inner, source, invoke_id, reason_name),
        DecodedApdu::Ignored => {}
    }
}

fn handle_iam(
    inner: &DriverInner,
    source: BacnetAddress,
    device_id: u32,
    max_apdu: u32,
    segmentation: u32,
    vendor_id: u32,
) {
    trace!(device_id, max_apdu, segmentation, vendor_id, "received I-Am");

    if let Some(wait) = inner.t2.lookup(device_id) {
        let mut state = wait.lock();
        if state.address.is_placeholder() {
            inner.stack.address_add_binding(device_id, max_apdu, source);
        }
        drop(state);
        wait.signal();
        return;
    }

    inner.t3.set(device_id, max_apdu, source);
}

fn handle_read_property_ack(
    inner: &DriverInner,
    source: BacnetAddress,
    invoke_id: u8,
    value: Option<PropertyValue>,
) {
    let Some(record) = inner.t1.lookup(invoke_id) else {
        trace!(invoke_id, "read-property ack for unknown invoke-id");
        return;
    };

    let mut state = record.lock();
    if state.target_address.matches(&source) {
        if state.result.is_none() {
            if value.is_none() {
                debug!(invoke_id, "read-property ack failed to decode");
            }
            state.result = value;
        } else {
            trace!(invoke_id, "duplicate read-property ack ignored");
        }
    }
    drop(state);
    record.signal();
}

fn handle_simple_ack(inner: &DriverInner, source: BacnetAddress, invoke_id: u8) {
    let Some(record) = inner.t1.lookup(invoke_id) else {
        trace!(invoke_id, "simple-ack for unknown invoke-id");
        return;
    };

    let state = record.lock();
    let matched = state.target_address.matches(&source);
    drop(state);
    if matched {
        trace!(invoke_id, "write-property simple-ack received");
    }
    record.signal();
}

fn handle_error(inner: &DriverInner, source: BacnetAddress, invoke_id: u8, class_name: &'static str, code_name: &'static str) {
    let Some(record) = inner.t1.lookup(invoke_id) else {
        return;
    };

    let mut state = record.lock();
    if state.target_address.matches(&source) {
        warn!(invoke_id, class = class_name, code = code_name, "peer returned error");
        state.error = true;
        state.error_detail = Some(DriverError::Protocol { class_name, code_name });
    }
    drop(state);
    record.signal();
}

fn handle_abort(inner: &DriverInner, source: BacnetAddress, invoke_id: u8, reason_name: &'static str) {
    let Some(record) = inner.t1.lookup(invoke_id) else {
        return;
    };

    let mut state = record.lock();
    if state.target_address.matches(&source) {
        warn!(invoke_id, reason = reason_name, "peer aborted");
        state.error = true;
        state.error_detail = Some(DriverError::Aborted { reason_name });
    }
    drop(state);
    record.signal();
}

fn handle_reject(inner: &DriverInner, source: BacnetAddress, invoke_id: u8, reason_name: &'static str) {
    let Some(record) = inner.t1.lookup(invoke_id) else {
        return;
    };

    let mut state = record.lock();
    if state.target_address.matches(&source) {
        warn!(invoke_id, reason = reason_name, "peer rejected");
        state.error = true;
        state.error_detail = Some(DriverError::Rejected { reason_name });
    }
    drop(state);
    record.signal();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::driver::DriverInner;
    use crate::stack::mock::MockStack;
    use std::sync::Arc;

    fn test_inner() -> Arc<DriverInner> {
        Arc::new(DriverInner::new_for_test(Box::new(MockStack::new()), DriverConfig::default()))
    }

    #[test]
    fn iam_for_unwaited_device_populates_t3() {
        let inner = test_inner();
        handle_iam(&inner, BacnetAddress::placeholder(), 99, 1476, 0, 0);
        assert_eq!(inner.t3.len(), 1);
        assert!(inner.t2.is_empty());
    }

    #[test]
    fn iam_for_waited_device_binds_and_signals() {
        let inner = test_inner();
        let _wait = inner.t2.insert(42);
        let addr = BacnetAddress::from_socket_addr("10.0.0.9:47808".parse().unwrap());
        handle_iam(&inner, addr.clone(), 42, 1476, 0, 0);
        assert!(inner.t3.is_empty());
        let bound = inner.stack.address_bind_request(42).expect("binding should be recorded");
        assert_eq!(bound.0, addr);
        assert_eq!(bound.1, 1476);
    }

    #[test]
    fn read_property_ack_first_wins() {
        let inner = test_inner();
        let record = inner.t1.insert(5);
        let addr = BacnetAddress::from_socket_addr("10.0.0.9:47808".parse().unwrap());
        record.lock().target_address = addr.clone();

        handle_read_property_ack(&inner, addr.clone(), 5, Some(PropertyValue::Real(1.0)));
        handle_read_property_ack(&inner, addr, 5, Some(PropertyValue::Real(2.0)));

        assert_eq!(record.lock().result, Some(PropertyValue::Real(1.0)));
    }

    #[test]
    fn error_sets_error_flag_only_on_address_match() {
        let inner = test_inner();
        let record = inner.t1.insert(9);
        let addr = BacnetAddress::from_socket_addr("10.0.0.9:47808".parse().unwrap());
        record.lock().target_address = addr.clone();

        let wrong_addr = BacnetAddress::from_socket_addr("10.0.0.10:47808".parse().unwrap());
        handle_error(&inner, wrong_addr, 9, "property", "write-access-denied");
        assert!(!record.lock().error);

        handle_error(&inner, addr, 9, "property", "write-access-denied");
        assert!(record.lock().error);
    }
}
