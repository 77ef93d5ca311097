//! Find-and-bind (§4.F): resolves a device-instance to a datalink address
//! before a confirmed request can be sent, using the stack's address-bind
//! table first and falling back to a directed Who-Is / I-Am round trip.

use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use crate::driver::DriverInner;
use crate::error::DriverError;
use crate::tables::transaction::{apdu_deadline, PendingRequest};

/// The largest valid BACnet device instance (22-bit instance field).
pub const BACNET_MAX_INSTANCE: u32 = 4_194_303;

pub fn find_and_bind(inner: &DriverInner, record: &Arc<PendingRequest>, port: Option<u16>, device_instance: u32) -> bool {
    if device_instance > BACNET_MAX_INSTANCE {
        let mut state = record.lock();
        state.error = true;
        state.error_detail = Some(DriverError::Precondition(format!(
            "device instance {device_instance} exceeds {BACNET_MAX_INSTANCE}"
        )));
        return false;
    }

    if let Some(port) = port {
        trace!(port, "custom BACnet/IP port requested; not supported by this datalink, ignoring");
    }

    if let Some((addr, _max_apdu)) = inner.stack.address_bind_request(device_instance) {
        record.lock().target_address = addr;
        return true;
    }

    let wait = inner.t2.insert(device_instance);
    let deadline = apdu_deadline(inner.stack.apdu_timeout_ms(), inner.stack.apdu_retries());

    let guard = wait.lock();
    if let Err(e) = inner.stack.send_who_is(Some(device_instance), Some(device_instance)) {
        trace!(error = %e, device_instance, "send_who_is failed during find-and-bind");
    }
    let _guard = wait.wait_until(guard, deadline);
    inner.t2.remove(device_instance);

    if record.lock().error {
        return false;
    }

    if let Some((addr, _max_apdu)) = inner.stack.address_bind_request(device_instance) {
        record.lock().target_address = addr;

        let invoke_id = record.lock().invoke_id;
        if invoke_id == 0 {
            return true;
        }
        if inner.stack.tsm_invoke_id_free(invoke_id) {
            return false;
        }
        if inner.stack.tsm_invoke_id_failed(invoke_id) {
            inner.stack.tsm_free_invoke_id(invoke_id);
            let mut state = record.lock();
            state.error = true;
            state.error_detail = Some(DriverError::BindFailed { device_instance });
            return false;
        }
        return true;
    }

    if Instant::now() >= deadline {
        let mut state = record.lock();
        state.error = true;
        state.error_detail = Some(DriverError::BindFailed { device_instance });
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::BacnetAddress;
    use crate::config::DriverConfig;
    use crate::driver::DriverInner;
    use crate::stack::mock::MockStack;

    fn test_inner(timeout_ms: u64, retries: u32) -> DriverInner {
        let mut stack = MockStack::new();
        stack.apdu_timeout_ms = timeout_ms;
        stack.apdu_retries = retries;
        DriverInner::new_for_test(Box::new(stack), DriverConfig::default())
    }

    #[test]
    fn rejects_instance_above_maximum() {
        let inner = test_inner(50, 1);
        let record = inner.t1.insert(0);
        assert!(!find_and_bind(&inner, &record, None, BACNET_MAX_INSTANCE + 1));
        assert!(record.lock().error);
    }

    #[test]
    fn warm_bind_short_circuits_who_is() {
        let mut stack = MockStack::new();
        stack.apdu_timeout_ms = 50;
        stack.apdu_retries = 1;
        let addr = BacnetAddress::from_socket_addr("10.0.0.5:47808".parse().unwrap());
        stack.seed_binding(1234, addr.clone(), 1476);
        let inner = DriverInner::new_for_test(Box::new(stack), DriverConfig::default());

        let record = inner.t1.insert(0);
        assert!(find_and_bind(&inner, &record, None, 1234));
        assert_eq!(record.lock().target_address, addr);
    }

    #[test]
    fn cold_bind_without_iam_times_out_without_error() {
        let inner = test_inner(30, 1);
        let record = inner.t1.insert(0);
        assert!(!find_and_bind(&inner, &record, None, 2222));
        assert!(inner.t2.is_empty());
    }
}
