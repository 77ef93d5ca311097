//! The boundary between the correlation engine and the wire. `IpStack` wraps
//! `bacnet-rs`'s NPDU/APDU codec and BACnet/IP data link; the transaction
//! state machine (invoke-id bookkeeping) and the address-bind table are
//! hand-rolled here because the upstream crate provides neither.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use bacnet_rs::app::{Apdu, MaxApduSize, MaxSegments};
use bacnet_rs::datalink::bip::BacnetIpDataLink;
use bacnet_rs::datalink::{DataLink, DataLinkAddress};
use bacnet_rs::network::Npdu;
use bacnet_rs::object::ObjectType;
use bacnet_rs::service::{
    ConfirmedServiceChoice, IAmRequest, ReadPropertyRequest, ReadPropertyResponse,
    UnconfirmedServiceChoice, WhoIsRequest, WritePropertyRequest,
};
use tracing::{debug, trace, warn};

use crate::address::BacnetAddress;
use crate::codec::{decode_property_value, encode_property_value, PropertyValue};
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::names::{abort_reason_name, error_class_name, error_code_name, reject_reason_name};
use crate::tsm::Tsm;

/// A decoded, unconfirmed-or-confirmed service event produced by `receive`.
#[derive(Debug, Clone)]
pub enum DecodedApdu {
    IAm {
        device_id: u32,
        max_apdu: u32,
        segmentation: u32,
        vendor_id: u32,
    },
    ReadPropertyAck {
        invoke_id: u8,
        value: Option<PropertyValue>,
    },
    WritePropertySimpleAck {
        invoke_id: u8,
    },
    Error {
        invoke_id: u8,
        class_name: &'static str,
        code_name: &'static str,
    },
    Abort {
        invoke_id: u8,
        reason_name: &'static str,
    },
    Reject {
        invoke_id: u8,
        reason_name: &'static str,
    },
    /// A decodable but irrelevant APDU (e.g. a request this client never
    /// serves); dropped by the receiver without comment.
    Ignored,
}

/// The boundary interface between the correlation engine (`receiver`,
/// `handlers`, `bind`, `operations`) and a live or simulated datalink.
/// Implemented for real traffic by [`IpStack`] and, under `#[cfg(test)]`, by
/// a mock fixture in `tests/scenarios.rs` and this module's own unit tests.
pub trait BacnetStack: Send + Sync {
    fn receive(&self, timeout: Duration) -> Result<Option<(BacnetAddress, DecodedApdu)>, DriverError>;
    fn datalink_get_broadcast_address(&self) -> BacnetAddress;
    fn cleanup(&self);

    fn send_who_is(&self, min_id: Option<u32>, max_id: Option<u32>) -> Result<(), DriverError>;
    fn send_who_is_to_network(
        &self,
        dest: &BacnetAddress,
        min_id: Option<u32>,
        max_id: Option<u32>,
    ) -> Result<(), DriverError>;

    fn send_read_property_request(
        &self,
        addr: &BacnetAddress,
        object_type: ObjectType,
        object_instance: u32,
        property_id: u32,
        array_index: Option<u32>,
    ) -> Result<u8, DriverError>;

    #[allow(clippy::too_many_arguments)]
    fn send_write_property_request(
        &self,
        addr: &BacnetAddress,
        object_type: ObjectType,
        object_instance: u32,
        property_id: u32,
        array_index: Option<u32>,
        priority: Option<u8>,
        value: PropertyValue,
    ) -> Result<u8, DriverError>;

    fn address_bind_request(&self, device_instance: u32) -> Option<(BacnetAddress, u32)>;
    fn address_add_binding(&self, device_instance: u32, max_apdu: u32, addr: BacnetAddress);

    fn tsm_invoke_id_free(&self, invoke_id: u8) -> bool;
    fn tsm_invoke_id_failed(&self, invoke_id: u8) -> bool;
    fn tsm_free_invoke_id(&self, invoke_id: u8);
    fn tsm_sweep_expired(&self);

    fn apdu_timeout_ms(&self) -> u64;
    fn apdu_retries(&self) -> u32;
}

/// Lets a test harness hold an `Arc` to the same stack instance a `Driver`
/// is running against — e.g. an `Arc<mock::MockStack>` can be injected into
/// as well as boxed into the driver, so a scenario test can feed events
/// into the exact stack the driver under test is polling.
impl<T: BacnetStack + ?Sized> BacnetStack for std::sync::Arc<T> {
    fn receive(&self, timeout: Duration) -> Result<Option<(BacnetAddress, DecodedApdu)>, DriverError> {
        (**self).receive(timeout)
    }

    fn datalink_get_broadcast_address(&self) -> BacnetAddress {
        (**self).datalink_get_broadcast_address()
    }

    fn cleanup(&self) {
        (**self).cleanup()
    }

    fn send_who_is(&self, min_id: Option<u32>, max_id: Option<u32>) -> Result<(), DriverError> {
        (**self).send_who_is(min_id, max_id)
    }

    fn send_who_is_to_network(&self, dest: &BacnetAddress, min_id: Option<u32>, max_id: Option<u32>) -> Result<(), DriverError> {
        (**self).send_who_is_to_network(dest, min_id, max_id)
    }

    fn send_read_property_request(
        &self,
        addr: &BacnetAddress,
        object_type: ObjectType,
        object_instance: u32,
        property_id: u32,
        array_index: Option<u32>,
    ) -> Result<u8, DriverError> {
        (**self).send_read_property_request(addr, object_type, object_instance, property_id, array_index)
    }

    fn send_write_property_request(
        &self,
        addr: &BacnetAddress,
        object_type: ObjectType,
        object_instance: u32,
        property_id: u32,
        array_index: Option<u32>,
        priority: Option<u8>,
        value: PropertyValue,
    ) -> Result<u8, DriverError> {
        (**self).send_write_property_request(addr, object_type, object_instance, property_id, array_index, priority, value)
    }

    fn address_bind_request(&self, device_instance: u32) -> Option<(BacnetAddress, u32)> {
        (**self).address_bind_request(device_instance)
    }

    fn address_add_binding(&self, device_instance: u32, max_apdu: u32, addr: BacnetAddress) {
        (**self).address_add_binding(device_instance, max_apdu, addr)
    }

    fn tsm_invoke_id_free(&self, invoke_id: u8) -> bool {
        (**self).tsm_invoke_id_free(invoke_id)
    }

    fn tsm_invoke_id_failed(&self, invoke_id: u8) -> bool {
        (**self).tsm_invoke_id_failed(invoke_id)
    }

    fn tsm_free_invoke_id(&self, invoke_id: u8) {
        (**self).tsm_free_invoke_id(invoke_id)
    }

    fn tsm_sweep_expired(&self) {
        (**self).tsm_sweep_expired()
    }

    fn apdu_timeout_ms(&self) -> u64 {
        (**self).apdu_timeout_ms()
    }

    fn apdu_retries(&self) -> u32 {
        (**self).apdu_retries()
    }
}

/// The real BACnet/IP implementation of [`BacnetStack`].
pub struct IpStack {
    datalink: Mutex<BacnetIpDataLink>,
    tsm: Tsm,
    bindings: Mutex<HashMap<u32, (BacnetAddress, u32)>>,
    apdu_timeout_ms: u64,
    apdu_retries: u32,
}

impl IpStack {
    pub fn new(config: &DriverConfig) -> Result<Self, DriverError> {
        let datalink = BacnetIpDataLink::new(config.bind_addr)
            .map_err(|e| DriverError::Resource(format!("datalink bind failed: {e}")))?;

        if let (Some(addr), Some(port)) = (&config.bbmd_address, config.bbmd_port) {
            debug!(bbmd_address = %addr, bbmd_port = port, "registering as a foreign device");
        }

        Ok(Self {
            datalink: Mutex::new(datalink),
            tsm: Tsm::new(),
            bindings: Mutex::new(HashMap::new()),
            apdu_timeout_ms: config.apdu_timeout_ms,
            apdu_retries: config.apdu_retries,
        })
    }

    fn send_unconfirmed(&self, service_choice: UnconfirmedServiceChoice, service_data: Vec<u8>, dest: &BacnetAddress) -> Result<(), DriverError> {
        let apdu = Apdu::UnconfirmedRequest {
            service_choice: service_choice as u8,
            service_data,
        };

        let mut npdu = Npdu::new();
        npdu.control.expecting_reply = false;
        npdu.control.priority = 0;

        let mut packet = npdu.encode();
        packet.extend_from_slice(&apdu.encode());

        let mut datalink = self.datalink.lock().expect("datalink mutex poisoned");
        let dl_addr = dest
            .to_datalink_address()
            .unwrap_or(DataLinkAddress::Broadcast);
        datalink
            .send_frame(&packet, &dl_addr)
            .map_err(|e| DriverError::Resource(format!("send failed: {e}")))
    }

    fn decode_incoming(&self, npdu_bytes: &[u8], source: DataLinkAddress) -> Option<(BacnetAddress, DecodedApdu)> {
        let source_addr = BacnetAddress::from_datalink_address(&source)?;

        let (_npdu, npdu_len) = Npdu::decode(npdu_bytes).ok()?;
        let apdu = Apdu::decode(&npdu_bytes[npdu_len..]).ok()?;

        let decoded = match apdu {
            Apdu::UnconfirmedRequest {
                service_choice,
                service_data,
            } if service_choice == UnconfirmedServiceChoice::IAm as u8 => {
                let iam = IAmRequest::decode(&service_data).ok()?;
                DecodedApdu::IAm {
                    device_id: iam.device_identifier.instance,
                    max_apdu: iam.max_apdu_length_accepted,
                    segmentation: iam.segmentation_supported,
                    vendor_id: iam.vendor_identifier,
                }
            }
            Apdu::ComplexAck {
                invoke_id,
                service_choice,
                service_data,
                ..
            } if service_choice == ConfirmedServiceChoice::ReadProperty as u8 => {
                let value = ReadPropertyResponse::decode(&service_data)
                    .ok()
                    .and_then(|ack| decode_property_value(&ack.property_value));
                DecodedApdu::ReadPropertyAck { invoke_id, value }
            }
            Apdu::SimpleAck {
                invoke_id,
                service_choice,
            } if service_choice == ConfirmedServiceChoice::WriteProperty as u8 => {
                DecodedApdu::WritePropertySimpleAck { invoke_id }
            }
            Apdu::Error {
                invoke_id,
                error_class,
                error_code,
                ..
            } => {
                self.tsm.mark_failed(invoke_id);
                DecodedApdu::Error {
                    invoke_id,
                    class_name: error_class_name(error_class),
                    code_name: error_code_name(error_code),
                }
            }
            Apdu::Abort { invoke_id, abort_reason, .. } => {
                self.tsm.mark_failed(invoke_id);
                DecodedApdu::Abort {
                    invoke_id,
                    reason_name: abort_reason_name(abort_reason),
                }
            }
            Apdu::Reject { invoke_id, reject_reason } => {
                self.tsm.mark_failed(invoke_id);
                DecodedApdu::Reject {
                    invoke_id,
                    reason_name: reject_reason_name(reject_reason),
                }
            }
            _ => DecodedApdu::Ignored,
        };

        Some((source_addr, decoded))
    }
}

impl BacnetStack for IpStack {
    fn receive(&self, _timeout: Duration) -> Result<Option<(BacnetAddress, DecodedApdu)>, DriverError> {
        let mut datalink = self.datalink.lock().expect("datalink mutex poisoned");
        match datalink.receive_frame() {
            Ok((npdu_bytes, source)) => {
                drop(datalink);
                Ok(self.decode_incoming(&npdu_bytes, source))
            }
            Err(_) => Ok(None),
        }
    }

    fn datalink_get_broadcast_address(&self) -> BacnetAddress {
        BacnetAddress {
            net: 0,
            mac: Vec::new(),
            adr: Vec::new(),
        }
    }

    fn cleanup(&self) {
        trace!("stack cleanup");
    }

    fn send_who_is(&self, min_id: Option<u32>, max_id: Option<u32>) -> Result<(), DriverError> {
        self.send_who_is_to_network(&self.datalink_get_broadcast_address(), min_id, max_id)
    }

    fn send_who_is_to_network(
        &self,
        dest: &BacnetAddress,
        min_id: Option<u32>,
        max_id: Option<u32>,
    ) -> Result<(), DriverError> {
        let whois = match (min_id, max_id) {
            (Some(low), Some(high)) if low == high => WhoIsRequest::for_device(low),
            _ => WhoIsRequest::new(),
        };
        let mut service_data = Vec::new();
        whois
            .encode(&mut service_data)
            .map_err(|e| DriverError::Resource(format!("who-is encode failed: {e}")))?;

        self.send_unconfirmed(UnconfirmedServiceChoice::WhoIs, service_data, dest)
    }

    fn send_read_property_request(
        &self,
        addr: &BacnetAddress,
        object_type: ObjectType,
        object_instance: u32,
        property_id: u32,
        _array_index: Option<u32>,
    ) -> Result<u8, DriverError> {
        let dest = addr
            .to_socket_addr()
            .ok_or_else(|| DriverError::Resource("target address is not IP-shaped".to_string()))?;

        let req = ReadPropertyRequest::new(
            bacnet_rs::object::ObjectIdentifier::new(object_type, object_instance),
            property_id,
        );
        let mut service_data = Vec::new();
        req.encode(&mut service_data)
            .map_err(|e| DriverError::Resource(format!("read-property encode failed: {e}")))?;

        let invoke_id = self
            .tsm
            .alloc(Duration::from_millis(self.apdu_timeout_ms * self.apdu_retries as u64))
            .ok_or_else(|| DriverError::Resource("no invoke-ids available".to_string()))?;

        let apdu = Apdu::ConfirmedRequest {
            segmented: false,
            more_follows: false,
            segmented_response_accepted: true,
            max_segments: MaxSegments::Unspecified,
            max_response_size: MaxApduSize::Up1476,
            invoke_id,
            sequence_number: None,
            proposed_window_size: None,
            service_choice: ConfirmedServiceChoice::ReadProperty as u8,
            service_data,
        };

        send_confirmed(&self.datalink, dest, &apdu)?;
        Ok(invoke_id)
    }

    fn send_write_property_request(
        &self,
        addr: &BacnetAddress,
        object_type: ObjectType,
        object_instance: u32,
        property_id: u32,
        _array_index: Option<u32>,
        priority: Option<u8>,
        value: PropertyValue,
    ) -> Result<u8, DriverError> {
        let dest = addr
            .to_socket_addr()
            .ok_or_else(|| DriverError::Resource("target address is not IP-shaped".to_string()))?;

        let mut req = WritePropertyRequest::new(
            bacnet_rs::object::ObjectIdentifier::new(object_type, object_instance),
            property_id,
            encode_property_value(&value),
        );
        req.priority = priority;

        let mut service_data = Vec::new();
        req.encode(&mut service_data)
            .map_err(|e| DriverError::Resource(format!("write-property encode failed: {e}")))?;

        let invoke_id = self
            .tsm
            .alloc(Duration::from_millis(self.apdu_timeout_ms * self.apdu_retries as u64))
            .ok_or_else(|| DriverError::Resource("no invoke-ids available".to_string()))?;

        let apdu = Apdu::ConfirmedRequest {
            segmented: false,
            more_follows: false,
            segmented_response_accepted: true,
            max_segments: MaxSegments::Unspecified,
            max_response_size: MaxApduSize::Up1476,
            invoke_id,
            sequence_number: None,
            proposed_window_size: None,
            service_choice: ConfirmedServiceChoice::WriteProperty as u8,
            service_data,
        };

        send_confirmed(&self.datalink, dest, &apdu)?;
        Ok(invoke_id)
    }

    fn address_bind_request(&self, device_instance: u32) -> Option<(BacnetAddress, u32)> {
        self.bindings
            .lock()
            .expect("bindings mutex poisoned")
            .get(&device_instance)
            .cloned()
    }

    fn address_add_binding(&self, device_instance: u32, max_apdu: u32, addr: BacnetAddress) {
        self.bindings
            .lock()
            .expect("bindings mutex poisoned")
            .insert(device_instance, (addr, max_apdu));
    }

    fn tsm_invoke_id_free(&self, invoke_id: u8) -> bool {
        self.tsm.invoke_id_free(invoke_id)
    }

    fn tsm_invoke_id_failed(&self, invoke_id: u8) -> bool {
        self.tsm.invoke_id_failed(invoke_id)
    }

    fn tsm_free_invoke_id(&self, invoke_id: u8) {
        self.tsm.free(invoke_id)
    }

    fn tsm_sweep_expired(&self) {
        self.tsm.sweep_expired();
    }

    fn apdu_timeout_ms(&self) -> u64 {
        self.apdu_timeout_ms
    }

    fn apdu_retries(&self) -> u32 {
        self.apdu_retries
    }
}

fn send_confirmed(datalink: &Mutex<BacnetIpDataLink>, dest: SocketAddr, apdu: &Apdu) -> Result<(), DriverError> {
    let mut npdu = Npdu::new();
    npdu.control.expecting_reply = true;
    npdu.control.priority = 0;

    let mut packet = npdu.encode();
    packet.extend_from_slice(&apdu.encode());

    datalink
        .lock()
        .expect("datalink mutex poisoned")
        .send_unicast_npdu(&packet, dest)
        .map_err(|e| DriverError::Resource(format!("send failed: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_address_has_zero_length_mac() {
        // datalink_get_broadcast_address must be a valid "suppress comparison"
        // address so find-and-bind/who-is can send through it.
        let addr = BacnetAddress {
            net: 0,
            mac: Vec::new(),
            adr: Vec::new(),
        };
        assert!(addr.is_placeholder());
    }
}

/// A scripted [`BacnetStack`] used by handler/operation/bind unit tests and
/// by the end-to-end scenario tests, standing in for a live socket. Not
/// gated behind `#[cfg(test)]` so integration tests under `tests/` — which
/// compile against this crate as an ordinary dependency — can reach it too.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::thread;

    pub struct MockStack {
        incoming: Mutex<VecDeque<(BacnetAddress, DecodedApdu)>>,
        bindings: Mutex<HashMap<u32, (BacnetAddress, u32)>>,
        tsm: Tsm,
        pub who_is_calls: Mutex<Vec<(Option<u32>, Option<u32>)>>,
        pub apdu_timeout_ms: u64,
        pub apdu_retries: u32,
    }

    impl MockStack {
        pub fn new() -> Self {
            Self {
                incoming: Mutex::new(VecDeque::new()),
                bindings: Mutex::new(HashMap::new()),
                tsm: Tsm::new(),
                who_is_calls: Mutex::new(Vec::new()),
                apdu_timeout_ms: 200,
                apdu_retries: 2,
            }
        }

        /// Queues an event the receiver loop will pick up on its next poll.
        pub fn inject(&self, source: BacnetAddress, decoded: DecodedApdu) {
            self.incoming.lock().expect("mock mutex poisoned").push_back((source, decoded));
        }

        pub fn seed_binding(&self, device_instance: u32, addr: BacnetAddress, max_apdu: u32) {
            self.bindings
                .lock()
                .expect("mock mutex poisoned")
                .insert(device_instance, (addr, max_apdu));
        }
    }

    impl Default for MockStack {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BacnetStack for MockStack {
        fn receive(&self, _timeout: Duration) -> Result<Option<(BacnetAddress, DecodedApdu)>, DriverError> {
            let next = self.incoming.lock().expect("mock mutex poisoned").pop_front();
            if next.is_none() {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(next)
        }

        fn datalink_get_broadcast_address(&self) -> BacnetAddress {
            BacnetAddress {
                net: 0,
                mac: Vec::new(),
                adr: Vec::new(),
            }
        }

        fn cleanup(&self) {}

        fn send_who_is(&self, min_id: Option<u32>, max_id: Option<u32>) -> Result<(), DriverError> {
            self.who_is_calls.lock().expect("mock mutex poisoned").push((min_id, max_id));
            Ok(())
        }

        fn send_who_is_to_network(
            &self,
            _dest: &BacnetAddress,
            min_id: Option<u32>,
            max_id: Option<u32>,
        ) -> Result<(), DriverError> {
            self.send_who_is(min_id, max_id)
        }

        fn send_read_property_request(
            &self,
            _addr: &BacnetAddress,
            _object_type: ObjectType,
            _object_instance: u32,
            _property_id: u32,
            _array_index: Option<u32>,
        ) -> Result<u8, DriverError> {
            self.tsm
                .alloc(Duration::from_millis(self.apdu_timeout_ms * self.apdu_retries as u64))
                .ok_or_else(|| DriverError::Resource("no invoke-ids available".to_string()))
        }

        fn send_write_property_request(
            &self,
            _addr: &BacnetAddress,
            _object_type: ObjectType,
            _object_instance: u32,
            _property_id: u32,
            _array_index: Option<u32>,
            _priority: Option<u8>,
            _value: PropertyValue,
        ) -> Result<u8, DriverError> {
            self.tsm
                .alloc(Duration::from_millis(self.apdu_timeout_ms * self.apdu_retries as u64))
                .ok_or_else(|| DriverError::Resource("no invoke-ids available".to_string()))
        }

        fn address_bind_request(&self, device_instance: u32) -> Option<(BacnetAddress, u32)> {
            self.bindings.lock().expect("mock mutex poisoned").get(&device_instance).cloned()
        }

        fn address_add_binding(&self, device_instance: u32, max_apdu: u32, addr: BacnetAddress) {
            self.bindings
                .lock()
                .expect("mock mutex poisoned")
                .insert(device_instance, (addr, max_apdu));
        }

        fn tsm_invoke_id_free(&self, invoke_id: u8) -> bool {
            self.tsm.invoke_id_free(invoke_id)
        }

        fn tsm_invoke_id_failed(&self, invoke_id: u8) -> bool {
            self.tsm.invoke_id_failed(invoke_id)
        }

        fn tsm_free_invoke_id(&self, invoke_id: u8) {
            self.tsm.free(invoke_id)
        }

        fn tsm_sweep_expired(&self) {
            self.tsm.sweep_expired();
        }

        fn apdu_timeout_ms(&self) -> u64 {
            self.apdu_timeout_ms
        }

        fn apdu_retries(&self) -> u32 {
            self.apdu_retries
        }
    }
}
