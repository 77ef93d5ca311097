//! The driver: owns the four tables and the stack, spawns the receiver
//! thread, and is the type applications construct and hold onto.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use bacnet_rs::object::ObjectType;

use crate::codec::PropertyValue;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::operations::{self, DiscoveredDevice};
use crate::receiver;
use crate::stack::{BacnetStack, IpStack};
use crate::tables::{AddressEntryTable, AddressInstanceMap, DeviceWaitTable, TransactionTable};

/// Everything the receiver thread and the public operations share. Lives
/// behind an `Arc` so the receiver thread can outlive the call that spawned
/// it without borrowing from `Driver`.
pub struct DriverInner {
    pub(crate) stack: Box<dyn BacnetStack>,
    pub(crate) t1: TransactionTable,
    pub(crate) t2: DeviceWaitTable,
    pub(crate) t3: AddressEntryTable,
    pub(crate) t4: AddressInstanceMap,
    pub(crate) config: DriverConfig,
    pub(crate) stop: AtomicBool,
}

impl DriverInner {
    fn new(stack: Box<dyn BacnetStack>, config: DriverConfig) -> Self {
        Self {
            stack,
            t1: TransactionTable::new(),
            t2: DeviceWaitTable::new(),
            t3: AddressEntryTable::new(),
            t4: AddressInstanceMap::new(),
            config,
            stop: AtomicBool::new(false),
        }
    }

    /// Test-only constructor taking a pre-built stack (real or mock) so
    /// unit tests never touch a live socket.
    #[cfg(test)]
    pub fn new_for_test(stack: Box<dyn BacnetStack>, config: DriverConfig) -> Self {
        Self::new(stack, config)
    }
}

/// The public handle applications hold. Dropping it without calling
/// [`Driver::deinit`] leaks the receiver thread (it keeps running against a
/// now-unreachable `Arc<DriverInner>`); `deinit` is the documented shutdown
/// path.
pub struct Driver {
    inner: Arc<DriverInner>,
    receiver_handle: Option<JoinHandle<()>>,
}

impl Driver {
    /// Binds the datalink, then spawns the receiver thread. The thread is
    /// running and able to process incoming I-Ams before this call returns.
    pub fn init(config: DriverConfig) -> Result<Self, DriverError> {
        let stack = IpStack::new(&config)?;
        let inner = Arc::new(DriverInner::new(Box::new(stack), config));

        let receiver_inner = inner.clone();
        let handle = std::thread::spawn(move || receiver::run(receiver_inner));

        info!("BACnet driver initialized");
        Ok(Self {
            inner,
            receiver_handle: Some(handle),
        })
    }

    /// Runs the driver against a caller-supplied stack instead of a live
    /// socket. Not `#[cfg(test)]`-gated, matching `stack::mock`'s own
    /// visibility, so the crate's scenario tests under `tests/` — which
    /// compile against this crate as an ordinary dependency — can drive a
    /// shared `Arc<mock::MockStack>` while the receiver thread polls it.
    pub fn from_stack(stack: Box<dyn BacnetStack>, config: DriverConfig) -> Self {
        let inner = Arc::new(DriverInner::new(stack, config));

        let receiver_inner = inner.clone();
        let handle = std::thread::spawn(move || receiver::run(receiver_inner));

        Self {
            inner,
            receiver_handle: Some(handle),
        }
    }

    /// Signals the receiver thread to stop, joins it, and releases the
    /// datalink. Warns (rather than fails) if a table is non-empty at
    /// shutdown — every non-empty table at this point is a leaked
    /// in-flight request, never a reason to abort the shutdown itself.
    pub fn deinit(mut self) {
        self.inner.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.receiver_handle.take() {
            let _ = handle.join();
        }

        if !self.inner.t1.is_empty() || !self.inner.t2.is_empty() || !self.inner.t3.is_empty() {
            warn!(
                t1 = self.inner.t1.len(),
                t2 = self.inner.t2.len(),
                t3 = self.inner.t3.len(),
                "driver shutting down with non-empty tables"
            );
        }

        self.inner.stack.cleanup();
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    #[allow(clippy::too_many_arguments)]
    pub fn read_property(
        &self,
        device_instance: u32,
        object_type: ObjectType,
        object_instance: u32,
        property: u32,
        index: Option<u32>,
        port: Option<u16>,
    ) -> Option<PropertyValue> {
        operations::read_property(&self.inner, device_instance, object_type, object_instance, property, index, port)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_property(
        &self,
        device_instance: u32,
        object_type: ObjectType,
        object_instance: u32,
        property: u32,
        index: Option<u32>,
        port: Option<u16>,
        priority: Option<u8>,
        value: PropertyValue,
    ) -> Result<(), DriverError> {
        operations::write_property(
            &self.inner,
            device_instance,
            object_type,
            object_instance,
            property,
            index,
            port,
            priority,
            value,
        )
    }

    pub fn who_is(&self) -> Vec<DiscoveredDevice> {
        operations::who_is(&self.inner)
    }

    pub fn ip_to_instance(&self, ip: &str) -> Option<u32> {
        operations::ip_to_instance(&self.inner, ip)
    }
}
