//! T3: the address-entry table, populated by every I-Am received for a
//! device that nobody is actively waiting on, and drained by discovery
//! (`who_is`) consumers.

use std::collections::VecDeque;

use std::sync::Mutex;

use crate::address::BacnetAddress;

#[derive(Debug, Clone)]
pub struct AddressEntry {
    pub device_id: u32,
    pub max_apdu: u32,
    pub address: BacnetAddress,
}

#[derive(Debug, Default)]
pub struct AddressEntryTable {
    records: Mutex<VecDeque<AddressEntry>>,
}

impl AddressEntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent prepend: if the current *head* matches `device_id` or
    /// `address`, the insert is silently dropped. This is a deliberate
    /// cheap shortcut from the original (a full-table scan would catch more
    /// duplicates) — kept as a contract, not tightened, since a test below
    /// pins the behavior of a non-head duplicate succeeding.
    pub fn set(&self, device_id: u32, max_apdu: u32, address: BacnetAddress) -> bool {
        let mut records = self.records.lock().expect("address entry table mutex poisoned");
        if let Some(head) = records.front() {
            if head.device_id == device_id || head.address.matches(&address) {
                return false;
            }
        }
        records.push_front(AddressEntry {
            device_id,
            max_apdu,
            address,
        });
        true
    }

    pub fn get(&self, device_id: u32) -> Option<AddressEntry> {
        self.records
            .lock()
            .expect("address entry table mutex poisoned")
            .iter()
            .find(|e| e.device_id == device_id)
            .cloned()
    }

    pub fn remove(&self, device_id: u32) {
        self.records
            .lock()
            .expect("address entry table mutex poisoned")
            .retain(|e| e.device_id != device_id);
    }

    /// Detach and return the head entry, for discovery consumers draining
    /// the table one device at a time.
    pub fn pop(&self) -> Option<AddressEntry> {
        self.records
            .lock()
            .expect("address entry table mutex poisoned")
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("address entry table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the whole table, head first, as `who_is` hands its result back
    /// to the caller.
    pub fn drain_all(&self) -> Vec<AddressEntry> {
        let mut out = Vec::new();
        while let Some(entry) = self.pop() {
            out.push(entry);
        }
        out
    }
}
