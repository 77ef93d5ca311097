//! T4: memoizes the IP-address-string-to-device-instance mapping learned
//! from prior binds, so repeated `ip_to_instance` lookups for the same peer
//! skip a fresh Who-Is round trip.

use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct AddressInstanceMap {
    records: Mutex<VecDeque<(String, u32)>>,
}

impl AddressInstanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: &str) -> Option<u32> {
        self.records
            .lock()
            .expect("address instance map mutex poisoned")
            .iter()
            .find(|(k, _)| k == ip)
            .map(|(_, instance)| *instance)
    }

    /// Insertion-ordered: a repeated `set` for the same `ip` updates the
    /// existing entry in place rather than creating a second one, so the
    /// map never grows per lookup of an already-known peer.
    pub fn set(&self, ip: &str, instance: u32) {
        let mut records = self.records.lock().expect("address instance map mutex poisoned");
        if let Some(entry) = records.iter_mut().find(|(k, _)| k == ip) {
            entry.1 = instance;
            return;
        }
        records.push_back((ip.to_string(), instance));
    }

    pub fn remove(&self, ip: &str) {
        self.records
            .lock()
            .expect("address instance map mutex poisoned")
            .retain(|(k, _)| k != ip);
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("address instance map mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let map = AddressInstanceMap::new();
        map.set("10.0.0.5", 101);
        assert_eq!(map.get("10.0.0.5"), Some(101));
    }

    #[test]
    fn repeated_set_updates_in_place() {
        let map = AddressInstanceMap::new();
        map.set("10.0.0.5", 101);
        map.set("10.0.0.5", 202);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("10.0.0.5"), Some(202));
    }

    #[test]
    fn remove_then_get_misses() {
        let map = AddressInstanceMap::new();
        map.set("10.0.0.5", 101);
        map.remove("10.0.0.5");
        assert!(map.get("10.0.0.5").is_none());
    }

    #[test]
    fn unknown_ip_misses() {
        let map = AddressInstanceMap::new();
        assert!(map.get("10.0.0.9").is_none());
    }
}
