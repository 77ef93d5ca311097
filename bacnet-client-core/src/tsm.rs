//! A hand-rolled transaction-state-machine invoke-id allocator. `bacnet-rs`
//! encodes and decodes APDUs but has no notion of "which invoke-ids are
//! currently in flight" — that bookkeeping belongs to the stack boundary,
//! not the wire codec, so it lives here rather than being imported.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::tables::transaction::BROADCAST_INVOKE_ID;

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    failed: bool,
}

/// Tracks which invoke-ids are currently allocated to an in-flight confirmed
/// request, so `find_and_bind` can ask "is this id still live, and did it
/// fail?" without the transaction table (which only knows about pending
/// *callers*, not about what the stack itself has sent).
#[derive(Debug)]
pub struct Tsm {
    next: AtomicU8,
    entries: Mutex<HashMap<u8, Entry>>,
}

impl Default for Tsm {
    fn default() -> Self {
        Self {
            next: AtomicU8::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Tsm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh invoke-id, skipping 0 (reserved for "not yet sent")
    /// and [`BROADCAST_INVOKE_ID`] (reserved for the Who-Is sentinel).
    /// Scans forward from the last-allocated id until a free slot is found;
    /// returns `None` only if every one of the 253 usable ids is in flight.
    pub fn alloc(&self, timeout: Duration) -> Option<u8> {
        let mut entries = self.entries.lock().expect("tsm mutex poisoned");
        for _ in 0..254 {
            let candidate = self.next.fetch_add(1, Ordering::Relaxed);
            if candidate == 0 || candidate == BROADCAST_INVOKE_ID {
                continue;
            }
            if entries.contains_key(&candidate) {
                continue;
            }
            entries.insert(
                candidate,
                Entry {
                    deadline: Instant::now() + timeout,
                    failed: false,
                },
            );
            return Some(candidate);
        }
        None
    }

    pub fn free(&self, invoke_id: u8) {
        self.entries.lock().expect("tsm mutex poisoned").remove(&invoke_id);
    }

    pub fn mark_failed(&self, invoke_id: u8) {
        if let Some(entry) = self.entries.lock().expect("tsm mutex poisoned").get_mut(&invoke_id) {
            entry.failed = true;
        }
    }

    /// `true` if no entry is tracked for `invoke_id` (never allocated,
    /// already freed, or swept as expired).
    pub fn invoke_id_free(&self, invoke_id: u8) -> bool {
        !self.entries.lock().expect("tsm mutex poisoned").contains_key(&invoke_id)
    }

    pub fn invoke_id_failed(&self, invoke_id: u8) -> bool {
        self.entries
            .lock()
            .expect("tsm mutex poisoned")
            .get(&invoke_id)
            .map(|e| e.failed)
            .unwrap_or(false)
    }

    /// Drops any entry past its deadline. Called once per receiver-loop
    /// iteration (§9 open question resolution) so an invoke-id whose
    /// find-and-bind caller gave up without explicitly freeing it does not
    /// leak forever.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("tsm mutex poisoned")
            .retain(|_, entry| entry.deadline > now);
    }

    pub fn in_flight_count(&self) -> usize {
        self.entries.lock().expect("tsm mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_never_returns_zero_or_broadcast_sentinel() {
        let tsm = Tsm::new();
        for _ in 0..10 {
            let id = tsm.alloc(Duration::from_secs(1)).unwrap();
            assert_ne!(id, 0);
            assert_ne!(id, BROADCAST_INVOKE_ID);
        }
    }

    #[test]
    fn free_makes_id_reusable_and_reported_free() {
        let tsm = Tsm::new();
        let id = tsm.alloc(Duration::from_secs(1)).unwrap();
        assert!(!tsm.invoke_id_free(id));
        tsm.free(id);
        assert!(tsm.invoke_id_free(id));
    }

    #[test]
    fn mark_failed_is_observable() {
        let tsm = Tsm::new();
        let id = tsm.alloc(Duration::from_secs(1)).unwrap();
        assert!(!tsm.invoke_id_failed(id));
        tsm.mark_failed(id);
        assert!(tsm.invoke_id_failed(id));
    }

    #[test]
    fn sweep_expired_frees_past_deadline_entries() {
        let tsm = Tsm::new();
        let id = tsm.alloc(Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        tsm.sweep_expired();
        assert!(tsm.invoke_id_free(id));
    }

    #[test]
    fn exhausting_all_ids_returns_none() {
        let tsm = Tsm::new();
        for _ in 0..253 {
            assert!(tsm.alloc(Duration::from_secs(60)).is_some());
        }
        assert!(tsm.alloc(Duration::from_secs(60)).is_none());
    }
}
