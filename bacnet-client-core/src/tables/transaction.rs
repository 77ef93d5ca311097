//! T1: the pending-transaction table. Keyed by invoke-id, but lookups only
//! match non-zero invoke-ids — a record freshly created by an operation and
//! not yet handed an invoke-id by the stack is invisible to handlers until
//! the operation fills it in.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::address::BacnetAddress;
use crate::codec::PropertyValue;
use crate::error::DriverError;

/// Sentinel invoke-id meaning "broadcast Who-Is, no invoke-id expected" —
/// the record exists only so the broadcast wait has a condition to block on.
pub const BROADCAST_INVOKE_ID: u8 = u8::MAX;

/// The mutable state of a single pending request, guarded by the record's
/// own mutex (distinct from the table mutex — see module docs in
/// `tables/mod.rs`).
#[derive(Debug, Default)]
pub struct RecordState {
    pub invoke_id: u8,
    pub target_address: BacnetAddress,
    pub result: Option<PropertyValue>,
    /// Set by the Error/Abort/Reject handlers; the boolean ABI §6 exposes.
    pub error: bool,
    /// The specific error a handler observed, if any. Additive to `error` —
    /// public operations still branch on the bool, but `write_property`
    /// surfaces this detail to the caller instead of a generic failure.
    pub error_detail: Option<DriverError>,
}

/// A single transaction record: one caller thread waits on it, at most one
/// handler invocation signals it for the response case (any number may
/// signal defensively on a source mismatch).
#[derive(Debug)]
pub struct PendingRequest {
    state: Mutex<RecordState>,
    condvar: Condvar,
}

impl PendingRequest {
    fn new(invoke_id: u8) -> Self {
        Self {
            state: Mutex::new(RecordState {
                invoke_id,
                ..Default::default()
            }),
            condvar: Condvar::new(),
        }
    }

    /// Lock the record's state. Callers hold this guard across `Send_*_Request`
    /// and into the subsequent wait so that no signal can be missed between
    /// "we are about to wait" and "we are waiting" (§5 ordering guarantee).
    pub fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().expect("pending request mutex poisoned")
    }

    /// A single bounded cond-wait, matching the original's one-shot
    /// `pthread_cond_timedwait` call (no retry loop): the caller has already
    /// "armed" by locking and is woken either by a signal or by the deadline
    /// elapsing, then re-checks state without waiting again.
    pub fn wait_until<'a>(
        &self,
        guard: MutexGuard<'a, RecordState>,
        deadline: Instant,
    ) -> MutexGuard<'a, RecordState> {
        let now = Instant::now();
        let budget = deadline.saturating_duration_since(now);
        let (guard, _timed_out) = self
            .condvar
            .wait_timeout(guard, budget)
            .expect("pending request mutex poisoned");
        guard
    }

    pub fn signal(&self) {
        self.condvar.notify_all();
    }
}

/// The table itself: a mutation-ordered set of records, newest first,
/// matching the original's prepend-to-head linked list.
#[derive(Debug, Default)]
pub struct TransactionTable {
    records: Mutex<VecDeque<Arc<PendingRequest>>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always allocates a fresh record, even if one with the same (possibly
    /// zero) invoke-id already exists — multiple invoke-id-0 records may
    /// coexist briefly between creation and the stack assigning a real id.
    pub fn insert(&self, invoke_id: u8) -> Arc<PendingRequest> {
        let record = Arc::new(PendingRequest::new(invoke_id));
        self.records
            .lock()
            .expect("transaction table mutex poisoned")
            .push_front(record.clone());
        record
    }

    /// First record whose invoke-id is nonzero and equal to `invoke_id`.
    pub fn lookup(&self, invoke_id: u8) -> Option<Arc<PendingRequest>> {
        if invoke_id == 0 {
            return None;
        }
        let records = self.records.lock().expect("transaction table mutex poisoned");
        records
            .iter()
            .find(|r| {
                let state = r.lock();
                state.invoke_id != 0 && state.invoke_id == invoke_id
            })
            .cloned()
    }

    /// Detaches `record` from the table. Tolerates a record that is no
    /// longer present (double-remove is a no-op, not an error).
    pub fn remove(&self, record: &Arc<PendingRequest>) {
        let mut records = self.records.lock().expect("transaction table mutex poisoned");
        records.retain(|r| !Arc::ptr_eq(r, record));
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("transaction table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn apdu_deadline(apdu_timeout_ms: u64, apdu_retries: u32) -> Instant {
    Instant::now() + Duration::from_millis(apdu_timeout_ms.saturating_mul(apdu_retries as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_restores_empty_state() {
        let table = TransactionTable::new();
        assert!(table.is_empty());
        let record = table.insert(0);
        assert_eq!(table.len(), 1);
        table.remove(&record);
        assert!(table.is_empty());
    }

    #[test]
    fn multiple_zero_invoke_id_records_coexist() {
        let table = TransactionTable::new();
        let _a = table.insert(0);
        let _b = table.insert(0);
        assert_eq!(table.len(), 2);
        assert!(table.lookup(0).is_none());
    }

    #[test]
    fn lookup_finds_nonzero_invoke_id() {
        let table = TransactionTable::new();
        let record = table.insert(0);
        record.lock().invoke_id = 42;
        let found = table.lookup(42).expect("should find record");
        assert!(Arc::ptr_eq(&found, &record));
    }

    #[test]
    fn double_remove_is_a_no_op() {
        let table = TransactionTable::new();
        let record = table.insert(5);
        table.remove(&record);
        table.remove(&record);
        assert!(table.is_empty());
    }

    #[test]
    fn no_two_live_records_share_a_nonzero_invoke_id() {
        let table = TransactionTable::new();
        let a = table.insert(0);
        a.lock().invoke_id = 7;
        let b = table.insert(0);
        b.lock().invoke_id = 7;
        // Both may exist transiently (the table never refuses an insert),
        // but lookup must resolve to exactly one candidate deterministically.
        let found = table.lookup(7);
        assert!(found.is_some());
    }

    #[test]
    fn wait_until_returns_after_deadline_without_signal() {
        let table = TransactionTable::new();
        let record = table.insert(0);
        let guard = record.lock();
        let deadline = Instant::now() + Duration::from_millis(10);
        let guard = record.wait_until(guard, deadline);
        assert!(!guard.error);
        assert!(guard.result.is_none());
    }

    #[test]
    fn wait_until_wakes_on_signal() {
        use std::thread;

        let table = Arc::new(TransactionTable::new());
        let record = table.insert(0);
        record.lock().invoke_id = 1;

        let signal_record = record.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            let mut state = signal_record.lock();
            state.result = Some(PropertyValue::Real(42.5));
            drop(state);
            signal_record.signal();
        });

        let guard = record.lock();
        let deadline = Instant::now() + Duration::from_secs(2);
        let guard = record.wait_until(guard, deadline);
        assert_eq!(guard.result, Some(PropertyValue::Real(42.5)));
        handle.join().unwrap();
    }
}
