//! R: the single receiver thread. Polls the stack, dispatches whatever it
//! decodes to the service handlers, and sweeps expired TSM entries once per
//! iteration so a peer that never replies doesn't pin an invoke-id forever.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::driver::DriverInner;
use crate::handlers;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub fn run(inner: Arc<DriverInner>) {
    while !inner.stop.load(Ordering::Relaxed) {
        match inner.stack.receive(POLL_TIMEOUT) {
            Ok(Some((source, decoded))) => handlers::dispatch(&inner, source, decoded),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "receive failed"),
        }
        inner.stack.tsm_sweep_expired();
    }
}
