//! The driver's error taxonomy (§7). Every failure path either returns one
//! of these to a caller, or is logged and dropped inside a handler — nothing
//! escapes the receiver loop.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("could not bind device {device_instance} to a datalink address")]
    BindFailed { device_instance: u32 },

    #[error("peer returned error: class={class_name} code={code_name}")]
    Protocol {
        class_name: &'static str,
        code_name: &'static str,
    },

    #[error("peer aborted: {reason_name}")]
    Aborted { reason_name: &'static str },

    #[error("peer rejected: {reason_name}")]
    Rejected { reason_name: &'static str },

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("could not decode the acknowledgement")]
    Decode,

    #[error("resource allocation failed: {0}")]
    Resource(String),
}
