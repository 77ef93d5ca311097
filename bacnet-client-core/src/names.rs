//! Human-readable names for BACnet error classes/codes and abort/reject
//! reasons, used only for log messages (§7: "log content identifies the
//! BACnet error class, code, abort reason, or reject reason"). `bacnet-rs`
//! models `Apdu::Error`'s class/code as raw `u8`s and only gives reject and
//! abort reasons proper enums, so the class/code side is a small lookup
//! table covering the common standard values rather than the full registry.

pub fn error_class_name(class: u8) -> &'static str {
    match class {
        0 => "device",
        1 => "object",
        2 => "property",
        3 => "resources",
        4 => "security",
        5 => "services",
        6 => "vt",
        7 => "communication",
        _ => "unknown-class",
    }
}

pub fn error_code_name(code: u8) -> &'static str {
    match code {
        0 => "other",
        15 => "inconsistent-parameters",
        21 => "invalid-data-type",
        22 => "invalid-file-access-method",
        26 => "missing-required-parameter",
        28 => "no-space-to-write-property",
        31 => "not-configured",
        32 => "not-cov-subscribable",
        40 => "unknown-object",
        41 => "unknown-property",
        44 => "value-out-of-range",
        47 => "write-access-denied",
        _ => "unknown-code",
    }
}

pub fn abort_reason_name(reason: u8) -> &'static str {
    match reason {
        0 => "other",
        1 => "buffer-overflow",
        2 => "invalid-apdu-in-this-state",
        3 => "preempted-by-higher-priority-task",
        4 => "segmentation-not-supported",
        _ => "unknown-abort-reason",
    }
}

pub fn reject_reason_name(reason: u8) -> &'static str {
    match reason {
        0 => "other",
        1 => "buffer-overflow",
        2 => "inconsistent-parameters",
        3 => "invalid-parameter-datatype",
        4 => "invalid-tag",
        5 => "missing-required-parameter",
        6 => "parameter-out-of-range",
        7 => "too-many-arguments",
        8 => "undefined-enumeration",
        9 => "unrecognized-service",
        _ => "unknown-reject-reason",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve_to_names() {
        assert_eq!(error_class_name(2), "property");
        assert_eq!(error_code_name(47), "write-access-denied");
        assert_eq!(abort_reason_name(4), "segmentation-not-supported");
        assert_eq!(reject_reason_name(9), "unrecognized-service");
    }

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(error_class_name(200), "unknown-class");
        assert_eq!(error_code_name(250), "unknown-code");
    }
}
