//! Error types for the displaced tracklet emulation.
//!
//! Only fatal conditions live here: configuration mismatches and
//! data-consistency defects. Capacity and inefficiency conditions (cycle
//! budget exhausted, full output memories, rejected parameters) are counted
//! in [`ProcessorStats`](crate::ProcessorStats) and never raised.

use thiserror::Error;

/// Errors raised by the tracklet processor and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackletError {
    /// Input label not understood by the processor
    #[error("{processor}: could not find input {label}")]
    UnknownInput { processor: String, label: String },

    /// Output label not understood by the processor (or not a target of its seed)
    #[error("{processor}: could not find output {label}")]
    UnknownOutput { processor: String, label: String },

    /// The label or memory was already wired
    #[error("{processor}: {label} already bound to {memory}")]
    AlreadyBound {
        processor: String,
        label: String,
        memory: String,
    },

    /// A required output was never wired before `execute`
    #[error("{processor}: no memory bound for output {label}")]
    MissingOutput { processor: String, label: String },

    /// Memory serves the wrong layer/disk or is of the wrong kind
    #[error("{processor}: memory {memory} cannot serve {label}: {reason}")]
    LayerMismatch {
        processor: String,
        label: String,
        memory: String,
        reason: String,
    },

    /// Bit-field widths disagree between collaborating components
    #[error("Width mismatch for {field}: expected {expected} bits, found {found}")]
    WidthMismatch {
        field: String,
        expected: u32,
        found: u32,
    },

    /// LUT addressed outside its configured key width
    #[error("LUT {table}: key {key} exceeds {key_bits}-bit domain")]
    LutKeyOutOfRange {
        table: String,
        key: u32,
        key_bits: u32,
    },

    /// Value does not fit its fixed-width word
    #[error("Value {value} does not fit in {nbits}-bit {kind} word")]
    WordOverflow {
        value: i64,
        nbits: u32,
        kind: &'static str,
    },

    /// Settings or construction arguments are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Handle does not refer to a memory in the registry
    #[error("Unknown memory handle: {0}")]
    UnknownMemory(String),

    /// A stub reference points outside its source memory
    #[error("Stub index {index} out of bounds for {memory} ({len} stubs)")]
    StubOutOfBounds {
        memory: String,
        index: usize,
        len: usize,
    },
}

impl TrackletError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for errors that indicate a geometry/configuration mismatch
    /// rather than an internal data-consistency defect.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            TrackletError::StubOutOfBounds { .. } | TrackletError::UnknownMemory(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TrackletError::LutKeyOutOfRange {
            table: "TP_L3L4L2A_inner".to_string(),
            key: 2048,
            key_bits: 11,
        };
        assert_eq!(
            err.to_string(),
            "LUT TP_L3L4L2A_inner: key 2048 exceeds 11-bit domain"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_data_consistency_classification() {
        let err = TrackletError::StubOutOfBounds {
            memory: "AS_L3PHIA".to_string(),
            index: 7,
            len: 3,
        };
        assert!(!err.is_configuration());
        assert!(TrackletError::config("zero units").is_configuration());
    }
}
