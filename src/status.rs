// src/status.rs - OPC-UA status codes used by the alarm protocol
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subset of the OPC-UA status code table used by the Alarms & Conditions
/// protocol. Recoverable protocol outcomes are returned as values of this
/// type from method calls, never as Rust errors.
///
/// Numeric values are the on-wire codes from the OPC-UA status code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum StatusCode {
    /// Operation succeeded
    Good = 0x0000_0000,

    /// The value is uncertain but no specific reason is known
    Uncertain = 0x4000_0000,

    /// Generic failure
    Bad = 0x8000_0000,

    /// The requested node was not found
    BadNodeIdUnknown = 0x8034_0000,

    /// The supplied event id does not refer to a known event/branch
    BadEventIdUnknown = 0x809A_0000,

    /// The condition is already disabled
    BadConditionAlreadyDisabled = 0x8098_0000,

    /// The condition is disabled; the value is not meaningful
    BadConditionDisabled = 0x8099_0000,

    /// The condition is already enabled
    BadConditionAlreadyEnabled = 0x80CC_0000,

    /// The condition is already shelved (timed or one-shot)
    BadConditionAlreadyShelved = 0x80D1_0000,

    /// The condition is not shelved
    BadConditionNotShelved = 0x80D2_0000,

    /// The requested shelving time is outside the permitted range
    BadShelvingTimeOutOfRange = 0x80D3_0000,

    /// The state machine has no active state; currentState reads return this
    BadStateNotActive = 0x80BF_0000,

    /// The value supplied does not match the expected data type
    BadTypeMismatch = 0x8074_0000,
}

impl StatusCode {
    /// True for Good (severity bits clear).
    pub fn is_good(self) -> bool {
        (self as u32) & 0xC000_0000 == 0
    }

    /// True for any Bad_* code (top severity bit set).
    pub fn is_bad(self) -> bool {
        (self as u32) & 0x8000_0000 != 0
    }

    /// Raw numeric code as transmitted on the wire.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Symbolic name, matching the OPC-UA status code table.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Good => "Good",
            StatusCode::Uncertain => "Uncertain",
            StatusCode::Bad => "Bad",
            StatusCode::BadNodeIdUnknown => "BadNodeIdUnknown",
            StatusCode::BadEventIdUnknown => "BadEventIdUnknown",
            StatusCode::BadConditionAlreadyDisabled => "BadConditionAlreadyDisabled",
            StatusCode::BadConditionDisabled => "BadConditionDisabled",
            StatusCode::BadConditionAlreadyEnabled => "BadConditionAlreadyEnabled",
            StatusCode::BadConditionAlreadyShelved => "BadConditionAlreadyShelved",
            StatusCode::BadConditionNotShelved => "BadConditionNotShelved",
            StatusCode::BadShelvingTimeOutOfRange => "BadShelvingTimeOutOfRange",
            StatusCode::BadStateNotActive => "BadStateNotActive",
            StatusCode::BadTypeMismatch => "BadTypeMismatch",
        }
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.code())
    }
}
