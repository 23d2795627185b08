//! Status code taxonomy.
//!
//! Every kernel operation resolves to exactly one signed status. Zero is
//! success; negative values fall into contiguous bands so callers can handle
//! whole families with a range check:
//!
//! - `-1..=-9`   parameter errors, one code per positional argument
//! - `-10..=-19` resource errors
//! - `-20..=-29` security violations
//! - `-30..=-39` high-level function errors
//! - `-40..=-49` data access errors
//! - `-50..=-59` enveloping errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric value reported for a successful operation.
pub const OK: i32 = 0;

/// Message returned for codes outside the table.
pub const UNKNOWN_STATUS_MESSAGE: &str = "Unknown error";

/// Canonical failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    Param1 = -1,
    Param2 = -2,
    Param3 = -3,
    Param4 = -4,
    Param5 = -5,
    Param6 = -6,
    Param7 = -7,
    Memory = -10,
    NotInited = -11,
    Inited = -12,
    NoSecure = -13,
    Random = -14,
    Failed = -15,
    NotAvail = -20,
    Permission = -21,
    WrongKey = -22,
    Incomplete = -23,
    Complete = -24,
    Timeout = -25,
    Invalid = -26,
    Signalled = -27,
    Overflow = -30,
    Underflow = -31,
    BadData = -32,
    Signature = -33,
    Open = -40,
    Read = -41,
    Write = -42,
    NotFound = -43,
    Duplicate = -44,
    EnvelopeResource = -50,
}

const ALL_CODES: [ErrorCode; 31] = [
    ErrorCode::Param1,
    ErrorCode::Param2,
    ErrorCode::Param3,
    ErrorCode::Param4,
    ErrorCode::Param5,
    ErrorCode::Param6,
    ErrorCode::Param7,
    ErrorCode::Memory,
    ErrorCode::NotInited,
    ErrorCode::Inited,
    ErrorCode::NoSecure,
    ErrorCode::Random,
    ErrorCode::Failed,
    ErrorCode::NotAvail,
    ErrorCode::Permission,
    ErrorCode::WrongKey,
    ErrorCode::Incomplete,
    ErrorCode::Complete,
    ErrorCode::Timeout,
    ErrorCode::Invalid,
    ErrorCode::Signalled,
    ErrorCode::Overflow,
    ErrorCode::Underflow,
    ErrorCode::BadData,
    ErrorCode::Signature,
    ErrorCode::Open,
    ErrorCode::Read,
    ErrorCode::Write,
    ErrorCode::NotFound,
    ErrorCode::Duplicate,
    ErrorCode::EnvelopeResource,
];

impl ErrorCode {
    /// Every defined code, most significant band first.
    pub fn all() -> &'static [ErrorCode] {
        &ALL_CODES
    }

    /// Raw signed status value.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Look up a raw status. Returns `None` for zero and for unknown values.
    pub fn from_raw(raw: i32) -> Option<Self> {
        ALL_CODES.iter().copied().find(|c| c.code() == raw)
    }

    /// Parameter error for the given 1-based argument position.
    ///
    /// Positions beyond seven collapse onto `Param7`.
    pub fn param(position: usize) -> Self {
        match position {
            0 | 1 => ErrorCode::Param1,
            2 => ErrorCode::Param2,
            3 => ErrorCode::Param3,
            4 => ErrorCode::Param4,
            5 => ErrorCode::Param5,
            6 => ErrorCode::Param6,
            _ => ErrorCode::Param7,
        }
    }

    /// 1-based argument position for parameter errors.
    pub fn param_position(self) -> Option<usize> {
        match self.class() {
            StatusClass::Parameter => Some((-self.code()) as usize),
            _ => None,
        }
    }

    pub fn class(self) -> StatusClass {
        StatusClass::of(self.code())
    }

    /// Fixed human-readable description.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Param1 => "Bad argument, parameter 1",
            ErrorCode::Param2 => "Bad argument, parameter 2",
            ErrorCode::Param3 => "Bad argument, parameter 3",
            ErrorCode::Param4 => "Bad argument, parameter 4",
            ErrorCode::Param5 => "Bad argument, parameter 5",
            ErrorCode::Param6 => "Bad argument, parameter 6",
            ErrorCode::Param7 => "Bad argument, parameter 7",
            ErrorCode::Memory => "Out of memory",
            ErrorCode::NotInited => "Data has not been initialised",
            ErrorCode::Inited => "Data has already been init'd",
            ErrorCode::NoSecure => "Opn.not avail.at requested sec.level",
            ErrorCode::Random => "No reliable random data available",
            ErrorCode::Failed => "Operation failed",
            ErrorCode::NotAvail => "This type of opn.not available",
            ErrorCode::Permission => "No permiss.to perform this operation",
            ErrorCode::WrongKey => "Incorrect key used to decrypt data",
            ErrorCode::Incomplete => "Operation incomplete/still in progress",
            ErrorCode::Complete => "Operation complete/can't continue",
            ErrorCode::Timeout => "Operation timed out before completion",
            ErrorCode::Invalid => "Invalid/inconsistent information",
            ErrorCode::Signalled => "Resource destroyed by extnl.event",
            ErrorCode::Overflow => "Resources/space exhausted",
            ErrorCode::Underflow => "Not enough data available",
            ErrorCode::BadData => "Bad/unrecognised data format",
            ErrorCode::Signature => "Signature/integrity check failed",
            ErrorCode::Open => "Cannot open object",
            ErrorCode::Read => "Cannot read item from object",
            ErrorCode::Write => "Cannot write item to object",
            ErrorCode::NotFound => "Requested item not found in object",
            ErrorCode::Duplicate => "Item already present in object",
            ErrorCode::EnvelopeResource => "Need resource to proceed",
        }
    }

    /// Symbolic name used in logs and by the CLI.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Param1 => "CRYPT_ERROR_PARAM1",
            ErrorCode::Param2 => "CRYPT_ERROR_PARAM2",
            ErrorCode::Param3 => "CRYPT_ERROR_PARAM3",
            ErrorCode::Param4 => "CRYPT_ERROR_PARAM4",
            ErrorCode::Param5 => "CRYPT_ERROR_PARAM5",
            ErrorCode::Param6 => "CRYPT_ERROR_PARAM6",
            ErrorCode::Param7 => "CRYPT_ERROR_PARAM7",
            ErrorCode::Memory => "CRYPT_ERROR_MEMORY",
            ErrorCode::NotInited => "CRYPT_ERROR_NOTINITED",
            ErrorCode::Inited => "CRYPT_ERROR_INITED",
            ErrorCode::NoSecure => "CRYPT_ERROR_NOSECURE",
            ErrorCode::Random => "CRYPT_ERROR_RANDOM",
            ErrorCode::Failed => "CRYPT_ERROR_FAILED",
            ErrorCode::NotAvail => "CRYPT_ERROR_NOTAVAIL",
            ErrorCode::Permission => "CRYPT_ERROR_PERMISSION",
            ErrorCode::WrongKey => "CRYPT_ERROR_WRONGKEY",
            ErrorCode::Incomplete => "CRYPT_ERROR_INCOMPLETE",
            ErrorCode::Complete => "CRYPT_ERROR_COMPLETE",
            ErrorCode::Timeout => "CRYPT_ERROR_TIMEOUT",
            ErrorCode::Invalid => "CRYPT_ERROR_INVALID",
            ErrorCode::Signalled => "CRYPT_ERROR_SIGNALLED",
            ErrorCode::Overflow => "CRYPT_ERROR_OVERFLOW",
            ErrorCode::Underflow => "CRYPT_ERROR_UNDERFLOW",
            ErrorCode::BadData => "CRYPT_ERROR_BADDATA",
            ErrorCode::Signature => "CRYPT_ERROR_SIGNATURE",
            ErrorCode::Open => "CRYPT_ERROR_OPEN",
            ErrorCode::Read => "CRYPT_ERROR_READ",
            ErrorCode::Write => "CRYPT_ERROR_WRITE",
            ErrorCode::NotFound => "CRYPT_ERROR_NOTFOUND",
            ErrorCode::Duplicate => "CRYPT_ERROR_DUPLICATE",
            ErrorCode::EnvelopeResource => "CRYPT_ENVELOPE_RESOURCE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Message for any raw status, including success and unknown values.
pub fn status_message(raw: i32) -> &'static str {
    if raw == OK {
        return "Operation succeeded";
    }
    ErrorCode::from_raw(raw)
        .map(ErrorCode::message)
        .unwrap_or(UNKNOWN_STATUS_MESSAGE)
}

/// Coarse family of a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusClass {
    Success,
    Parameter,
    Resource,
    Security,
    HighLevel,
    DataAccess,
    Envelope,
    /// Negative but outside every defined band, or positive.
    Unknown,
}

impl StatusClass {
    /// Classify a raw status by range alone.
    pub fn of(raw: i32) -> Self {
        match raw {
            0 => StatusClass::Success,
            -9..=-1 => StatusClass::Parameter,
            -19..=-10 => StatusClass::Resource,
            -29..=-20 => StatusClass::Security,
            -39..=-30 => StatusClass::HighLevel,
            -49..=-40 => StatusClass::DataAccess,
            -59..=-50 => StatusClass::Envelope,
            _ => StatusClass::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusClass::Success => "success",
            StatusClass::Parameter => "parameter error",
            StatusClass::Resource => "resource error",
            StatusClass::Security => "security violation",
            StatusClass::HighLevel => "high-level function error",
            StatusClass::DataAccess => "data access error",
            StatusClass::Envelope => "enveloping error",
            StatusClass::Unknown => "unknown",
        }
    }
}

/// Extended detail recorded alongside a failed attribute operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorType {
    #[default]
    None = 0,
    /// Attribute value is too small or too large.
    AttrSize = 1,
    /// Attribute value is invalid.
    AttrValue = 2,
    /// Required attribute is missing.
    AttrAbsent = 3,
    /// Non-permitted attribute is present.
    AttrPresent = 4,
    /// Attribute violates a constraint.
    Constraint = 5,
    /// Attribute violates a constraint imposed by the issuer.
    IssuerConstraint = 6,
}

impl ErrorType {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_codes() {
        assert_eq!(ErrorCode::Param1.code(), -1);
        assert_eq!(ErrorCode::Param7.code(), -7);
        assert_eq!(ErrorCode::Memory.code(), -10);
        assert_eq!(ErrorCode::Failed.code(), -15);
        assert_eq!(ErrorCode::Signalled.code(), -27);
        assert_eq!(ErrorCode::Signature.code(), -33);
        assert_eq!(ErrorCode::Duplicate.code(), -44);
        assert_eq!(ErrorCode::EnvelopeResource.code(), -50);
    }

    #[test]
    fn test_from_raw_round_trips_every_code() {
        for code in ErrorCode::all() {
            assert_eq!(ErrorCode::from_raw(code.code()), Some(*code));
        }
        assert_eq!(ErrorCode::from_raw(0), None);
        assert_eq!(ErrorCode::from_raw(-8), None);
        assert_eq!(ErrorCode::from_raw(-99), None);
    }

    #[test]
    fn test_messages() {
        assert_eq!(status_message(-1), "Bad argument, parameter 1");
        assert_eq!(status_message(-22), "Incorrect key used to decrypt data");
        assert_eq!(status_message(-50), "Need resource to proceed");
        assert_eq!(status_message(-1000), UNKNOWN_STATUS_MESSAGE);
        assert_eq!(status_message(-16), UNKNOWN_STATUS_MESSAGE);
    }

    #[test]
    fn test_param_positions() {
        assert_eq!(ErrorCode::param(1), ErrorCode::Param1);
        assert_eq!(ErrorCode::param(4), ErrorCode::Param4);
        assert_eq!(ErrorCode::param(12), ErrorCode::Param7);
        assert_eq!(ErrorCode::Param3.param_position(), Some(3));
        assert_eq!(ErrorCode::Timeout.param_position(), None);
    }

    #[test]
    fn test_classes() {
        assert_eq!(ErrorCode::Param5.class(), StatusClass::Parameter);
        assert_eq!(ErrorCode::Random.class(), StatusClass::Resource);
        assert_eq!(ErrorCode::WrongKey.class(), StatusClass::Security);
        assert_eq!(ErrorCode::BadData.class(), StatusClass::HighLevel);
        assert_eq!(ErrorCode::NotFound.class(), StatusClass::DataAccess);
        assert_eq!(ErrorCode::EnvelopeResource.class(), StatusClass::Envelope);
        assert_eq!(StatusClass::of(0), StatusClass::Success);
        assert_eq!(StatusClass::of(7), StatusClass::Unknown);
        assert_eq!(StatusClass::of(-60), StatusClass::Unknown);
    }

    proptest! {
        #[test]
        fn test_defined_codes_never_unknown(idx in 0usize..31) {
            let code = ErrorCode::all()[idx];
            prop_assert_ne!(code.class(), StatusClass::Unknown);
            prop_assert_ne!(status_message(code.code()), UNKNOWN_STATUS_MESSAGE);
        }

        #[test]
        fn test_class_is_a_pure_range_check(raw in -70i32..=0) {
            let class = StatusClass::of(raw);
            if let Some(code) = ErrorCode::from_raw(raw) {
                prop_assert_eq!(code.class(), class);
            }
            if raw < -59 {
                prop_assert_eq!(class, StatusClass::Unknown);
            }
        }
    }
}
