//! Error taxonomy for the marshalling layer

use crate::value::ArgumentKind;
use crate::vm::CallStatus;
use thiserror::Error;

/// Result type for marshalling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while moving values across the guest boundary
#[derive(Error, Debug)]
pub enum Error {
    /// Guest-reported type has no conversion rule
    #[error("no conversion rule for guest type code {type_code}")]
    BadType { type_code: i32 },

    /// Active or guest-reported type does not match the required one
    #[error("expected {expected}, got {actual}{}", .index.map(|i| format!(" (argument {i})")).unwrap_or_default())]
    UnexpectedType {
        expected: ArgumentKind,
        actual: ArgumentKind,
        /// 1-based stack index, when the mismatch was found on the guest stack
        index: Option<usize>,
    },

    /// Argument variant has no guest push rule
    #[error("value of kind {kind} cannot be pushed to the guest stack")]
    UnexpectedPushType { kind: ArgumentKind },

    /// Fewer live stack values than required
    #[error("stack out of range: {0}")]
    OutOfRange(String),

    /// Table keys are not a contiguous 1..N integer range
    #[error("table cannot be represented as a list")]
    CannotRepresentAsList,

    /// Guest protected call returned an error status
    #[error("guest call failed ({status}): {message}")]
    CallFailed { status: CallStatus, message: String },
}
