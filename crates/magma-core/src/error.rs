//! # MAGMA Error Handling
//!
//! Error type for command recording and submission.
//!
//! - Errors are typed and `Copy`, so they can be carried inside richer
//!   engine-level errors without allocation
//! - No panics in recording paths; invariant violations in the engine
//!   crates are assertions, not values of this type

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// MAGMA Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Command-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Object is not in a state that allows the operation
    InvalidState,
    /// Resource not found
    NotFound,
    /// Operation not supported by this engine
    NotSupported,
    /// Operation timed out
    Timeout,

    // =========================================================================
    // Hardware Errors
    // =========================================================================
    /// GPU hang detected (watchdog fired)
    GpuHang,
    /// GPU reported a fault while executing the buffer
    GpuFault,

    // =========================================================================
    // Command Recording/Submission Errors
    // =========================================================================
    /// Command buffer has no room for the method
    CommandBufferFull,
    /// Method or payload cannot be encoded
    InvalidCommand {
        /// Method offset that failed to encode
        method: u16,
    },
    /// Kernel submission failed
    SubmissionFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::NotFound => write!(f, "resource not found"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::Timeout => write!(f, "operation timed out"),

            // Hardware
            Self::GpuHang => write!(f, "GPU hang detected"),
            Self::GpuFault => write!(f, "GPU fault detected"),

            // Command
            Self::CommandBufferFull => write!(f, "command buffer full"),
            Self::InvalidCommand { method } => write!(f, "invalid command: method 0x{method:04x}"),
            Self::SubmissionFailed => write!(f, "submission failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_error_display() {
        let s = Error::InvalidCommand { method: 0x1a4 }.to_string();
        assert!(s.contains("0x01a4"));
        assert_eq!(Error::CommandBufferFull.to_string(), "command buffer full");
    }
}
