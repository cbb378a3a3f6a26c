//! # MAGMA Core
//!
//! Foundational types shared by the command recording and engine crates.
//!
//! This crate carries no hardware knowledge. It defines:
//! - the command-recording error type every emitter returns
//! - strong types for GPU addresses, sizes and resource handles
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      magma-core                             │
//! │  ┌──────────────────────────┐  ┌─────────────────────────┐  │
//! │  │         Types            │  │        Error            │  │
//! │  │ (GpuAddr, ByteSize,      │  │  (recording, submit,    │  │
//! │  │  Handle<T>)              │  │   hardware faults)      │  │
//! │  └──────────────────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(any(test, feature = "std"))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use types::*;
