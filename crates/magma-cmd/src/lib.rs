//! # MAGMA Command System
//!
//! Command buffers, the method table and the emitter contract used by the
//! video engine packets.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                    Command Recording Pipeline                     │
//! │                                                                   │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐    │
//! │  │   Packets    │    │   Command    │    │  Command Buffer  │    │
//! │  │ (engine crate│───▶│   Emitter    │───▶│  (Push Buffer)   │    │
//! │  │  callers)    │    │  (MiEmitter) │    │   one per pipe   │    │
//! │  └──────────────┘    └──────────────┘    └────────┬─────────┘    │
//! │                                                    │              │
//! │                                           ┌────────▼─────────┐    │
//! │                                           │  Submit Target   │    │
//! │                                           │  (OS substrate)  │    │
//! │                                           └──────────────────┘    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Recording Flow
//!
//! 1. A packet calls [`CommandEmitter`] methods with a borrowed buffer
//! 2. The emitter encodes each instruction as method header + payload
//! 3. `batch_buffer_end` seals the buffer
//! 4. The full set of per-pipe buffers is handed to a [`SubmitTarget`]

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod buffer;
pub mod emitter;
pub mod encoder;
pub mod methods;
pub mod pushbuf;
pub mod submit;

// Re-exports
pub use buffer::{CommandBuffer, CommandBufferState};
pub use emitter::{
    AtomicOp, CommandEmitter, FrameTag, MiFlushFlags, PipelineFlushFlags, PredicateMode,
    SemaphoreCompare, VdControlFlags, WatchdogThreshold,
};
pub use encoder::MiEmitter;
pub use methods::{Method, Register};
pub use pushbuf::{PushBuffer, PushStream};
pub use submit::{SubmitFlags, SubmitTarget};
