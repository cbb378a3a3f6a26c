//! # MAGMA Video Engine
//!
//! Packet/pipeline orchestration for the fixed-function video engines.
//!
//! One frame's work is split into packets. The [`PacketPipeline`] records
//! one command stream per hardware pipe, keeps the pipes in step with
//! barrier commands, and lets only the leader pipe stamp the frame's
//! status report.
//!
//! ## Submission Flow (per pipe)
//!
//! ```text
//!  pre-process hook ─▶ watchdog threshold ─▶ [prolog] ─▶ watchdog stop
//!        │
//!        ▼
//!  sync all pipes ─▶ validate picture ─▶ watchdog start
//!        │
//!        ▼
//!  [leader: status start] ─▶ picture sub-packet ─▶ tile sub-packet(pipe)
//!        │
//!        ▼
//!  memory flush ─▶ pipe unlock ─▶ read unit id ─▶ pipeline flush ─▶ flush
//!        │
//!        ▼
//!  rendezvous barrier ─▶ post-process hook
//!        │
//!        ├─ leader:   status end ─▶ global count update
//!        └─ follower: suppress-status predicate
//!        │
//!        ▼
//!  flush ─▶ batch buffer end
//! ```
//!
//! The host never waits on the hardware. Parallelism exists only on the
//! GPU, coordinated by the barrier commands recorded here.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod backend;
pub mod config;
pub mod decode;
pub mod dump;
pub mod error;
pub mod feature;
pub mod hooks;
pub mod packet;
pub mod pipeline;
pub mod registry;
pub mod scalability;
pub mod status;
pub mod watchdog;

#[cfg(test)]
mod testing;

// Re-exports
pub use backend::DecodeBackEnd;
pub use config::{CodecFunction, StatusLayout, VideoEngineConfig};
pub use dump::{DumpSink, RingDumpSink};
pub use error::{Error, ErrorKind, Result, Step};
pub use feature::BasicFeature;
pub use hooks::{HookGuard, Resource, ResourceSync, SubmissionHooks};
pub use packet::{Packet, PacketContext, PacketId, PacketPhase, PictureSubPacket, TileSubPacket};
pub use pipeline::{PacketPipeline, Platform, SubmitReceipt};
pub use registry::{LogicalId, PipelineId, RegistryBuilder, SubPacket, SubPacketKey, SubPacketRegistry};
pub use scalability::{Leader, PipeIdentity, PipeRole, ScalabilityController, SemaphoreScalability, SyncMode};
pub use status::{FrameStatus, ReportKind, SlotIndex, SlotState, StatusRecord, StatusReportTracker};
