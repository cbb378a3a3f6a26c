//! # Packets
//!
//! A packet records one responsibility of a frame's submission into a
//! borrowed command buffer. Sub-packets are the reusable pieces a packet
//! looks up in the [`SubPacketRegistry`]; they are always told which pipe
//! they are recording for.

use magma_cmd::{CommandBuffer, CommandEmitter};

use crate::config::VideoEngineConfig;
use crate::error::{Result, ValidationError};
use crate::feature::BasicFeature;
use crate::hooks::{ResourceSync, SubmissionHooks};
use crate::registry::SubPacketRegistry;
use crate::scalability::{PipeIdentity, ScalabilityController};
use crate::status::StatusReportTracker;

/// Packet identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId(pub u16);

impl PacketId {
    /// Decode back-end packet
    pub const DECODE_BACK_END: Self = Self(1);
}

/// Which variant of its sequence a packet records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketPhase {
    /// The only pipe of the frame
    Single,
    /// Pipe 0 of several
    First,
    /// Neither first nor last
    Middle,
    /// Last pipe of several
    Last,
}

impl PacketPhase {
    /// Phase of the stream recorded for `pipe`
    pub const fn for_pipe(pipe: PipeIdentity) -> Self {
        if pipe.count() == 1 {
            Self::Single
        } else if pipe.index() == 0 {
            Self::First
        } else if pipe.index() + 1 == pipe.count() {
            Self::Last
        } else {
            Self::Middle
        }
    }
}

/// Everything a packet may touch while recording one pipe's stream
///
/// Built by the pipeline for one call and dropped right after it.
pub struct PacketContext<'a> {
    /// Frame parameters
    pub feature: &'a BasicFeature,
    /// Pipe being recorded
    pub identity: PipeIdentity,
    /// Instruction encoder
    pub emitter: &'a mut dyn CommandEmitter,
    /// Barrier provider
    pub scalability: &'a mut dyn ScalabilityController,
    /// Sub-packets of the pipeline
    pub registry: &'a mut SubPacketRegistry,
    /// Status report ring
    pub status: &'a mut StatusReportTracker,
    /// Platform pre/post hooks
    pub hooks: Option<&'a mut dyn SubmissionHooks>,
    /// Resource hazard tracking
    pub sync: &'a mut dyn ResourceSync,
    /// Session configuration
    pub config: &'a VideoEngineConfig,
    /// Sequence number of the frame
    pub seq: u64,
    /// This pipe's context has not seen a prolog yet
    pub prolog_required: bool,
}

impl core::fmt::Debug for PacketContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketContext")
            .field("identity", &self.identity)
            .field("seq", &self.seq)
            .field("prolog_required", &self.prolog_required)
            .finish_non_exhaustive()
    }
}

/// Unit of work run once per pipe per frame
pub trait Packet {
    /// Packet id
    fn id(&self) -> PacketId;

    /// Select the variant for the next [`submit`](Self::submit)
    fn set_phase(&mut self, phase: PacketPhase);

    /// Current phase
    fn phase(&self) -> PacketPhase;

    /// Record this packet's commands for `ctx.identity` into `cmd`
    fn submit(&mut self, ctx: &mut PacketContext<'_>, cmd: &mut CommandBuffer) -> Result<()>;
}

/// Picture-level sub-packet
pub trait PictureSubPacket {
    /// Select the variant for the next [`execute`](Self::execute)
    fn set_phase(&mut self, phase: PacketPhase);

    /// Check the frame can be recorded
    fn validate(
        &self,
        feature: &BasicFeature,
        pipe: PipeIdentity,
    ) -> core::result::Result<(), ValidationError>;

    /// Record picture-level commands
    fn execute(
        &mut self,
        feature: &BasicFeature,
        pipe: PipeIdentity,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> magma_core::Result<()>;
}

/// Tile-level sub-packet
pub trait TileSubPacket {
    /// Record the tiles assigned to `pipe`
    fn execute(
        &mut self,
        feature: &BasicFeature,
        pipe: PipeIdentity,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> magma_core::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_for_pipe() {
        let phase = |i, n| PacketPhase::for_pipe(PipeIdentity::new(i, n).unwrap());
        assert_eq!(phase(0, 1), PacketPhase::Single);
        assert_eq!(phase(0, 4), PacketPhase::First);
        assert_eq!(phase(2, 4), PacketPhase::Middle);
        assert_eq!(phase(3, 4), PacketPhase::Last);
        assert_eq!(phase(1, 2), PacketPhase::Last);
    }
}
