//! # Packet Pipeline
//!
//! Session-level orchestrator. One instance per codec session, reused for
//! every frame: [`PacketPipeline::submit`] records one command buffer per
//! pipe by running the active packets against it, and hands the whole set
//! to the [`SubmitTarget`] only once every pipe recorded cleanly.
//!
//! Nothing here waits on the hardware. A failed frame leaves no buffer
//! submitted and its status slot is reclaimed by the next attempt.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use magma_cmd::{CommandBuffer, CommandEmitter, MiEmitter, SubmitFlags, SubmitTarget};

use crate::backend::DecodeBackEnd;
use crate::config::VideoEngineConfig;
use crate::decode;
use crate::dump::DumpSink;
use crate::error::{ConfigError, DependencyError, Error, Result, ResultExt, Step};
use crate::feature::BasicFeature;
use crate::hooks::{ResourceSync, SubmissionHooks};
use crate::packet::{Packet, PacketContext, PacketId, PacketPhase};
use crate::registry::{PipelineId, RegistryBuilder, SubPacketRegistry};
use crate::scalability::{PipeIdentity, ScalabilityController, SemaphoreScalability};
use crate::status::{FrameStatus, SlotIndex, StatusRecord, StatusReportTracker};

// =============================================================================
// PLATFORM
// =============================================================================

/// External collaborators of a session
pub struct Platform {
    /// Instruction encoder
    pub emitter: Box<dyn CommandEmitter>,
    /// Pipe identity and barriers
    pub scalability: Box<dyn ScalabilityController>,
    /// Resource hazard tracking
    pub sync: Box<dyn ResourceSync>,
    /// OS submission substrate
    pub target: Box<dyn SubmitTarget>,
    /// Optional pre/post hooks
    pub hooks: Option<Box<dyn SubmissionHooks>>,
    /// Optional dump sink, used when `dump_enabled` is set
    pub dump: Option<Arc<dyn DumpSink>>,
}

impl Platform {
    /// MI emitter and semaphore barriers over `config`'s status layout
    pub fn new(
        config: &VideoEngineConfig,
        sync: Box<dyn ResourceSync>,
        target: Box<dyn SubmitTarget>,
    ) -> Result<Self> {
        let scalability = SemaphoreScalability::new(config.pipes, &config.status)
            .map_err(|_| Error::new(Step::Construct, ConfigError::PipeCount(config.pipes)))?;
        Ok(Self {
            emitter: Box::new(MiEmitter::new()),
            scalability: Box::new(scalability),
            sync,
            target,
            hooks: None,
            dump: None,
        })
    }

    /// Install pre/post hooks
    pub fn with_hooks(mut self, hooks: Box<dyn SubmissionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Install a dump sink
    pub fn with_dump(mut self, dump: Arc<dyn DumpSink>) -> Self {
        self.dump = Some(dump);
        self
    }
}

impl core::fmt::Debug for Platform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Platform")
            .field("pipes", &self.scalability.pipe_count())
            .field("hooks", &self.hooks.is_some())
            .field("dump", &self.dump.is_some())
            .finish_non_exhaustive()
    }
}

fn hooks_mut(hooks: &mut Option<Box<dyn SubmissionHooks>>) -> Option<&mut dyn SubmissionHooks> {
    match hooks {
        Some(h) => Some(h.as_mut()),
        None => None,
    }
}

// =============================================================================
// RECEIPT
// =============================================================================

/// Result of a frame handed to the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Frame sequence number
    pub seq: u64,
    /// Status slot the frame reports into
    pub slot: SlotIndex,
    /// Fence signalled when the frame completes
    pub fence: u64,
    /// Pipes the frame was recorded on
    pub pipes: u8,
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Per-session packet orchestrator
pub struct PacketPipeline {
    config: VideoEngineConfig,
    platform: Platform,
    registry: SubPacketRegistry,
    packets: Vec<Box<dyn Packet>>,
    active: Vec<PacketId>,
    status: StatusReportTracker,
    /// Bit `i` set once pipe `i`'s context has executed a prolog
    primed: u8,
}

impl PacketPipeline {
    /// Session running `packets`, all of them active
    pub fn new(
        config: VideoEngineConfig,
        platform: Platform,
        registry: SubPacketRegistry,
        packets: Vec<Box<dyn Packet>>,
    ) -> Result<Self> {
        config.validate().at_step(Step::Construct)?;
        let pipes = platform.scalability.pipe_count();
        if pipes != config.pipes {
            return Err(Error::new(Step::Construct, ConfigError::PipeCount(pipes)));
        }
        if packets.is_empty() {
            return Err(Error::new(Step::Construct, DependencyError::NoPackets));
        }

        let mut active = Vec::with_capacity(packets.len());
        for packet in &packets {
            let id = packet.id();
            if active.contains(&id) {
                return Err(Error::new(Step::Construct, DependencyError::DuplicatePacket(id)));
            }
            active.push(id);
        }

        let status = StatusReportTracker::new(config.status, config.max_frames_in_flight);
        log::debug!(
            "video pipeline {} ready: {} pipes, {} status slots, {} packets",
            registry.pipeline().raw(),
            pipes,
            status.capacity(),
            packets.len()
        );
        Ok(Self {
            config,
            platform,
            registry,
            packets,
            active,
            status,
            primed: 0,
        })
    }

    /// Decode session: decode sub-packets and the decode back-end
    pub fn decode(config: VideoEngineConfig, platform: Platform) -> Result<Self> {
        let mut builder = RegistryBuilder::new(PipelineId::next());
        decode::register_sub_packets(&mut builder).at_step(Step::Construct)?;
        let registry = builder.build();
        let backend = DecodeBackEnd::new(&registry)?;
        Self::new(config, platform, registry, alloc::vec![Box::new(backend) as Box<dyn Packet>])
    }

    /// Session configuration
    pub fn config(&self) -> &VideoEngineConfig {
        &self.config
    }

    /// Status report ring
    pub fn status(&self) -> &StatusReportTracker {
        &self.status
    }

    /// Sub-packet registry
    pub fn registry(&self) -> &SubPacketRegistry {
        &self.registry
    }

    /// Barrier provider
    pub fn scalability(&self) -> &dyn ScalabilityController {
        self.platform.scalability.as_ref()
    }

    /// Run packet `id` for the following frames
    pub fn activate(&mut self, id: PacketId) -> Result<()> {
        if !self.packets.iter().any(|p| p.id() == id) {
            return Err(Error::new(Step::Prepare, DependencyError::UnknownPacket(id)));
        }
        if !self.active.contains(&id) {
            self.active.push(id);
        }
        Ok(())
    }

    /// Stop running packet `id`; returns whether it was active
    pub fn deactivate(&mut self, id: PacketId) -> bool {
        let before = self.active.len();
        self.active.retain(|a| *a != id);
        self.active.len() != before
    }

    /// Record and submit one frame
    pub fn submit(&mut self, feature: &BasicFeature) -> Result<SubmitReceipt> {
        let result = self.record_and_submit(feature);
        if let Err(e) = &result {
            log::warn!("frame {} aborted: {}", self.status.next_seq(), e);
        }
        result
    }

    fn record_and_submit(&mut self, feature: &BasicFeature) -> Result<SubmitReceipt> {
        if self.active.is_empty() {
            return Err(Error::new(Step::Prepare, DependencyError::NoPackets));
        }

        let slot = self.status.begin_frame().at_step(Step::Prepare)?;
        let seq = self.status.seq(slot);
        let count = self.platform.scalability.pipe_count();
        self.platform.scalability.begin_frame(seq);

        let mut buffers = Vec::with_capacity(usize::from(count));
        let mut prolog = false;
        for index in 0..count {
            self.platform
                .scalability
                .activate_pipe(index)
                .at(Step::Prepare, index)?;
            let identity = PipeIdentity::new(index, count)
                .ok_or(magma_core::Error::InvalidParameter)
                .at(Step::Prepare, index)?;

            let mut cmd = CommandBuffer::with_capacity(index, self.config.command_buffer_dwords);
            let phase = PacketPhase::for_pipe(identity);
            let mut prolog_required = self.primed & (1 << index) == 0;
            prolog |= prolog_required;

            let active = &self.active;
            for packet in self.packets.iter_mut().filter(|p| active.contains(&p.id())) {
                packet.set_phase(phase);
                let mut ctx = PacketContext {
                    feature,
                    identity,
                    emitter: &mut *self.platform.emitter,
                    scalability: &mut *self.platform.scalability,
                    registry: &mut self.registry,
                    status: &mut self.status,
                    hooks: hooks_mut(&mut self.platform.hooks),
                    sync: &mut *self.platform.sync,
                    config: &self.config,
                    seq,
                    prolog_required,
                };
                packet.submit(&mut ctx, &mut cmd)?;
                prolog_required = false;
            }

            if !cmd.is_ended() {
                return Err(Error::on_pipe(
                    Step::Terminate,
                    index,
                    magma_core::Error::InvalidState,
                ));
            }
            log::trace!("pipe {} recorded {} bytes", index, cmd.size_bytes());
            self.dump(seq, &cmd);
            buffers.push(cmd);
        }

        if !self.status.is_finalized() {
            return Err(Error::new(
                Step::StatusFinalize,
                magma_core::Error::InvalidState,
            ));
        }

        let mut flags = SubmitFlags::empty();
        flags.set(SubmitFlags::SCALABLE, count > 1);
        flags.set(SubmitFlags::PROLOG, prolog);
        let fence = self
            .platform
            .target
            .submit(&buffers, flags)
            .at_step(Step::Submit)?;

        self.primed |= ((1u16 << count) - 1) as u8;
        self.status.commit_frame();

        log::debug!(
            "frame {} submitted on {} pipes (slot {}, fence {})",
            seq,
            count,
            slot.index(),
            fence
        );
        Ok(SubmitReceipt {
            seq,
            slot,
            fence,
            pipes: count,
        })
    }

    fn dump(&self, seq: u64, cmd: &CommandBuffer) {
        if !self.config.dump_enabled {
            return;
        }
        if let Some(sink) = &self.platform.dump {
            if let Err(e) = sink.dump(seq, cmd.pipe(), cmd) {
                log::error!("dump of frame {} pipe {} failed: {}", seq, cmd.pipe(), e);
            }
        }
    }

    /// Record the global completion count read back from status memory
    ///
    /// Returns the number of frames retired, freeing their slots.
    pub fn retire(&mut self, global_count: u32) -> u64 {
        self.status.retire(global_count)
    }

    /// Interpret a slot record read back for a submitted frame
    pub fn completion(&self, receipt: &SubmitReceipt, record: &StatusRecord) -> FrameStatus {
        self.status.completion(receipt.slot, receipt.seq, record)
    }
}

impl core::fmt::Debug for PacketPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketPipeline")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("active", &self.active)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
