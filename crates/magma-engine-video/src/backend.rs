//! # Decode Back-End Packet
//!
//! Records the full per-pipe sequence of a decode frame. The order below
//! is a hardware contract; every pipe's stream follows it and diverges
//! only in its tiles and in the status finalization.
//!
//! ```text
//!  body (bracketed by the pre/post hooks)
//!    destination sync ─▶ watchdog threshold ─▶ [wake-up + tracked prolog]
//!    ─▶ watchdog stop ─▶ sync all pipes ─▶ validate ─▶ watchdog start
//!    ─▶ [leader: status start] ─▶ picture ─▶ tiles(pipe)
//!    ─▶ implicit flush ─▶ pipe unlock ─▶ unit id ─▶ pipeline flush ─▶ flush
//!    ─▶ rendezvous
//!  tail
//!    leader:   status end ─▶ global count update
//!    follower: suppress-status predicate
//!    ─▶ flush ─▶ batch buffer end ─▶ bitstream sync
//! ```

use magma_cmd::{
    CommandBuffer, FrameTag, MiFlushFlags, PipelineFlushFlags, PredicateMode, VdControlFlags,
};

use crate::error::{Result, ResultExt, Step};
use crate::hooks::{HookGuard, Resource};
use crate::packet::{Packet, PacketContext, PacketId, PacketPhase};
use crate::registry::{Capability, LogicalId, SubPacketKey, SubPacketRegistry};
use crate::scalability::{PipeRole, SyncMode};
use crate::status::{marker, ReportKind};
use crate::watchdog;

/// Barrier index of the start-of-frame sync
const SYNC_ALL_BARRIER: u32 = 0;
/// Barrier index of the end-of-frame rendezvous
const RENDEZVOUS_BARRIER: u32 = 0;

/// Packet recording the whole decode stream of one pipe
#[derive(Debug)]
pub struct DecodeBackEnd {
    phase: PacketPhase,
    picture: SubPacketKey,
    tile: SubPacketKey,
}

impl DecodeBackEnd {
    /// Resolve the decode sub-packets from `registry`
    ///
    /// A missing or mismatched sub-packet is a dependency error raised
    /// here, before any frame is recorded.
    pub fn new(registry: &SubPacketRegistry) -> Result<Self> {
        let picture = SubPacketKey::new(registry.pipeline(), LogicalId::PICTURE);
        let tile = SubPacketKey::new(registry.pipeline(), LogicalId::TILE);
        registry
            .require(picture, Capability::Picture)
            .and_then(|()| registry.require(tile, Capability::Tile))
            .at_step(Step::Construct)?;
        Ok(Self {
            phase: PacketPhase::Single,
            picture,
            tile,
        })
    }

    fn record_body(&mut self, ctx: &mut PacketContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let pipe = ctx.identity;
        let index = pipe.index();
        let feature = ctx.feature;

        ctx.sync
            .sync_on_resource(Resource::Surface(feature.dest_surface), true)
            .at(Step::ResourceSync, index)?;

        let threshold = watchdog::threshold(
            ctx.config.codec,
            feature.width,
            feature.height,
            ctx.config.watchdog_ticks_per_ms,
        );
        ctx.emitter.set_watchdog_threshold(threshold);

        if ctx.prolog_required {
            log::trace!("pipe {}: {}", index, Step::Prolog);
            let tag = FrameTag {
                addr: ctx.config.status.frame_tracker,
                value: marker(ctx.seq),
            };
            ctx.emitter
                .force_wakeup(cmd)
                .and_then(|()| ctx.emitter.prolog(cmd, Some(tag)))
                .at(Step::Prolog, index)?;
        }

        ctx.emitter
            .watchdog_stop(cmd)
            .at(Step::Watchdog, index)?;

        log::trace!("pipe {}: {}", index, Step::SyncAllPipes);
        ctx.scalability
            .sync_pipe(SyncMode::AllPipesWaitAll, SYNC_ALL_BARRIER, ctx.emitter, cmd)
            .at(Step::SyncAllPipes, index)?;

        let picture = ctx
            .registry
            .picture_mut(self.picture)
            .at(Step::Validate, index)?;
        picture.set_phase(self.phase);
        picture
            .validate(feature, pipe)
            .at(Step::Validate, index)?;

        ctx.emitter
            .watchdog_start(cmd)
            .at(Step::Watchdog, index)?;

        if let PipeRole::Leader(leader) = pipe.role() {
            ctx.status
                .start(&leader, ReportKind::Engine, ctx.emitter, cmd)
                .at(Step::StatusStart, index)?;
        }

        log::trace!("pipe {}: {}", index, Step::Picture);
        picture
            .execute(feature, pipe, ctx.emitter, cmd)
            .at(Step::Picture, index)?;

        log::trace!("pipe {}: {}", index, Step::Tile);
        ctx.registry
            .tile_mut(self.tile)
            .at(Step::Tile, index)?
            .execute(feature, pipe, ctx.emitter, cmd)
            .at(Step::Tile, index)?;

        log::trace!("pipe {}: {}", index, Step::FlushSequence);
        let emitter = &mut *ctx.emitter;
        emitter
            .vd_control_state(cmd, VdControlFlags::MEMORY_IMPLICIT_FLUSH)
            .and_then(|()| emitter.vd_control_state(cmd, VdControlFlags::SCALABLE_PIPE_UNLOCK))
            .and_then(|()| emitter.read_unit_identity(cmd, ctx.config.status.unit_id_addr(index)))
            .and_then(|()| {
                emitter.vd_pipeline_flush(
                    cmd,
                    PipelineFlushFlags::WAIT_DONE_CODEC
                        | PipelineFlushFlags::FLUSH_CODEC
                        | PipelineFlushFlags::WAIT_DONE_CMD_PARSER,
                )
            })
            .and_then(|()| emitter.mi_flush(cmd, MiFlushFlags::empty()))
            .at(Step::FlushSequence, index)?;

        log::trace!("pipe {}: {}", index, Step::Rendezvous);
        ctx.scalability
            .sync_pipe(
                SyncMode::OnePipeProceedsOthersWait,
                RENDEZVOUS_BARRIER,
                ctx.emitter,
                cmd,
            )
            .at(Step::Rendezvous, index)
    }

    fn record_tail(&mut self, ctx: &mut PacketContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let pipe = ctx.identity;
        let index = pipe.index();

        log::trace!("pipe {}: {}", index, Step::StatusFinalize);
        match pipe.role() {
            PipeRole::Leader(leader) => {
                ctx.status
                    .end(&leader, ReportKind::Engine, ctx.emitter, cmd)
                    .and_then(|()| {
                        ctx.status
                            .update(&leader, ReportKind::GlobalCount, ctx.emitter, cmd)
                    })
                    .at(Step::StatusFinalize, index)?;
            },
            PipeRole::Follower => {
                ctx.emitter
                    .set_predicate(cmd, PredicateMode::SuppressStatusWrites)
                    .at(Step::StatusFinalize, index)?;
            },
        }

        ctx.emitter
            .mi_flush(cmd, MiFlushFlags::empty())
            .and_then(|()| ctx.emitter.batch_buffer_end(cmd))
            .at(Step::Terminate, index)?;

        ctx.sync
            .sync_on_resource(Resource::Buffer(ctx.feature.data_buffer), false)
            .at(Step::ResourceSync, index)
    }
}

impl Packet for DecodeBackEnd {
    fn id(&self) -> PacketId {
        PacketId::DECODE_BACK_END
    }

    fn set_phase(&mut self, phase: PacketPhase) {
        self.phase = phase;
    }

    fn phase(&self) -> PacketPhase {
        self.phase
    }

    fn submit(&mut self, ctx: &mut PacketContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let pipe = ctx.identity;
        let mut guard = HookGuard::acquire(ctx.hooks.take(), pipe, cmd)
            .at(Step::PreProcess, pipe.index())?;
        self.record_body(ctx, &mut guard)?;
        guard
            .finish()
            .at(Step::PostProcess, pipe.index())?;
        self.record_tail(ctx, cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use crate::config::VideoEngineConfig;
    use crate::decode::{self, DecodePicturePacket};
    use crate::error::{DependencyError, ErrorKind, ValidationError};
    use crate::feature::BasicFeature;
    use crate::registry::{PipelineId, RegistryBuilder, SubPacket};
    use crate::scalability::{PipeIdentity, ScalabilityController, SemaphoreScalability};
    use crate::status::{SlotState, StatusReportTracker};
    use crate::testing::{self, RecordingSync};
    use magma_cmd::{CommandEmitter, Method, MiEmitter, WatchdogThreshold};

    struct Rig {
        config: VideoEngineConfig,
        emitter: MiEmitter,
        scalability: SemaphoreScalability,
        registry: SubPacketRegistry,
        status: StatusReportTracker,
        sync: RecordingSync,
    }

    impl Rig {
        fn new(pipes: u8) -> Self {
            let config = testing::config(pipes);
            let mut builder = RegistryBuilder::new(PipelineId::next());
            decode::register_sub_packets(&mut builder).unwrap();
            Self {
                scalability: SemaphoreScalability::new(pipes, &config.status).unwrap(),
                status: StatusReportTracker::new(config.status, config.max_frames_in_flight),
                registry: builder.build(),
                emitter: MiEmitter::new(),
                sync: RecordingSync::default(),
                config,
            }
        }

        fn run(&mut self, feature: &BasicFeature, identity: PipeIdentity) -> (Result<()>, CommandBuffer) {
            let mut backend = DecodeBackEnd::new(&self.registry).unwrap();
            backend.set_phase(PacketPhase::for_pipe(identity));
            self.scalability.activate_pipe(identity.index()).unwrap();
            let mut cmd = CommandBuffer::new(identity.index());
            let mut ctx = PacketContext {
                feature,
                identity,
                emitter: &mut self.emitter,
                scalability: &mut self.scalability,
                registry: &mut self.registry,
                status: &mut self.status,
                hooks: None,
                sync: &mut self.sync,
                config: &self.config,
                seq: 0,
                prolog_required: true,
            };
            let res = backend.submit(&mut ctx, &mut cmd);
            (res, cmd)
        }
    }

    #[test]
    fn test_validation_failure_stops_before_status_and_body() {
        let mut rig = Rig::new(1);
        let slot = rig.status.begin_frame().unwrap();
        let (res, cmd) = rig.run(&testing::feature(0, 0), PipeIdentity::SINGLE);

        let err = res.unwrap_err();
        assert_eq!(err.step(), Step::Validate);
        assert_eq!(
            err.kind(),
            ErrorKind::Validation(ValidationError::EmptyFrame { width: 0, height: 0 })
        );
        // Prolog and watchdog stop only.
        assert_eq!(
            cmd.method_ids(),
            [
                Method::ForceWakeup,
                Method::SetObject,
                Method::Prolog,
                Method::LoadRegisterImm,
            ]
        );
        assert!(!cmd.is_ended());
        assert_eq!(rig.status.state(slot), SlotState::NotStarted);
    }

    #[test]
    fn test_zero_frame_watchdog_is_deterministic() {
        let mut rig = Rig::new(1);
        rig.status.begin_frame().unwrap();
        let _ = rig.run(&testing::feature(0, 0), PipeIdentity::SINGLE);
        let first = rig.emitter.watchdog_threshold();
        let _ = rig.run(&testing::feature(0, 0), PipeIdentity::SINGLE);

        assert_eq!(first, rig.emitter.watchdog_threshold());
        assert_eq!(
            first,
            WatchdogThreshold(watchdog::DEFAULT_THRESHOLD_MS * rig.config.watchdog_ticks_per_ms)
        );
    }

    #[test]
    fn test_follower_tail_is_predicated_not_skipped() {
        let mut rig = Rig::new(4);
        rig.status.begin_frame().unwrap();
        let pipe = PipeIdentity::new(2, 4).unwrap();
        let (res, cmd) = rig.run(&testing::scalable_feature(1920, 1080, 4), pipe);
        res.unwrap();

        let ids = cmd.method_ids();
        assert_eq!(
            ids[ids.len() - 3..],
            [Method::SetPredicate, Method::FlushDw, Method::BatchBufferEnd]
        );
        assert_eq!(testing::status_writes(&cmd, &rig.config), 0);
        // The follower never touched the slot.
        assert_eq!(rig.status.state(rig.status.current().unwrap()), SlotState::NotStarted);
    }

    #[test]
    fn test_unit_identity_lands_in_pipe_diagnostics() {
        let mut rig = Rig::new(1);
        rig.status.begin_frame().unwrap();
        let (res, cmd) = rig.run(&testing::feature(1920, 1080), PipeIdentity::SINGLE);
        res.unwrap();

        let unit_id = rig.config.status.unit_id_addr(0);
        assert!(cmd
            .methods()
            .any(|(m, d)| testing::write_target(m, d) == Some(unit_id)));
        assert!(cmd.is_ended());
    }

    #[test]
    fn test_missing_tile_sub_packet_is_dependency_error() {
        let mut builder = RegistryBuilder::new(PipelineId::next());
        builder
            .register(
                LogicalId::PICTURE,
                SubPacket::Picture(Box::new(DecodePicturePacket::new())),
            )
            .unwrap();
        let registry = builder.build();

        let err = DecodeBackEnd::new(&registry).unwrap_err();
        let tile = SubPacketKey::new(registry.pipeline(), LogicalId::TILE);
        assert_eq!(
            err.kind(),
            ErrorKind::Dependency(DependencyError::MissingSubPacket(tile))
        );
        assert_eq!(err.step(), Step::Construct);
        assert!(err.is_fatal_for_session());
    }
}
