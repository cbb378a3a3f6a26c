//! Fakes for the platform collaborators, shared by the unit tests.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use magma_cmd::{CommandBuffer, Method, SubmitFlags, SubmitTarget};
use magma_core::{BufferHandle, ByteSize, GpuAddr, SurfaceHandle};
use spin::Mutex;

use crate::config::{StatusLayout, VideoEngineConfig};
use crate::dump::RingDumpSink;
use crate::error::HookError;
use crate::feature::BasicFeature;
use crate::hooks::{Resource, ResourceSync, SubmissionHooks};
use crate::pipeline::{PacketPipeline, Platform};
use crate::scalability::PipeIdentity;

// =============================================================================
// FRAMES
// =============================================================================

/// Single-tile frame with a 64 KiB bitstream
pub fn feature(width: u32, height: u32) -> BasicFeature {
    BasicFeature::new(
        width,
        height,
        SurfaceHandle::new(0x10),
        GpuAddr::new(0x4000_0000),
        BufferHandle::new(0x20),
        GpuAddr::new(0x5000_0000),
        ByteSize::from_kib(64),
    )
}

/// Frame split into `cols` tile columns with a large enough stream-out
pub fn scalable_feature(width: u32, height: u32, cols: u16) -> BasicFeature {
    let mut f = feature(width, height);
    f.tile_cols = cols;
    f.stream_out = Some((GpuAddr::new(0x6000_0000), ByteSize::from_kib(1024)));
    f
}

// =============================================================================
// COMMAND INSPECTION
// =============================================================================

/// Destination address of a memory-writing method
pub fn write_target(method: Method, data: &[u32]) -> Option<GpuAddr> {
    match method {
        Method::StoreDataImm => Some(GpuAddr::from_dwords(data[0], data[1])),
        Method::StoreRegisterMem | Method::Atomic => Some(GpuAddr::from_dwords(data[1], data[2])),
        _ => None,
    }
}

/// Number of commands in `cmd` writing the status ring or global count
pub fn status_writes(cmd: &CommandBuffer, config: &VideoEngineConfig) -> usize {
    cmd.methods()
        .filter_map(|(m, d)| write_target(m, d))
        .filter(|addr| config.status.is_status_memory(*addr, config.max_frames_in_flight))
        .count()
}

/// Position of the first `method` in `cmd`
pub fn position(cmd: &CommandBuffer, method: Method) -> Option<usize> {
    cmd.method_ids().iter().position(|m| *m == method)
}

// =============================================================================
// RESOURCE SYNC
// =============================================================================

/// Records every sync request
#[derive(Debug, Default)]
pub struct RecordingSync {
    log: Arc<Mutex<Vec<(Resource, bool)>>>,
}

impl RecordingSync {
    /// Sync recorder sharing `log`
    pub fn new(log: Arc<Mutex<Vec<(Resource, bool)>>>) -> Self {
        Self { log }
    }
}

impl ResourceSync for RecordingSync {
    fn sync_on_resource(&mut self, resource: Resource, write: bool) -> magma_core::Result<()> {
        self.log.lock().push((resource, write));
        Ok(())
    }
}

// =============================================================================
// SUBMIT TARGET
// =============================================================================

/// What the capture target saw
#[derive(Debug, Default)]
pub struct Submitted {
    /// Buffer sets, one entry per submit call
    pub frames: Vec<Vec<CommandBuffer>>,
    /// Flags of each call
    pub flags: Vec<SubmitFlags>,
    /// Fail the next call
    pub fail_next: bool,
}

/// Shared view of a [`CaptureTarget`]
pub type TargetProbe = Arc<Mutex<Submitted>>;

/// Keeps every submitted buffer set
#[derive(Debug, Default)]
pub struct CaptureTarget {
    probe: TargetProbe,
}

impl CaptureTarget {
    /// Target recording into `probe`
    pub fn new(probe: TargetProbe) -> Self {
        Self { probe }
    }
}

impl SubmitTarget for CaptureTarget {
    fn submit(&mut self, buffers: &[CommandBuffer], flags: SubmitFlags) -> magma_core::Result<u64> {
        let mut seen = self.probe.lock();
        if core::mem::take(&mut seen.fail_next) {
            return Err(magma_core::Error::SubmissionFailed);
        }
        seen.frames.push(buffers.to_vec());
        seen.flags.push(flags);
        Ok(seen.frames.len() as u64)
    }
}

// =============================================================================
// HOOKS
// =============================================================================

#[derive(Debug, Default)]
struct HookState {
    pre: u32,
    post: u32,
    fail_pre: bool,
    fail_pipe: Option<u8>,
}

/// Shared hook call counters
#[derive(Debug, Clone, Default)]
pub struct HookProbe(Arc<Mutex<HookState>>);

impl HookProbe {
    /// `(pre, post)` call counts
    pub fn counts(&self) -> (u32, u32) {
        let state = self.0.lock();
        (state.pre, state.post)
    }

    /// Make every following pre-process hook fail
    pub fn fail_pre(&self) {
        self.0.lock().fail_pre = true;
    }

    /// Make the pre-process hook fail on `pipe` only
    pub fn fail_pre_on(&self, pipe: u8) {
        self.0.lock().fail_pipe = Some(pipe);
    }

    /// Let every hook call through again
    pub fn allow_all(&self) {
        let mut state = self.0.lock();
        state.fail_pre = false;
        state.fail_pipe = None;
    }
}

/// Counts hook calls
#[derive(Debug)]
pub struct RecordingHooks {
    probe: HookProbe,
}

impl RecordingHooks {
    /// Hooks reporting into `probe`
    pub fn new(probe: HookProbe) -> Self {
        Self { probe }
    }
}

impl SubmissionHooks for RecordingHooks {
    fn pre_process(&mut self, pipe: PipeIdentity, _cmd: &mut CommandBuffer) -> Result<(), HookError> {
        let mut state = self.probe.0.lock();
        state.pre += 1;
        if state.fail_pre || state.fail_pipe == Some(pipe.index()) {
            return Err(HookError::Rejected("test"));
        }
        Ok(())
    }

    fn post_process(&mut self, _pipe: PipeIdentity, _cmd: &mut CommandBuffer) -> Result<(), HookError> {
        self.probe.0.lock().post += 1;
        Ok(())
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Probes into a test session's collaborators
#[derive(Debug)]
pub struct Probes {
    /// Submitted buffer sets
    pub target: TargetProbe,
    /// Resource sync requests
    pub sync: Arc<Mutex<Vec<(Resource, bool)>>>,
    /// Hook counters
    pub hooks: HookProbe,
    /// Dumped buffers
    pub dump: Arc<RingDumpSink>,
}

/// Configuration for `pipes` pipes with a small status ring
pub fn config(pipes: u8) -> VideoEngineConfig {
    let slots = 4;
    VideoEngineConfig {
        max_frames_in_flight: slots,
        pipes,
        status: StatusLayout::packed(GpuAddr::new(0x0010_0000), slots),
        dump_enabled: true,
        ..VideoEngineConfig::default()
    }
}

/// Decode session over fakes
pub fn session(config: VideoEngineConfig) -> (PacketPipeline, Probes) {
    let probes = Probes {
        target: TargetProbe::default(),
        sync: Arc::default(),
        hooks: HookProbe::default(),
        dump: Arc::new(RingDumpSink::new(16)),
    };
    let platform = Platform::new(
        &config,
        Box::new(RecordingSync::new(probes.sync.clone())),
        Box::new(CaptureTarget::new(probes.target.clone())),
    )
    .unwrap()
    .with_hooks(Box::new(RecordingHooks::new(probes.hooks.clone())))
    .with_dump(probes.dump.clone());

    let pipeline = PacketPipeline::decode(config, platform).unwrap();
    (pipeline, probes)
}
