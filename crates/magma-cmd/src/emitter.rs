//! # Command Emitter
//!
//! The instruction-level contract packets are written against. How each
//! instruction is laid out in the buffer is entirely the emitter's concern.

use magma_core::{GpuAddr, Result};

use crate::buffer::CommandBuffer;
use crate::methods::{Method, Register};

// =============================================================================
// PARAMETERS
// =============================================================================

bitflags::bitflags! {
    /// VD control state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VdControlFlags: u32 {
        /// Initialize the codec pipe
        const INITIALIZATION = 1 << 0;
        /// Flush codec memory writes implicitly
        const MEMORY_IMPLICIT_FLUSH = 1 << 1;
        /// Lock the pipe set for scalable mode
        const SCALABLE_PIPE_LOCK = 1 << 2;
        /// Release the pipe set after scalable work
        const SCALABLE_PIPE_UNLOCK = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Codec pipeline flush flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PipelineFlushFlags: u32 {
        /// Wait for the codec stage to go idle
        const WAIT_DONE_CODEC = 1 << 0;
        /// Flush the codec stage
        const FLUSH_CODEC = 1 << 1;
        /// Wait for the VD command parser
        const WAIT_DONE_CMD_PARSER = 1 << 2;
    }
}

bitflags::bitflags! {
    /// MI flush flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MiFlushFlags: u32 {
        /// Wait for pending memory writes to land
        const POST_SYNC = 1 << 1;
    }
}

/// Predication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PredicateMode {
    /// Following status-memory writes are no-ops on this engine
    SuppressStatusWrites = 1,
}

/// Atomic memory operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AtomicOp {
    /// `*addr += 1`
    Increment = 1,
}

/// Semaphore compare operation (`*addr OP value`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SemaphoreCompare {
    /// Proceed once the semaphore is at least the value
    GreaterOrEqual = 0,
}

/// Watchdog threshold in timestamp ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchdogThreshold(pub u32);

/// Tag stamped into the frame tracker by a tracked prolog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTag {
    /// Frame tracker location
    pub addr: GpuAddr,
    /// Value written there
    pub value: u32,
}

// =============================================================================
// EMITTER TRAIT
// =============================================================================

/// Appends hardware instructions into a borrowed command buffer
pub trait CommandEmitter {
    /// Wake the engine's power well
    fn force_wakeup(&mut self, cmd: &mut CommandBuffer) -> Result<()>;

    /// Context prolog, optionally stamping the frame tracker
    fn prolog(&mut self, cmd: &mut CommandBuffer, frame_tracking: Option<FrameTag>) -> Result<()>;

    /// Set the threshold used by the next [`watchdog_start`](Self::watchdog_start)
    fn set_watchdog_threshold(&mut self, threshold: WatchdogThreshold);

    /// Threshold the next watchdog start will load
    fn watchdog_threshold(&self) -> WatchdogThreshold;

    /// Load the threshold and arm the hardware watchdog
    fn watchdog_start(&mut self, cmd: &mut CommandBuffer) -> Result<()>;

    /// Stop the hardware watchdog
    fn watchdog_stop(&mut self, cmd: &mut CommandBuffer) -> Result<()>;

    /// Memory flush
    fn mi_flush(&mut self, cmd: &mut CommandBuffer, flags: MiFlushFlags) -> Result<()>;

    /// VD control state
    fn vd_control_state(&mut self, cmd: &mut CommandBuffer, flags: VdControlFlags) -> Result<()>;

    /// Codec pipeline flush
    fn vd_pipeline_flush(&mut self, cmd: &mut CommandBuffer, flags: PipelineFlushFlags)
        -> Result<()>;

    /// Record the identity of the unit executing this stream at `dest`
    fn read_unit_identity(&mut self, cmd: &mut CommandBuffer, dest: GpuAddr) -> Result<()>;

    /// Store an immediate
    fn store_data_imm(&mut self, cmd: &mut CommandBuffer, addr: GpuAddr, value: u32)
        -> Result<()>;

    /// Store a register
    fn store_register_mem(&mut self, cmd: &mut CommandBuffer, reg: Register, addr: GpuAddr)
        -> Result<()>;

    /// Atomic memory operation
    fn atomic(&mut self, cmd: &mut CommandBuffer, op: AtomicOp, addr: GpuAddr) -> Result<()>;

    /// Stall the stream until the semaphore condition holds
    fn semaphore_wait(
        &mut self,
        cmd: &mut CommandBuffer,
        addr: GpuAddr,
        compare: SemaphoreCompare,
        value: u32,
    ) -> Result<()>;

    /// Set command predication
    fn set_predicate(&mut self, cmd: &mut CommandBuffer, mode: PredicateMode) -> Result<()>;

    /// End the batch buffer and seal it
    fn batch_buffer_end(&mut self, cmd: &mut CommandBuffer) -> Result<()>;

    /// Append a codec instruction the emitter has no dedicated call for
    fn append_instruction(&mut self, cmd: &mut CommandBuffer, method: Method, payload: &[u32])
        -> Result<()>;
}
