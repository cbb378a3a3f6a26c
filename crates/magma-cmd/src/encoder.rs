//! # MI Command Encoder
//!
//! Encodes the [`CommandEmitter`] contract into video engine methods.

use magma_core::{Error, GpuAddr, Result};

use crate::buffer::CommandBuffer;
use crate::emitter::{
    AtomicOp, CommandEmitter, FrameTag, MiFlushFlags, PipelineFlushFlags, PredicateMode,
    SemaphoreCompare, VdControlFlags, WatchdogThreshold,
};
use crate::methods::{Method, Register, VIDEO_ENGINE_CLASS, WATCHDOG_DISABLE, WATCHDOG_ENABLE};

/// Prolog flag: stamp the frame tracker
const PROLOG_FRAME_TRACKING: u32 = 1 << 0;

// =============================================================================
// MI EMITTER
// =============================================================================

/// Emitter for the video engine command streamer
#[derive(Debug)]
pub struct MiEmitter {
    /// Engine class bound by the prolog
    class: u32,
    /// Threshold the next watchdog start loads
    watchdog: WatchdogThreshold,
}

impl MiEmitter {
    /// Emitter for the default video engine class
    pub fn new() -> Self {
        Self::with_class(VIDEO_ENGINE_CLASS)
    }

    /// Emitter for a specific engine class
    pub fn with_class(class: u32) -> Self {
        Self {
            class,
            watchdog: WatchdogThreshold::default(),
        }
    }

    /// Engine class
    pub fn class(&self) -> u32 {
        self.class
    }

    fn load_register(cmd: &mut CommandBuffer, reg: Register, value: u32) -> Result<()> {
        cmd.push(Method::LoadRegisterImm, &[reg.offset(), value])
    }
}

impl Default for MiEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandEmitter for MiEmitter {
    fn force_wakeup(&mut self, cmd: &mut CommandBuffer) -> Result<()> {
        cmd.push(Method::ForceWakeup, &[1])
    }

    fn prolog(&mut self, cmd: &mut CommandBuffer, frame_tracking: Option<FrameTag>) -> Result<()> {
        cmd.push(Method::SetObject, &[self.class])?;
        match frame_tracking {
            Some(tag) => cmd.push(
                Method::Prolog,
                &[PROLOG_FRAME_TRACKING, tag.addr.lo(), tag.addr.hi(), tag.value],
            ),
            None => cmd.push(Method::Prolog, &[0, 0, 0, 0]),
        }
    }

    fn set_watchdog_threshold(&mut self, threshold: WatchdogThreshold) {
        self.watchdog = threshold;
    }

    fn watchdog_threshold(&self) -> WatchdogThreshold {
        self.watchdog
    }

    fn watchdog_start(&mut self, cmd: &mut CommandBuffer) -> Result<()> {
        Self::load_register(cmd, Register::WatchdogThreshold, self.watchdog.0)?;
        Self::load_register(cmd, Register::WatchdogCtrl, WATCHDOG_ENABLE)
    }

    fn watchdog_stop(&mut self, cmd: &mut CommandBuffer) -> Result<()> {
        Self::load_register(cmd, Register::WatchdogCtrl, WATCHDOG_DISABLE)
    }

    fn mi_flush(&mut self, cmd: &mut CommandBuffer, flags: MiFlushFlags) -> Result<()> {
        cmd.push(Method::FlushDw, &[flags.bits()])
    }

    fn vd_control_state(&mut self, cmd: &mut CommandBuffer, flags: VdControlFlags) -> Result<()> {
        if flags.is_empty() {
            return Err(Error::InvalidParameter);
        }
        cmd.push(Method::VdControlState, &[flags.bits()])
    }

    fn vd_pipeline_flush(
        &mut self,
        cmd: &mut CommandBuffer,
        flags: PipelineFlushFlags,
    ) -> Result<()> {
        cmd.push(Method::VdPipelineFlush, &[flags.bits()])
    }

    fn read_unit_identity(&mut self, cmd: &mut CommandBuffer, dest: GpuAddr) -> Result<()> {
        self.store_register_mem(cmd, Register::UnitId, dest)
    }

    fn store_data_imm(&mut self, cmd: &mut CommandBuffer, addr: GpuAddr, value: u32) -> Result<()> {
        if addr.is_null() {
            return Err(Error::InvalidParameter);
        }
        cmd.push(Method::StoreDataImm, &[addr.lo(), addr.hi(), value])
    }

    fn store_register_mem(
        &mut self,
        cmd: &mut CommandBuffer,
        reg: Register,
        addr: GpuAddr,
    ) -> Result<()> {
        if addr.is_null() {
            return Err(Error::InvalidParameter);
        }
        cmd.push(Method::StoreRegisterMem, &[reg.offset(), addr.lo(), addr.hi()])
    }

    fn atomic(&mut self, cmd: &mut CommandBuffer, op: AtomicOp, addr: GpuAddr) -> Result<()> {
        if addr.is_null() {
            return Err(Error::InvalidParameter);
        }
        cmd.push(Method::Atomic, &[op as u32, addr.lo(), addr.hi()])
    }

    fn semaphore_wait(
        &mut self,
        cmd: &mut CommandBuffer,
        addr: GpuAddr,
        compare: SemaphoreCompare,
        value: u32,
    ) -> Result<()> {
        if addr.is_null() {
            return Err(Error::InvalidParameter);
        }
        cmd.push(
            Method::SemaphoreWait,
            &[compare as u32, value, addr.lo(), addr.hi()],
        )
    }

    fn set_predicate(&mut self, cmd: &mut CommandBuffer, mode: PredicateMode) -> Result<()> {
        cmd.push(Method::SetPredicate, &[mode as u32])
    }

    fn batch_buffer_end(&mut self, cmd: &mut CommandBuffer) -> Result<()> {
        cmd.seal()
    }

    fn append_instruction(
        &mut self,
        cmd: &mut CommandBuffer,
        method: Method,
        payload: &[u32],
    ) -> Result<()> {
        // The end marker only goes through batch_buffer_end, which seals.
        if method == Method::BatchBufferEnd {
            return Err(Error::InvalidCommand {
                method: method.offset(),
            });
        }
        cmd.push(method, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_watchdog_start_loads_threshold_then_enables() {
        let mut mi = MiEmitter::new();
        let mut cmd = CommandBuffer::new(0);
        mi.set_watchdog_threshold(WatchdogThreshold(1234));
        mi.watchdog_start(&mut cmd).unwrap();
        mi.watchdog_stop(&mut cmd).unwrap();

        let lri: Vec<_> = cmd.methods().map(|(_, d)| d.to_vec()).collect();
        assert_eq!(lri[0], [Register::WatchdogThreshold.offset(), 1234]);
        assert_eq!(lri[1], [Register::WatchdogCtrl.offset(), WATCHDOG_ENABLE]);
        assert_eq!(lri[2], [Register::WatchdogCtrl.offset(), WATCHDOG_DISABLE]);
    }

    #[test]
    fn test_tracked_prolog_carries_tag() {
        let mut mi = MiEmitter::new();
        let mut cmd = CommandBuffer::new(0);
        let tag = FrameTag {
            addr: GpuAddr::new(0x1_0000_0040),
            value: 9,
        };
        mi.prolog(&mut cmd, Some(tag)).unwrap();

        let (method, data) = cmd.methods().nth(1).unwrap();
        assert_eq!(method, Method::Prolog);
        assert_eq!(data, &[PROLOG_FRAME_TRACKING, 0x40, 0x1, 9]);
    }

    #[test]
    fn test_end_marker_only_via_batch_buffer_end() {
        let mut mi = MiEmitter::new();
        let mut cmd = CommandBuffer::new(0);
        assert!(mi
            .append_instruction(&mut cmd, Method::BatchBufferEnd, &[])
            .is_err());
        mi.batch_buffer_end(&mut cmd).unwrap();
        assert!(cmd.is_ended());
        assert_eq!(mi.mi_flush(&mut cmd, MiFlushFlags::empty()), Err(Error::InvalidState));
    }

    #[test]
    fn test_null_destination_rejected() {
        let mut mi = MiEmitter::new();
        let mut cmd = CommandBuffer::new(0);
        assert_eq!(
            mi.store_data_imm(&mut cmd, GpuAddr::null(), 1),
            Err(Error::InvalidParameter)
        );
        assert!(cmd.method_ids().is_empty());
    }
}
