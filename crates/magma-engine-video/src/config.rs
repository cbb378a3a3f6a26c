//! # Session Configuration
//!
//! Resolved once when a [`PacketPipeline`](crate::PacketPipeline) is built
//! and never changed afterwards.

use magma_core::GpuAddr;

use crate::error::ConfigError;
use crate::status::SLOT_RECORD_SIZE;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Hard cap on the status ring capacity
pub const MAX_FRAMES_IN_FLIGHT: usize = 64;

/// Hard cap on the number of hardware pipes
pub const MAX_PIPES: u8 = 8;

/// Smallest command buffer that can hold one pipe's frame stream
pub const MIN_COMMAND_BUFFER_DWORDS: usize = 256;

/// Stride between per-pipe unit-id diagnostics
pub const UNIT_ID_STRIDE: u64 = 8;

/// Stride between barrier semaphores of the same kind
pub const SEMAPHORE_STRIDE: u64 = 8;

// =============================================================================
// CODEC FUNCTION
// =============================================================================

/// Which fixed function the session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFunction {
    /// Bitstream decode
    Decode,
    /// Encode
    Encode,
}

// =============================================================================
// STATUS LAYOUT
// =============================================================================

/// GPU addresses of the hardware-shared status memory
///
/// Every pipe's stream references the same region. Only the leader pipe's
/// stream writes the ring and the global count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLayout {
    /// First slot record of the status ring
    pub ring_base: GpuAddr,
    /// Bytes between consecutive slot records
    pub slot_stride: u64,
    /// Global completion counter
    pub global_count: GpuAddr,
    /// Frame tracker stamped by the tracked prolog
    pub frame_tracker: GpuAddr,
    /// Semaphores of the all-pipes barrier
    pub sync_all: GpuAddr,
    /// Semaphores of the rendezvous barrier
    pub rendezvous: GpuAddr,
    /// Per-pipe unit identity diagnostics
    pub unit_id: GpuAddr,
}

impl StatusLayout {
    /// Layout with every region packed after `base`
    pub const fn packed(base: GpuAddr, slots: usize) -> Self {
        let ring_bytes = slots as u64 * SLOT_RECORD_SIZE;
        Self {
            ring_base: base,
            slot_stride: SLOT_RECORD_SIZE,
            global_count: base.offset(ring_bytes),
            frame_tracker: base.offset(ring_bytes + 0x40),
            sync_all: base.offset(ring_bytes + 0x80),
            rendezvous: base.offset(ring_bytes + 0x100),
            unit_id: base.offset(ring_bytes + 0x180),
        }
    }

    /// First byte of slot `index`'s record
    #[inline]
    pub const fn slot_addr(&self, index: usize) -> GpuAddr {
        self.ring_base.offset(index as u64 * self.slot_stride)
    }

    /// Diagnostic location of `pipe`'s unit identity
    #[inline]
    pub const fn unit_id_addr(&self, pipe: u8) -> GpuAddr {
        self.unit_id.offset(pipe as u64 * UNIT_ID_STRIDE)
    }

    /// Check if `addr` lies in the ring or the global count
    pub fn is_status_memory(&self, addr: GpuAddr, slots: usize) -> bool {
        let ring_end = self.slot_addr(slots);
        (addr >= self.ring_base && addr < ring_end) || addr == self.global_count
    }

    fn validate(&self, slots: usize) -> Result<(), ConfigError> {
        if self.ring_base.is_null() {
            return Err(ConfigError::StatusLayout("ring base is null"));
        }
        if self.slot_stride < SLOT_RECORD_SIZE {
            return Err(ConfigError::StatusLayout("slot stride smaller than a record"));
        }
        let shared = [
            self.global_count,
            self.frame_tracker,
            self.sync_all,
            self.rendezvous,
            self.unit_id,
        ];
        if shared.iter().any(|a| a.is_null()) {
            return Err(ConfigError::StatusLayout("null shared region"));
        }
        let ring_end = self.slot_addr(slots);
        if shared
            .iter()
            .any(|a| *a >= self.ring_base && *a < ring_end)
        {
            return Err(ConfigError::StatusLayout("shared region overlaps the ring"));
        }
        Ok(())
    }
}

// =============================================================================
// ENGINE CONFIGURATION
// =============================================================================

/// Video engine session configuration
#[derive(Debug, Clone)]
pub struct VideoEngineConfig {
    /// Status ring capacity (maximum frames in flight)
    pub max_frames_in_flight: usize,
    /// Hardware pipes used per frame
    pub pipes: u8,
    /// Fixed function driven by the session
    pub codec: CodecFunction,
    /// Timestamp ticks per millisecond (watchdog units)
    pub watchdog_ticks_per_ms: u32,
    /// Per-pipe command buffer size in dwords
    pub command_buffer_dwords: usize,
    /// Status memory layout
    pub status: StatusLayout,
    /// Hand every finished command buffer to the dump sink
    pub dump_enabled: bool,
}

impl Default for VideoEngineConfig {
    fn default() -> Self {
        let slots = 16;
        Self {
            max_frames_in_flight: slots,
            pipes: 1,
            codec: CodecFunction::Decode,
            watchdog_ticks_per_ms: 19_200,
            command_buffer_dwords: magma_cmd::buffer::DEFAULT_CAPACITY_DWORDS,
            status: StatusLayout::packed(GpuAddr::new(0x0010_0000), slots),
            dump_enabled: false,
        }
    }
}

impl VideoEngineConfig {
    /// Configuration for `pipes` parallel pipes
    pub fn scalable(pipes: u8) -> Self {
        Self {
            pipes,
            ..Self::default()
        }
    }

    /// Check every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames_in_flight == 0 || self.max_frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::FramesInFlight(self.max_frames_in_flight));
        }
        if self.pipes == 0 || self.pipes > MAX_PIPES {
            return Err(ConfigError::PipeCount(self.pipes));
        }
        if self.watchdog_ticks_per_ms == 0 {
            return Err(ConfigError::WatchdogFrequency);
        }
        if self.command_buffer_dwords < MIN_COMMAND_BUFFER_DWORDS {
            return Err(ConfigError::CommandBufferSize(self.command_buffer_dwords));
        }
        self.status.validate(self.max_frames_in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(VideoEngineConfig::default().validate(), Ok(()));
        assert_eq!(VideoEngineConfig::scalable(4).validate(), Ok(()));
    }

    #[test]
    fn test_pipe_count_bounds() {
        assert_eq!(
            VideoEngineConfig::scalable(0).validate(),
            Err(ConfigError::PipeCount(0))
        );
        assert_eq!(
            VideoEngineConfig::scalable(MAX_PIPES + 1).validate(),
            Err(ConfigError::PipeCount(MAX_PIPES + 1))
        );
    }

    #[test]
    fn test_ring_larger_than_layout_overlaps() {
        let config = VideoEngineConfig {
            max_frames_in_flight: 32,
            ..VideoEngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StatusLayout(_))
        ));
    }

    #[test]
    fn test_status_memory_classification() {
        let layout = StatusLayout::packed(GpuAddr::new(0x1000), 4);
        assert!(layout.is_status_memory(layout.slot_addr(3).offset(4), 4));
        assert!(layout.is_status_memory(layout.global_count, 4));
        assert!(!layout.is_status_memory(layout.rendezvous, 4));
        assert!(!layout.is_status_memory(layout.unit_id_addr(1), 4));
    }
}
