//! # Video Engine Method Table
//!
//! Method offsets and MMIO registers of the video engine class. Subchannel 0
//! carries MI (command streamer) methods, subchannel 1 the codec pipe.

/// Subchannel for command-streamer methods
pub const SUBCH_MI: u8 = 0;
/// Subchannel for codec pipe methods
pub const SUBCH_VD: u8 = 1;

/// Video engine object class
pub const VIDEO_ENGINE_CLASS: u32 = 0xC7B0;

// =============================================================================
// METHODS
// =============================================================================

/// Every method an emitter or packet may record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Method {
    // MI
    /// Bind the engine class to the channel
    SetObject = 0x0000,
    /// Wake the engine power well before first access
    ForceWakeup = 0x0010,
    /// Context prolog (optionally stamping the frame tracker)
    Prolog = 0x0014,
    /// Load an MMIO register with an immediate
    LoadRegisterImm = 0x0020,
    /// Store an immediate dword to memory
    StoreDataImm = 0x0024,
    /// Store an MMIO register to memory
    StoreRegisterMem = 0x0028,
    /// Atomic memory operation
    Atomic = 0x002C,
    /// Wait on a memory semaphore
    SemaphoreWait = 0x0030,
    /// Set or clear command predication
    SetPredicate = 0x0034,
    /// Memory flush with optional cache invalidation
    FlushDw = 0x0038,
    /// VD control state (implicit flush, scalable pipe lock/unlock)
    VdControlState = 0x0040,
    /// End of the batch buffer
    BatchBufferEnd = 0x0050,

    // VD
    /// Codec pipeline flush with wait-done flags
    VdPipelineFlush = 0x0100,
    /// Codec mode and pipe topology
    PipeModeSelect = 0x0200,
    /// Surface layout of the destination/reference surfaces
    SurfaceState = 0x0204,
    /// Picture buffer addresses
    PipeBufAddrState = 0x0208,
    /// Indirect object (bitstream) base address
    IndObjBaseAddrState = 0x020C,
    /// Picture-level codec state
    PicState = 0x0210,
    /// Per-tile coding parameters
    TileCoding = 0x0220,
    /// Bitstream decode object (kicks the tile)
    BsdObject = 0x0224,
}

impl Method {
    /// Method byte offset
    #[inline]
    pub const fn offset(self) -> u16 {
        self as u16
    }

    /// Subchannel the method is sent on
    #[inline]
    pub const fn subchannel(self) -> u8 {
        if (self as u16) < 0x0100 {
            SUBCH_MI
        } else {
            SUBCH_VD
        }
    }

    /// Look a decoded method back up
    pub const fn from_offset(subchannel: u8, offset: u16) -> Option<Self> {
        let method = match offset {
            0x0000 => Self::SetObject,
            0x0010 => Self::ForceWakeup,
            0x0014 => Self::Prolog,
            0x0020 => Self::LoadRegisterImm,
            0x0024 => Self::StoreDataImm,
            0x0028 => Self::StoreRegisterMem,
            0x002C => Self::Atomic,
            0x0030 => Self::SemaphoreWait,
            0x0034 => Self::SetPredicate,
            0x0038 => Self::FlushDw,
            0x0040 => Self::VdControlState,
            0x0050 => Self::BatchBufferEnd,
            0x0100 => Self::VdPipelineFlush,
            0x0200 => Self::PipeModeSelect,
            0x0204 => Self::SurfaceState,
            0x0208 => Self::PipeBufAddrState,
            0x020C => Self::IndObjBaseAddrState,
            0x0210 => Self::PicState,
            0x0220 => Self::TileCoding,
            0x0224 => Self::BsdObject,
            _ => return None,
        };
        if method.subchannel() == subchannel {
            Some(method)
        } else {
            None
        }
    }

    /// Methods that write into status memory
    pub const fn writes_memory(self) -> bool {
        matches!(
            self,
            Self::StoreDataImm | Self::StoreRegisterMem | Self::Atomic
        )
    }
}

// =============================================================================
// REGISTERS
// =============================================================================

/// MMIO registers of one video engine unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Register {
    /// Watchdog control (bit 0 = enable)
    WatchdogCtrl = 0x0178,
    /// Watchdog threshold in timestamp ticks
    WatchdogThreshold = 0x017C,
    /// Identity of the unit executing this stream
    UnitId = 0x1C00,
    /// Codec engine status (error and hang bits)
    EngineStatus = 0x1C04,
    /// Codec engine error flags
    EngineErrorStatus = 0x1C08,
    /// Frame CRC / bytes consumed
    FrameCrc = 0x1C0C,
}

impl Register {
    /// Register offset
    #[inline]
    pub const fn offset(self) -> u32 {
        self as u32
    }
}

/// Value written to [`Register::WatchdogCtrl`] to arm the timer
pub const WATCHDOG_ENABLE: u32 = 0x1;
/// Value written to [`Register::WatchdogCtrl`] to stop the timer
pub const WATCHDOG_DISABLE: u32 = 0x0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_lookup_roundtrip_subchannel() {
        assert_eq!(Method::from_offset(SUBCH_MI, 0x0050), Some(Method::BatchBufferEnd));
        assert_eq!(Method::from_offset(SUBCH_VD, 0x0224), Some(Method::BsdObject));
        assert_eq!(Method::from_offset(SUBCH_VD, 0x0050), None);
        assert_eq!(Method::from_offset(SUBCH_MI, 0x0ffc), None);
    }

    #[test]
    fn test_memory_writers() {
        assert!(Method::StoreDataImm.writes_memory());
        assert!(Method::Atomic.writes_memory());
        assert!(!Method::SemaphoreWait.writes_memory());
        assert!(!Method::FlushDw.writes_memory());
    }
}
