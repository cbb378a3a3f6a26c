//! # Submission
//!
//! Hand-off of recorded command buffers to the OS/kernel substrate.

use magma_core::Result;

use crate::buffer::CommandBuffer;

bitflags::bitflags! {
    /// Submission flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SubmitFlags: u32 {
        /// Buffers run on parallel pipes of one virtual engine
        const SCALABLE = 1 << 0;
        /// The set carries a context prolog
        const PROLOG = 1 << 1;
    }
}

/// OS-side submission of one frame's command buffers
///
/// `buffers[i]` is the stream for pipe `i`. Implementations submit the set
/// as a unit: either every pipe's buffer reaches the hardware or none does.
pub trait SubmitTarget {
    /// Submit the set, returning the fence value signalled on completion
    fn submit(&mut self, buffers: &[CommandBuffer], flags: SubmitFlags) -> Result<u64>;
}
