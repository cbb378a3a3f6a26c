//! # Command Buffer
//!
//! One pipe's recorded command stream for one submission.

use alloc::vec::Vec;

use magma_core::{Error, Result};

use crate::methods::Method;
use crate::pushbuf::PushBuffer;

/// Default command buffer size in dwords (64 KiB)
pub const DEFAULT_CAPACITY_DWORDS: usize = 16 * 1024;

// =============================================================================
// STATE
// =============================================================================

/// Recording state of a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Accepting commands
    Recording,
    /// Sealed by a batch-buffer-end
    Ended,
}

// =============================================================================
// COMMAND BUFFER
// =============================================================================

/// Append-only command stream owned by the caller of a submission
///
/// Packets borrow it for the duration of a call and never keep it.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    pb: PushBuffer,
    state: CommandBufferState,
    pipe: u8,
}

impl CommandBuffer {
    /// Create a buffer for `pipe` with the default capacity
    pub fn new(pipe: u8) -> Self {
        Self::with_capacity(pipe, DEFAULT_CAPACITY_DWORDS)
    }

    /// Create a buffer for `pipe` holding at most `dwords` dwords
    pub fn with_capacity(pipe: u8, dwords: usize) -> Self {
        Self {
            pb: PushBuffer::new(dwords),
            state: CommandBufferState::Recording,
            pipe,
        }
    }

    /// Pipe this buffer is recorded for
    pub fn pipe(&self) -> u8 {
        self.pipe
    }

    /// Recording state
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Check if the buffer has been sealed
    pub fn is_ended(&self) -> bool {
        self.state == CommandBufferState::Ended
    }

    /// Append one method
    pub fn push(&mut self, method: Method, data: &[u32]) -> Result<()> {
        if self.is_ended() {
            return Err(Error::InvalidState);
        }
        self.pb
            .push_incr(method.offset(), method.subchannel(), data)
            .inspect_err(|e| {
                if *e == Error::CommandBufferFull {
                    log::warn!(
                        "pipe {} command buffer full ({} dwords) at {:?}",
                        self.pipe,
                        self.pb.capacity(),
                        method
                    );
                }
            })
    }

    /// Append the end marker and seal the buffer
    pub fn seal(&mut self) -> Result<()> {
        self.push(Method::BatchBufferEnd, &[])?;
        self.state = CommandBufferState::Ended;
        Ok(())
    }

    /// Size in bytes
    pub fn size_bytes(&self) -> usize {
        self.pb.len() * 4
    }

    /// Encoded dwords
    pub fn as_words(&self) -> &[u32] {
        self.pb.as_words()
    }

    /// Decoded methods with their payloads, in recording order
    ///
    /// Methods outside the video engine table are skipped.
    pub fn methods(&self) -> impl Iterator<Item = (Method, &[u32])> + '_ {
        self.pb
            .stream()
            .filter_map(|e| Method::from_offset(e.subchannel, e.method).map(|m| (m, e.data)))
    }

    /// Decoded method ids, in recording order
    pub fn method_ids(&self) -> Vec<Method> {
        self.methods().map(|(m, _)| m).collect()
    }
}

static_assertions::assert_impl_all!(CommandBuffer: Send, Sync);
