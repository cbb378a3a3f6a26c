//! # Push Buffer
//!
//! Method-stream encoding shared by every engine.
//!
//! Each instruction is one header dword followed by `count` payload dwords:
//!
//! ```text
//!  31   29 28            16 15   13 12                 0
//! ┌───────┬────────────────┬───────┬────────────────────┐
//! │opcode │     count      │ subch │  method (dword idx) │
//! └───────┴────────────────┴───────┴────────────────────┘
//! ```

use alloc::vec::Vec;

use magma_core::{Error, Result};

// =============================================================================
// HEADER ENCODING
// =============================================================================

/// Incrementing method (payload dword `n` targets `method + 4n`)
pub const OPCODE_INCR: u32 = 1;

/// Largest payload a single header can describe
pub const MAX_METHOD_COUNT: usize = 0x1FFF;

/// Largest encodable method byte offset
pub const MAX_METHOD_OFFSET: u16 = 0x7FFC;

/// Number of subchannels
pub const SUBCHANNEL_COUNT: u8 = 8;

/// Encode a method header
#[inline]
pub const fn header(opcode: u32, count: u16, subchannel: u8, method: u16) -> u32 {
    (opcode << 29)
        | (((count as u32) & 0x1FFF) << 16)
        | (((subchannel as u32) & 0x7) << 13)
        | (((method as u32) >> 2) & 0x1FFF)
}

// =============================================================================
// PUSH BUFFER
// =============================================================================

/// Bounded, append-only method stream
#[derive(Debug, Clone)]
pub struct PushBuffer {
    words: Vec<u32>,
    capacity: usize,
}

impl PushBuffer {
    /// Create a push buffer with room for `capacity` dwords
    pub fn new(capacity: usize) -> Self {
        Self {
            words: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Capacity in dwords
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dwords written so far
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// No dwords written yet
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Dwords still available
    pub fn remaining(&self) -> usize {
        self.capacity - self.words.len()
    }

    /// Push a method with a single payload dword
    pub fn push_single(&mut self, method: u16, subchannel: u8, data: u32) -> Result<()> {
        self.push_incr(method, subchannel, &[data])
    }

    /// Push an incrementing method with `data.len()` payload dwords
    pub fn push_incr(&mut self, method: u16, subchannel: u8, data: &[u32]) -> Result<()> {
        if method & 0x3 != 0
            || method > MAX_METHOD_OFFSET
            || subchannel >= SUBCHANNEL_COUNT
            || data.len() > MAX_METHOD_COUNT
        {
            return Err(Error::InvalidCommand { method });
        }
        if data.len() + 1 > self.remaining() {
            return Err(Error::CommandBufferFull);
        }

        self.words
            .push(header(OPCODE_INCR, data.len() as u16, subchannel, method));
        self.words.extend_from_slice(data);
        Ok(())
    }

    /// Raw encoded dwords
    pub fn as_words(&self) -> &[u32] {
        &self.words
    }

    /// Decode the stream back into methods
    pub fn stream(&self) -> PushStream<'_> {
        PushStream {
            words: &self.words,
            pos: 0,
        }
    }
}

// =============================================================================
// PUSH STREAM (DECODER)
// =============================================================================

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushEntry<'a> {
    /// Method byte offset
    pub method: u16,
    /// Subchannel the method was sent on
    pub subchannel: u8,
    /// Payload dwords
    pub data: &'a [u32],
}

/// Iterator over the instructions of an encoded stream
///
/// Stops at the first header whose payload runs past the end of the stream.
#[derive(Debug, Clone)]
pub struct PushStream<'a> {
    words: &'a [u32],
    pos: usize,
}

impl<'a> PushStream<'a> {
    /// Decode an arbitrary dword slice
    pub fn new(words: &'a [u32]) -> Self {
        Self { words, pos: 0 }
    }
}

impl<'a> Iterator for PushStream<'a> {
    type Item = PushEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let hdr = *self.words.get(self.pos)?;
        let count = ((hdr >> 16) & 0x1FFF) as usize;
        let start = self.pos + 1;
        let data = self.words.get(start..start + count)?;

        self.pos = start + count;
        Some(PushEntry {
            method: ((hdr & 0x1FFF) << 2) as u16,
            subchannel: ((hdr >> 13) & 0x7) as u8,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_decode() {
        let mut pb = PushBuffer::new(16);
        pb.push_single(0x0024, 0, 7).unwrap();
        pb.push_incr(0x0210, 1, &[1, 2, 3]).unwrap();
        pb.push_incr(0x0050, 0, &[]).unwrap();

        let entries: Vec<_> = pb.stream().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].method, 0x0024);
        assert_eq!(entries[0].data, &[7]);
        assert_eq!(entries[1].subchannel, 1);
        assert_eq!(entries[1].data, &[1, 2, 3]);
        assert!(entries[2].data.is_empty());
        assert_eq!(pb.len(), 2 + 4 + 1);
    }

    #[test]
    fn test_overflow_leaves_buffer_untouched() {
        let mut pb = PushBuffer::new(3);
        pb.push_single(0x0010, 0, 0).unwrap();
        assert_eq!(pb.push_single(0x0014, 0, 0), Err(Error::CommandBufferFull));
        assert_eq!(pb.len(), 2);
    }

    #[test]
    fn test_rejects_unaligned_method() {
        let mut pb = PushBuffer::new(8);
        assert_eq!(
            pb.push_single(0x0013, 0, 0),
            Err(Error::InvalidCommand { method: 0x0013 })
        );
        assert!(pb.is_empty());
    }

    #[test]
    fn test_truncated_stream_stops() {
        let words = [header(OPCODE_INCR, 4, 0, 0x0020), 1, 2];
        assert_eq!(PushStream::new(&words).count(), 0);
    }
}
