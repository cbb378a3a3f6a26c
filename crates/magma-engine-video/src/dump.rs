//! # Command Buffer Dump
//!
//! Optional side path that keeps finished per-pipe buffers for offline
//! inspection. Enabled by [`VideoEngineConfig::dump_enabled`]; a dump
//! failure is logged and never changes the submission's outcome.
//!
//! [`VideoEngineConfig::dump_enabled`]: crate::VideoEngineConfig::dump_enabled

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use magma_cmd::CommandBuffer;
use spin::Mutex;

/// Receiver of finished command buffers
pub trait DumpSink: Send + Sync {
    /// Persist `cmd`, recorded for `pipe` of frame `seq`
    fn dump(&self, seq: u64, pipe: u8, cmd: &CommandBuffer) -> magma_core::Result<()>;
}

/// One dumped buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    /// Frame sequence number
    pub seq: u64,
    /// Pipe the buffer was recorded for
    pub pipe: u8,
    /// Encoded dwords
    pub words: Vec<u32>,
}

/// In-memory sink keeping the last `depth` buffers
#[derive(Debug)]
pub struct RingDumpSink {
    depth: usize,
    records: Mutex<VecDeque<DumpRecord>>,
}

impl RingDumpSink {
    /// Sink keeping at most `depth` buffers
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            records: Mutex::new(VecDeque::with_capacity(depth)),
        }
    }

    /// Buffers currently held, oldest first
    pub fn records(&self) -> Vec<DumpRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Number of buffers held
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if nothing has been dumped
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DumpSink for RingDumpSink {
    fn dump(&self, seq: u64, pipe: u8, cmd: &CommandBuffer) -> magma_core::Result<()> {
        if self.depth == 0 {
            return Err(magma_core::Error::NotSupported);
        }
        let mut records = self.records.lock();
        while records.len() >= self.depth {
            records.pop_front();
        }
        records.push_back(DumpRecord {
            seq,
            pipe,
            words: cmd.as_words().to_vec(),
        });
        Ok(())
    }
}

static_assertions::assert_impl_all!(RingDumpSink: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use magma_cmd::Method;

    #[test]
    fn test_ring_keeps_latest() {
        let sink = RingDumpSink::new(2);
        let mut cmd = CommandBuffer::new(0);
        cmd.push(Method::FlushDw, &[0]).unwrap();
        for seq in 0..3 {
            sink.dump(seq, 0, &cmd).unwrap();
        }
        let held: Vec<u64> = sink.records().iter().map(|r| r.seq).collect();
        assert_eq!(held, [1, 2]);
        assert_eq!(sink.records()[0].words, cmd.as_words());
    }

    #[test]
    fn test_zero_depth_refuses() {
        let sink = RingDumpSink::new(0);
        let cmd = CommandBuffer::new(0);
        assert!(sink.dump(0, 0, &cmd).is_err());
        assert!(sink.is_empty());
    }
}
