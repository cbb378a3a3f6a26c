//! # Status Report Tracker
//!
//! Ring of report slots, one per frame in flight. Each slot walks
//!
//! ```text
//!  NotStarted ──start──▶ Started ──end──▶ Ended ──update──▶ Updated
//! ```
//!
//! and every transition appends the commands that stamp the matching
//! marker into the slot's status memory. The tracker never blocks or
//! polls: the stamped memory is read back by a consumer once the
//! hardware reports completion, and fed back through
//! [`StatusReportTracker::retire`].
//!
//! ## Slot record
//!
//! ```text
//!  +0x00  start marker      seq + 1
//!  +0x04  end marker        seq + 1
//!  +0x08  engine status     register snapshot
//!  +0x0C  error status      register snapshot
//!  +0x10  frame CRC         register snapshot
//! ```
//!
//! Transitions are only reachable with a [`Leader`]. Calling them out of
//! order is a programming error and panics.

use arrayvec::ArrayVec;
use magma_cmd::{CommandBuffer, CommandEmitter, MiFlushFlags, Register};
use magma_core::{GpuAddr, Result};

use crate::config::{StatusLayout, MAX_FRAMES_IN_FLIGHT};
use crate::error::ErrorKind;
use crate::scalability::Leader;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Bytes reserved per slot record
pub const SLOT_RECORD_SIZE: u64 = 32;

const START_MARKER: u64 = 0x00;
const END_MARKER: u64 = 0x04;
const ENGINE_STATUS: u64 = 0x08;
const ERROR_STATUS: u64 = 0x0C;
const FRAME_CRC: u64 = 0x10;

/// Engine status bit set when the watchdog terminated the frame
pub const ENGINE_STATUS_HANG: u32 = 1 << 0;

// =============================================================================
// REPORT KINDS
// =============================================================================

/// Status report kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Engine status snapshot bracketed by start and end markers
    Engine,
    /// Session-wide completion counter
    GlobalCount,
}

bitflags::bitflags! {
    /// Set of report kinds
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReportKinds: u8 {
        /// [`ReportKind::Engine`]
        const ENGINE = 1 << 0;
        /// [`ReportKind::GlobalCount`]
        const GLOBAL_COUNT = 1 << 1;
    }
}

impl From<ReportKind> for ReportKinds {
    fn from(kind: ReportKind) -> Self {
        match kind {
            ReportKind::Engine => Self::ENGINE,
            ReportKind::GlobalCount => Self::GLOBAL_COUNT,
        }
    }
}

// =============================================================================
// SLOTS
// =============================================================================

/// Slot lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing recorded for this frame yet
    NotStarted,
    /// Start marker recorded
    Started,
    /// End marker and engine snapshot recorded
    Ended,
    /// Global count increment recorded
    Updated,
}

/// Position of a slot in the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Ring index
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct StatusSlot {
    seq: u64,
    state: SlotState,
    kinds: ReportKinds,
}

impl StatusSlot {
    const fn fresh(seq: u64) -> Self {
        Self {
            seq,
            state: SlotState::NotStarted,
            kinds: ReportKinds::empty(),
        }
    }
}

/// Marker value stamped for sequence number `seq` (never zero)
#[inline]
pub fn marker(seq: u64) -> u32 {
    (seq as u32).wrapping_add(1)
}

// =============================================================================
// TRACKER
// =============================================================================

/// Fixed-capacity ring of status report slots
#[derive(Debug)]
pub struct StatusReportTracker {
    layout: StatusLayout,
    capacity: usize,
    slots: ArrayVec<StatusSlot, MAX_FRAMES_IN_FLIGHT>,
    /// Frames handed to the hardware
    submitted: u64,
    /// Frames the hardware reported complete
    completed: u64,
    current: Option<SlotIndex>,
    open: ReportKinds,
}

impl StatusReportTracker {
    /// Tracker with `capacity` slots stamped into `layout`
    ///
    /// `capacity` is clamped to `1..=MAX_FRAMES_IN_FLIGHT`.
    pub fn new(layout: StatusLayout, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_FRAMES_IN_FLIGHT);
        let mut slots = ArrayVec::new();
        for _ in 0..capacity {
            slots.push(StatusSlot::fresh(0));
        }
        Self {
            layout,
            capacity,
            slots,
            submitted: 0,
            completed: 0,
            current: None,
            open: ReportKinds::empty(),
        }
    }

    /// Ring capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames handed to the hardware so far
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Frames the hardware reported complete
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Frames submitted but not yet complete
    pub fn in_flight(&self) -> u64 {
        self.submitted - self.completed
    }

    /// Sequence number the next frame will get
    pub fn next_seq(&self) -> u64 {
        self.submitted
    }

    /// Slot of the frame being recorded
    pub fn current(&self) -> Option<SlotIndex> {
        self.current
    }

    /// Lifecycle state of `slot`
    pub fn state(&self, slot: SlotIndex) -> SlotState {
        self.slots[slot.0].state
    }

    /// Sequence number of the frame occupying `slot`
    pub fn seq(&self, slot: SlotIndex) -> u64 {
        self.slots[slot.0].seq
    }

    /// Report kinds recorded for `slot`
    pub fn kinds(&self, slot: SlotIndex) -> ReportKinds {
        self.slots[slot.0].kinds
    }

    /// Status memory of `slot`
    pub fn slot_addr(&self, slot: SlotIndex) -> GpuAddr {
        self.layout.slot_addr(slot.0)
    }

    /// Claim the slot for the next frame
    ///
    /// Fails with [`ErrorKind::StatusRingFull`] while every slot holds a
    /// frame the hardware has not completed.
    pub fn begin_frame(&mut self) -> core::result::Result<SlotIndex, ErrorKind> {
        let in_flight = self.in_flight();
        if in_flight >= self.capacity as u64 {
            return Err(ErrorKind::StatusRingFull {
                in_flight: in_flight as u32,
            });
        }

        let seq = self.submitted;
        let index = SlotIndex((seq % self.capacity as u64) as usize);
        let slot = &mut self.slots[index.0];

        if slot.seq == seq && slot.state != SlotState::NotStarted {
            // Left behind by an aborted attempt at this frame.
            log::warn!(
                "status slot {} reset from {:?} (seq {})",
                index.0,
                slot.state,
                seq
            );
            self.open.remove(slot.kinds);
        } else {
            assert!(
                slot.state == SlotState::NotStarted || slot.state == SlotState::Updated,
                "status slot {} reused in state {:?}",
                index.0,
                slot.state
            );
        }
        *slot = StatusSlot::fresh(seq);
        self.current = Some(index);

        log::trace!("status slot {} claimed for seq {}", index.0, seq);
        Ok(index)
    }

    fn current_slot(&self) -> SlotIndex {
        match self.current {
            Some(slot) => slot,
            None => panic!("status report transition without a frame"),
        }
    }

    /// Record the start of `kind` for the current frame
    pub fn start(
        &mut self,
        _leader: &Leader,
        kind: ReportKind,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> Result<()> {
        let index = self.current_slot();
        let flag = ReportKinds::from(kind);
        let slot = self.slots[index.0];
        assert!(
            !self.open.contains(flag),
            "status {:?} started twice (slot {})",
            kind,
            index.0
        );
        assert!(
            slot.state == SlotState::NotStarted,
            "status start on slot {} in state {:?}",
            index.0,
            slot.state
        );

        let base = self.layout.slot_addr(index.0);
        emitter.store_data_imm(cmd, base.offset(START_MARKER), marker(slot.seq))?;

        let slot = &mut self.slots[index.0];
        slot.state = SlotState::Started;
        slot.kinds.insert(flag);
        self.open.insert(flag);
        log::trace!("status slot {} started ({:?})", index.0, kind);
        Ok(())
    }

    /// Record the end of `kind` for the current frame
    pub fn end(
        &mut self,
        _leader: &Leader,
        kind: ReportKind,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> Result<()> {
        let index = self.current_slot();
        let flag = ReportKinds::from(kind);
        let slot = self.slots[index.0];
        assert!(
            slot.state == SlotState::Started && slot.kinds.contains(flag),
            "status {:?} ended on slot {} in state {:?} without a start",
            kind,
            index.0,
            slot.state
        );

        let base = self.layout.slot_addr(index.0);
        emitter.store_register_mem(cmd, Register::EngineStatus, base.offset(ENGINE_STATUS))?;
        emitter.store_register_mem(cmd, Register::EngineErrorStatus, base.offset(ERROR_STATUS))?;
        emitter.store_register_mem(cmd, Register::FrameCrc, base.offset(FRAME_CRC))?;
        // Snapshots must land before the end marker.
        emitter.mi_flush(cmd, MiFlushFlags::POST_SYNC)?;
        emitter.store_data_imm(cmd, base.offset(END_MARKER), marker(slot.seq))?;

        self.slots[index.0].state = SlotState::Ended;
        self.open.remove(flag);
        log::trace!("status slot {} ended ({:?})", index.0, kind);
        Ok(())
    }

    /// Record the `kind` counter update for the current frame
    pub fn update(
        &mut self,
        _leader: &Leader,
        kind: ReportKind,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> Result<()> {
        let index = self.current_slot();
        let slot = self.slots[index.0];
        assert!(
            slot.state == SlotState::Ended,
            "status {:?} updated on slot {} in state {:?}",
            kind,
            index.0,
            slot.state
        );

        emitter.atomic(cmd, magma_cmd::AtomicOp::Increment, self.layout.global_count)?;

        let slot = &mut self.slots[index.0];
        slot.state = SlotState::Updated;
        slot.kinds.insert(ReportKinds::from(kind));
        log::trace!("status slot {} updated ({:?})", index.0, kind);
        Ok(())
    }

    /// Check if the current frame's slot went through its full lifecycle
    pub fn is_finalized(&self) -> bool {
        self.current
            .is_some_and(|slot| self.slots[slot.0].state == SlotState::Updated)
    }

    /// Account the current frame as handed to the hardware
    pub fn commit_frame(&mut self) {
        let index = self.current_slot();
        assert!(
            self.slots[index.0].state == SlotState::Updated,
            "status slot {} committed in state {:?}",
            index.0,
            self.slots[index.0].state
        );
        self.submitted += 1;
        self.current = None;
    }

    /// Record the global completion count read back from status memory
    ///
    /// Returns the number of frames newly retired.
    pub fn retire(&mut self, global_count: u32) -> u64 {
        // Counts are compared modulo 2^32, the width of the hardware counter.
        let behind = u64::from((self.submitted as u32).wrapping_sub(global_count));
        if behind > self.in_flight() {
            log::warn!(
                "stale global count {} (submitted {}, completed {})",
                global_count,
                self.submitted,
                self.completed
            );
            return 0;
        }
        let completed = self.submitted - behind;
        let retired = completed - self.completed;
        self.completed = completed;
        retired
    }

    /// Interpret `record` read back from `slot`'s status memory for frame `seq`
    ///
    /// Once a later frame has claimed the slot the record no longer
    /// describes `seq`, and the answer is [`FrameStatus::Superseded`].
    pub fn completion(&self, slot: SlotIndex, seq: u64, record: &StatusRecord) -> FrameStatus {
        if self.slots[slot.0].seq != seq {
            return FrameStatus::Superseded;
        }
        decode_record(record, seq)
    }
}

// =============================================================================
// COMPLETION
// =============================================================================

/// Raw slot record as read back from status memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRecord {
    /// Start marker
    pub start: u32,
    /// End marker
    pub end: u32,
    /// Engine status snapshot
    pub engine_status: u32,
    /// Error status snapshot
    pub error_status: u32,
    /// Frame CRC
    pub crc: u32,
}

impl StatusRecord {
    /// Parse the first dwords of a slot record
    pub fn from_words(words: &[u32]) -> Option<Self> {
        match *words {
            [start, end, engine_status, error_status, crc, ..] => Some(Self {
                start,
                end,
                engine_status,
                error_status,
                crc,
            }),
            _ => None,
        }
    }
}

/// Completion state of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The hardware has not finished the frame
    Pending,
    /// Frame decoded
    Complete {
        /// Frame CRC
        crc: u32,
    },
    /// Frame finished with an error
    Error(ErrorKind),
    /// The slot now belongs to a later frame
    Superseded,
}

/// Interpret `record` for the frame with sequence number `seq`
pub fn decode_record(record: &StatusRecord, seq: u64) -> FrameStatus {
    let expected = marker(seq);
    if record.start != expected || record.end != expected {
        return FrameStatus::Pending;
    }
    if record.engine_status & ENGINE_STATUS_HANG != 0 {
        return FrameStatus::Error(ErrorKind::HardwareTimeout);
    }
    if record.error_status != 0 {
        return FrameStatus::Error(ErrorKind::Command(magma_core::Error::GpuFault));
    }
    FrameStatus::Complete { crc: record.crc }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalability::{PipeIdentity, PipeRole};
    use magma_cmd::{Method, MiEmitter};

    fn leader() -> Leader {
        match PipeIdentity::SINGLE.role() {
            PipeRole::Leader(leader) => leader,
            PipeRole::Follower => unreachable!(),
        }
    }

    fn tracker(capacity: usize) -> StatusReportTracker {
        StatusReportTracker::new(StatusLayout::packed(GpuAddr::new(0x10_0000), capacity), capacity)
    }

    fn run_frame(t: &mut StatusReportTracker, mi: &mut MiEmitter) -> CommandBuffer {
        let l = leader();
        let mut cmd = CommandBuffer::new(0);
        t.begin_frame().unwrap();
        t.start(&l, ReportKind::Engine, mi, &mut cmd).unwrap();
        t.end(&l, ReportKind::Engine, mi, &mut cmd).unwrap();
        t.update(&l, ReportKind::GlobalCount, mi, &mut cmd).unwrap();
        t.commit_frame();
        cmd
    }

    #[test]
    fn test_lifecycle_emits_markers_in_order() {
        let mut t = tracker(4);
        let mut mi = MiEmitter::new();
        let cmd = run_frame(&mut t, &mut mi);

        assert_eq!(
            cmd.method_ids(),
            [
                Method::StoreDataImm,
                Method::StoreRegisterMem,
                Method::StoreRegisterMem,
                Method::StoreRegisterMem,
                Method::FlushDw,
                Method::StoreDataImm,
                Method::Atomic,
            ]
        );
        assert_eq!(t.state(SlotIndex(0)), SlotState::Updated);
        assert_eq!(
            t.kinds(SlotIndex(0)),
            ReportKinds::ENGINE | ReportKinds::GLOBAL_COUNT
        );
        assert_eq!(t.submitted(), 1);
        assert!(t.current().is_none());
    }

    #[test]
    #[should_panic(expected = "started twice")]
    fn test_double_start_panics() {
        let mut t = tracker(4);
        let mut mi = MiEmitter::new();
        let l = leader();
        let mut cmd = CommandBuffer::new(0);
        t.begin_frame().unwrap();
        t.start(&l, ReportKind::Engine, &mut mi, &mut cmd).unwrap();
        t.start(&l, ReportKind::Engine, &mut mi, &mut cmd).unwrap();
    }

    #[test]
    #[should_panic(expected = "without a start")]
    fn test_end_without_start_panics() {
        let mut t = tracker(4);
        let mut mi = MiEmitter::new();
        let mut cmd = CommandBuffer::new(0);
        t.begin_frame().unwrap();
        t.end(&leader(), ReportKind::Engine, &mut mi, &mut cmd).unwrap();
    }

    #[test]
    #[should_panic(expected = "updated on slot")]
    fn test_update_before_end_panics() {
        let mut t = tracker(4);
        let mut mi = MiEmitter::new();
        let l = leader();
        let mut cmd = CommandBuffer::new(0);
        t.begin_frame().unwrap();
        t.start(&l, ReportKind::Engine, &mut mi, &mut cmd).unwrap();
        t.update(&l, ReportKind::GlobalCount, &mut mi, &mut cmd).unwrap();
    }

    #[test]
    fn test_ring_backpressure_and_cyclic_reuse() {
        let mut t = tracker(2);
        let mut mi = MiEmitter::new();
        run_frame(&mut t, &mut mi);
        run_frame(&mut t, &mut mi);
        assert_eq!(
            t.begin_frame(),
            Err(ErrorKind::StatusRingFull { in_flight: 2 })
        );

        assert_eq!(t.retire(1), 1);
        run_frame(&mut t, &mut mi);
        assert_eq!(t.seq(SlotIndex(0)), 2);
        assert_eq!(t.in_flight(), 2);

        assert_eq!(t.retire(3), 2);
        assert_eq!(t.retire(3), 0);
        assert_eq!(t.in_flight(), 0);
    }

    #[test]
    fn test_stale_global_count_ignored() {
        let mut t = tracker(2);
        let mut mi = MiEmitter::new();
        run_frame(&mut t, &mut mi);
        assert_eq!(t.retire(7), 0);
        assert_eq!(t.completed(), 0);
    }

    #[test]
    fn test_aborted_attempt_is_reset() {
        let mut t = tracker(2);
        let mut mi = MiEmitter::new();
        let l = leader();
        let mut cmd = CommandBuffer::new(0);
        let slot = t.begin_frame().unwrap();
        t.start(&l, ReportKind::Engine, &mut mi, &mut cmd).unwrap();

        // Same seq again: the half-open slot is discarded.
        assert_eq!(t.begin_frame().unwrap(), slot);
        assert_eq!(t.state(slot), SlotState::NotStarted);
        run_frame(&mut t, &mut mi);
        assert_eq!(t.submitted(), 1);
    }

    #[test]
    fn test_completion_of_reused_slot_is_superseded() {
        let mut t = tracker(2);
        let mut mi = MiEmitter::new();
        run_frame(&mut t, &mut mi);
        run_frame(&mut t, &mut mi);
        t.retire(2);
        run_frame(&mut t, &mut mi);

        // Slot 0 now carries seq 2.
        let record = StatusRecord {
            start: marker(2),
            end: marker(2),
            crc: 0xBEEF,
            ..StatusRecord::default()
        };
        assert_eq!(t.completion(SlotIndex(0), 0, &record), FrameStatus::Superseded);
        assert_eq!(
            t.completion(SlotIndex(0), 2, &record),
            FrameStatus::Complete { crc: 0xBEEF }
        );
    }

    #[test]
    fn test_is_finalized_tracks_lifecycle() {
        let mut t = tracker(2);
        let mut mi = MiEmitter::new();
        let l = leader();
        let mut cmd = CommandBuffer::new(0);
        assert!(!t.is_finalized());
        t.begin_frame().unwrap();
        assert!(!t.is_finalized());
        t.start(&l, ReportKind::Engine, &mut mi, &mut cmd).unwrap();
        t.end(&l, ReportKind::Engine, &mut mi, &mut cmd).unwrap();
        assert!(!t.is_finalized());
        t.update(&l, ReportKind::GlobalCount, &mut mi, &mut cmd).unwrap();
        assert!(t.is_finalized());
        t.commit_frame();
        assert!(!t.is_finalized());
    }

    #[test]
    fn test_decode_record() {
        let done = StatusRecord {
            start: marker(5),
            end: marker(5),
            crc: 0xABCD,
            ..StatusRecord::default()
        };
        assert_eq!(decode_record(&done, 5), FrameStatus::Complete { crc: 0xABCD });
        assert_eq!(decode_record(&done, 6), FrameStatus::Pending);

        let hung = StatusRecord {
            engine_status: ENGINE_STATUS_HANG,
            ..done
        };
        assert_eq!(
            decode_record(&hung, 5),
            FrameStatus::Error(ErrorKind::HardwareTimeout)
        );
        assert!(StatusRecord::from_words(&[1, 2, 3]).is_none());
    }
}
