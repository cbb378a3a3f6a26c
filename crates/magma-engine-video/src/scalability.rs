//! # Scalability
//!
//! Pipe identity and the barrier protocol that keeps N hardware pipes in
//! step while they record disjoint tiles of the same frame.
//!
//! ## Barriers
//!
//! Barriers are semaphores in status memory. Each frame of the session
//! raises every semaphore by a fixed amount, so a barrier never needs to
//! be reset between frames:
//!
//! ```text
//!  AllPipesWaitAll            OnePipeProceedsOthersWait
//!
//!  pipe 0: inc ─┐             pipe 0: wait >= (N-1) * gen ──▶ status writes
//!  pipe 1: inc ─┤ wait        pipe 1: inc ──▶ (predicated tail)
//!  ...          │ >= N * gen  ...
//!  pipe N: inc ─┘             pipe N: inc ──▶ (predicated tail)
//! ```
//!
//! With a single pipe every barrier is a no-op.
//!
//! ## Leader
//!
//! [`Leader`] can only be produced here, from the identity of pipe 0. The
//! shared status memory is written exclusively through APIs that demand
//! one, so a follower pipe has no way to reach them.

use magma_cmd::{AtomicOp, CommandBuffer, CommandEmitter, SemaphoreCompare};
use magma_core::{Error, GpuAddr, Result};

use crate::config::{StatusLayout, MAX_PIPES, SEMAPHORE_STRIDE};

// =============================================================================
// PIPE IDENTITY
// =============================================================================

/// Identity of the pipe whose stream is being recorded
///
/// Fixed for the whole recording of that stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeIdentity {
    index: u8,
    count: u8,
}

impl PipeIdentity {
    /// The only pipe of a non-scalable session
    pub const SINGLE: Self = Self { index: 0, count: 1 };

    /// Identity of pipe `index` out of `count`
    pub const fn new(index: u8, count: u8) -> Option<Self> {
        if count == 0 || index >= count {
            None
        } else {
            Some(Self { index, count })
        }
    }

    /// Pipe index
    #[inline]
    pub const fn index(self) -> u8 {
        self.index
    }

    /// Total pipes recording this frame
    #[inline]
    pub const fn count(self) -> u8 {
        self.count
    }

    /// Check if this is the first (leader) pipe
    #[inline]
    pub const fn is_first(self) -> bool {
        self.index == 0
    }

    /// Check if more than one pipe records this frame
    #[inline]
    pub const fn is_scalable(self) -> bool {
        self.count > 1
    }

    /// Leader or follower
    pub const fn role(self) -> PipeRole {
        if self.is_first() {
            PipeRole::Leader(Leader { _private: () })
        } else {
            PipeRole::Follower
        }
    }
}

/// Proof that the current stream belongs to pipe 0
#[derive(Debug)]
pub struct Leader {
    _private: (),
}

/// Role of a pipe in the status protocol
#[derive(Debug)]
pub enum PipeRole {
    /// Writes the frame's status
    Leader(Leader),
    /// Suppresses its status writes
    Follower,
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Barrier semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every pipe waits until all pipes arrived
    AllPipesWaitAll,
    /// Pipe 0 waits for the others, the others signal and continue
    OnePipeProceedsOthersWait,
}

/// Pipe identity and barrier provider
pub trait ScalabilityController {
    /// Pipes recording each frame
    fn pipe_count(&self) -> u8;

    /// Pipe currently being recorded
    fn current_pipe(&self) -> u8;

    /// Check if the current pipe is the leader
    fn is_first_pipe(&self) -> bool {
        self.current_pipe() == 0
    }

    /// Start recording frame number `frame` (0 for the session's first)
    fn begin_frame(&mut self, frame: u64);

    /// Switch recording to pipe `index`
    fn activate_pipe(&mut self, index: u8) -> Result<()>;

    /// Emit barrier `extra` of kind `mode` into the current pipe's stream
    fn sync_pipe(
        &mut self,
        mode: SyncMode,
        extra: u32,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> Result<()>;
}

// =============================================================================
// SEMAPHORE SCALABILITY
// =============================================================================

/// Barrier protocol on status-memory semaphores
#[derive(Debug)]
pub struct SemaphoreScalability {
    count: u8,
    current: u8,
    generation: u32,
    sync_all: GpuAddr,
    rendezvous: GpuAddr,
}

impl SemaphoreScalability {
    /// Controller for `count` pipes with semaphores from `layout`
    pub fn new(count: u8, layout: &StatusLayout) -> Result<Self> {
        if count == 0 || count > MAX_PIPES {
            return Err(Error::InvalidParameter);
        }
        Ok(Self {
            count,
            current: 0,
            generation: 1,
            sync_all: layout.sync_all,
            rendezvous: layout.rendezvous,
        })
    }

    /// Semaphore value every pipe has contributed to after this frame
    fn target(&self, contributors: u8) -> u32 {
        u32::from(contributors).wrapping_mul(self.generation)
    }
}

impl ScalabilityController for SemaphoreScalability {
    fn pipe_count(&self) -> u8 {
        self.count
    }

    fn current_pipe(&self) -> u8 {
        self.current
    }

    fn begin_frame(&mut self, frame: u64) {
        self.generation = (frame as u32).wrapping_add(1);
        self.current = 0;
    }

    fn activate_pipe(&mut self, index: u8) -> Result<()> {
        if index >= self.count {
            return Err(Error::InvalidParameter);
        }
        self.current = index;
        Ok(())
    }

    fn sync_pipe(
        &mut self,
        mode: SyncMode,
        extra: u32,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> Result<()> {
        if self.count == 1 {
            log::trace!("sync {:?} #{} skipped: single pipe", mode, extra);
            return Ok(());
        }
        let slot = u64::from(extra) * SEMAPHORE_STRIDE;
        match mode {
            SyncMode::AllPipesWaitAll => {
                let sem = self.sync_all.offset(slot);
                emitter.atomic(cmd, AtomicOp::Increment, sem)?;
                emitter.semaphore_wait(
                    cmd,
                    sem,
                    SemaphoreCompare::GreaterOrEqual,
                    self.target(self.count),
                )
            },
            SyncMode::OnePipeProceedsOthersWait => {
                let sem = self.rendezvous.offset(slot);
                if self.current == 0 {
                    emitter.semaphore_wait(
                        cmd,
                        sem,
                        SemaphoreCompare::GreaterOrEqual,
                        self.target(self.count - 1),
                    )
                } else {
                    emitter.atomic(cmd, AtomicOp::Increment, sem)
                }
            },
        }
    }
}

static_assertions::assert_impl_all!(PipeIdentity: Send, Sync, Copy);
static_assertions::assert_not_impl_any!(Leader: Clone, Copy, Default);

#[cfg(test)]
mod tests {
    use super::*;
    use magma_cmd::{Method, MiEmitter};

    fn controller(count: u8) -> SemaphoreScalability {
        let layout = StatusLayout::packed(GpuAddr::new(0x10_0000), 16);
        SemaphoreScalability::new(count, &layout).unwrap()
    }

    #[test]
    fn test_identity_bounds_and_role() {
        assert!(PipeIdentity::new(4, 4).is_none());
        assert!(PipeIdentity::new(0, 0).is_none());
        let id = PipeIdentity::new(2, 4).unwrap();
        assert!(!id.is_first());
        assert!(matches!(id.role(), PipeRole::Follower));
        assert!(matches!(PipeIdentity::SINGLE.role(), PipeRole::Leader(_)));
        assert!(!PipeIdentity::SINGLE.is_scalable());
    }

    #[test]
    fn test_single_pipe_barriers_are_noops() {
        let mut sc = controller(1);
        let mut mi = MiEmitter::new();
        let mut cmd = CommandBuffer::new(0);
        sc.sync_pipe(SyncMode::AllPipesWaitAll, 0, &mut mi, &mut cmd).unwrap();
        sc.sync_pipe(SyncMode::OnePipeProceedsOthersWait, 0, &mut mi, &mut cmd)
            .unwrap();
        assert!(cmd.method_ids().is_empty());
        assert!(sc.is_first_pipe());
    }

    #[test]
    fn test_all_pipes_barrier_waits_for_every_pipe() {
        let mut sc = controller(4);
        let mut mi = MiEmitter::new();
        sc.begin_frame(2);
        sc.activate_pipe(3).unwrap();
        let mut cmd = CommandBuffer::new(3);
        sc.sync_pipe(SyncMode::AllPipesWaitAll, 0, &mut mi, &mut cmd).unwrap();

        assert_eq!(cmd.method_ids(), [Method::Atomic, Method::SemaphoreWait]);
        let (_, wait) = cmd.methods().nth(1).unwrap();
        assert_eq!(wait[1], 4 * 3);
    }

    #[test]
    fn test_rendezvous_only_leader_waits() {
        let mut sc = controller(4);
        let mut mi = MiEmitter::new();
        sc.begin_frame(0);

        let mut leader = CommandBuffer::new(0);
        sc.sync_pipe(SyncMode::OnePipeProceedsOthersWait, 0, &mut mi, &mut leader)
            .unwrap();
        assert_eq!(leader.method_ids(), [Method::SemaphoreWait]);
        assert_eq!(leader.methods().next().unwrap().1[1], 3);

        sc.activate_pipe(1).unwrap();
        let mut follower = CommandBuffer::new(1);
        sc.sync_pipe(SyncMode::OnePipeProceedsOthersWait, 0, &mut mi, &mut follower)
            .unwrap();
        assert_eq!(follower.method_ids(), [Method::Atomic]);
    }

    #[test]
    fn test_activate_out_of_range() {
        let mut sc = controller(2);
        assert_eq!(sc.activate_pipe(2), Err(Error::InvalidParameter));
        assert_eq!(sc.current_pipe(), 0);
        let layout = StatusLayout::packed(GpuAddr::new(0x1000), 1);
        assert!(SemaphoreScalability::new(0, &layout).is_err());
    }
}
