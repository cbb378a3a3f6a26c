//! # Submission Hooks and Resource Synchronization
//!
//! Platform collaborators that bracket a pipe's stream. A pre-process hook
//! that ran is always matched by its post-process hook, whichever way the
//! recording exits: [`HookGuard`] runs the post hook from `Drop` unless
//! [`HookGuard::finish`] already did.

use core::ops::{Deref, DerefMut};

use magma_cmd::CommandBuffer;
use magma_core::{BufferHandle, SurfaceHandle};

use crate::error::HookError;
use crate::scalability::PipeIdentity;

// =============================================================================
// HOOKS
// =============================================================================

/// Platform-specific commands around a pipe's packet sequence
pub trait SubmissionHooks {
    /// Runs before the first packet command of `pipe`'s stream
    fn pre_process(&mut self, pipe: PipeIdentity, cmd: &mut CommandBuffer) -> Result<(), HookError>;

    /// Runs after the packet body of `pipe`'s stream
    fn post_process(&mut self, pipe: PipeIdentity, cmd: &mut CommandBuffer) -> Result<(), HookError>;
}

/// Scoped pre/post hook pairing
///
/// Owns the command buffer borrow for the bracketed region; the body
/// records through the guard.
pub struct HookGuard<'a, 'h> {
    hooks: Option<&'a mut (dyn SubmissionHooks + 'h)>,
    pipe: PipeIdentity,
    cmd: &'a mut CommandBuffer,
}

impl<'a, 'h> HookGuard<'a, 'h> {
    /// Run the pre-process hook and arm the post-process hook
    ///
    /// On failure nothing is armed: the post hook only pairs with a pre
    /// hook that succeeded.
    pub fn acquire(
        mut hooks: Option<&'a mut (dyn SubmissionHooks + 'h)>,
        pipe: PipeIdentity,
        cmd: &'a mut CommandBuffer,
    ) -> Result<Self, HookError> {
        if let Some(h) = hooks.as_deref_mut() {
            h.pre_process(pipe, cmd)?;
        }
        Ok(Self { hooks, pipe, cmd })
    }

    /// Run the post-process hook now and report its result
    pub fn finish(mut self) -> Result<(), HookError> {
        match self.hooks.take() {
            Some(h) => h.post_process(self.pipe, self.cmd),
            None => Ok(()),
        }
    }
}

impl Deref for HookGuard<'_, '_> {
    type Target = CommandBuffer;

    fn deref(&self) -> &CommandBuffer {
        &*self.cmd
    }
}

impl DerefMut for HookGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut CommandBuffer {
        &mut *self.cmd
    }
}

impl Drop for HookGuard<'_, '_> {
    fn drop(&mut self) {
        if let Some(h) = self.hooks.take() {
            if let Err(e) = h.post_process(self.pipe, self.cmd) {
                log::error!("post-process hook failed on pipe {}: {}", self.pipe.index(), e);
            }
        }
    }
}

impl core::fmt::Debug for HookGuard<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HookGuard")
            .field("armed", &self.hooks.is_some())
            .field("pipe", &self.pipe)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RESOURCE SYNC
// =============================================================================

/// Resource whose GPU access is hazard-checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Decode target
    Surface(SurfaceHandle),
    /// Linear buffer
    Buffer(BufferHandle),
}

/// Hazard tracking against prior and concurrent GPU work
pub trait ResourceSync {
    /// Order this submission's access to `resource` after pending work
    fn sync_on_resource(&mut self, resource: Resource, write: bool) -> magma_core::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HookProbe, RecordingHooks};
    use magma_cmd::Method;

    #[test]
    fn test_guard_runs_post_on_drop() {
        let probe = HookProbe::default();
        let mut hooks = RecordingHooks::new(probe.clone());
        let mut cmd = CommandBuffer::new(0);
        {
            let mut guard =
                HookGuard::acquire(Some(&mut hooks), PipeIdentity::SINGLE, &mut cmd).unwrap();
            guard.push(Method::PicState, &[0]).unwrap();
        }
        assert_eq!(probe.counts(), (1, 1));
        assert_eq!(cmd.method_ids(), [Method::PicState]);
    }

    #[test]
    fn test_finish_runs_post_once() {
        let probe = HookProbe::default();
        let mut hooks = RecordingHooks::new(probe.clone());
        let mut cmd = CommandBuffer::new(0);
        let guard = HookGuard::acquire(Some(&mut hooks), PipeIdentity::SINGLE, &mut cmd).unwrap();
        guard.finish().unwrap();
        assert_eq!(probe.counts(), (1, 1));
    }

    #[test]
    fn test_failed_pre_does_not_arm_post() {
        let probe = HookProbe::default();
        probe.fail_pre();
        let mut hooks = RecordingHooks::new(probe.clone());
        let mut cmd = CommandBuffer::new(0);
        let res = HookGuard::acquire(Some(&mut hooks), PipeIdentity::SINGLE, &mut cmd);
        assert_eq!(res.err(), Some(HookError::Rejected("test")));
        assert_eq!(probe.counts(), (1, 0));
    }

    #[test]
    fn test_no_hooks_is_transparent() {
        let mut cmd = CommandBuffer::new(0);
        let guard = HookGuard::acquire(None, PipeIdentity::SINGLE, &mut cmd).unwrap();
        assert!(guard.method_ids().is_empty());
        guard.finish().unwrap();
    }
}
