//! One-shot fence that tracks whether the device has caught up with a point
//! in the command stream.

use std::sync::Arc;
use std::time::Duration;

use crate::device::{Device, SyncHandle, WaitStatus};
use crate::error::GpuError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    /// Nothing outstanding; counts as signaled.
    Unarmed,
    Armed(SyncHandle),
}

/// Unarmed fences report signaled. Arming inserts a sync object after all
/// previously issued commands; a successful wait consumes it. A timed-out
/// wait keeps the fence armed so the next wait blocks again.
#[derive(Debug)]
pub struct FenceSync {
    device: Arc<dyn Device>,
    state: FenceState,
}

impl FenceSync {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device, state: FenceState::Unarmed }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, FenceState::Armed(_))
    }

    /// Arm at the current end of the command stream. Re-arming replaces the
    /// outstanding sync; the new one cannot signal before the old one would have.
    pub fn arm(&mut self) -> Result<(), GpuError> {
        let sync = self.device.fence_sync()?;
        if let FenceState::Armed(previous) = std::mem::replace(&mut self.state, FenceState::Armed(sync)) {
            log::trace!("fence re-armed, dropping {:?}", previous);
            self.device.delete_sync(previous);
        }
        Ok(())
    }

    /// Block until signaled or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Result<(), GpuError> {
        let FenceState::Armed(sync) = self.state else {
            return Ok(());
        };
        match self.device.client_wait_sync(sync, timeout) {
            WaitStatus::AlreadySignaled | WaitStatus::ConditionSatisfied => {
                self.device.delete_sync(sync);
                self.state = FenceState::Unarmed;
                Ok(())
            }
            WaitStatus::TimeoutExpired => Err(GpuError::FenceTimeout(timeout)),
            WaitStatus::WaitFailed => Err(GpuError::FenceFailed),
        }
    }

    /// Non-blocking check; consumes the sync when it has signaled.
    pub fn poll(&mut self) -> Result<bool, GpuError> {
        match self.wait(Duration::ZERO) {
            Ok(()) => Ok(true),
            Err(GpuError::FenceTimeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl Drop for FenceSync {
    fn drop(&mut self) {
        if let FenceState::Armed(sync) = self.state {
            self.device.delete_sync(sync);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn unarmed_counts_as_signaled() {
        let device = HeadlessDevice::new(4, 4);
        device.hold_fences(true);
        let mut fence = FenceSync::new(device.clone());
        assert!(fence.wait(Duration::ZERO).is_ok());
        assert!(fence.poll().unwrap());
    }

    #[test]
    fn timeout_keeps_fence_armed() {
        let device = HeadlessDevice::new(4, 4);
        device.hold_fences(true);
        let mut fence = FenceSync::new(device.clone());
        fence.arm().unwrap();
        let err = fence.wait(Duration::from_millis(1)).unwrap_err();
        assert!(err.is_transient());
        assert!(fence.is_armed());

        device.signal_fences();
        fence.wait(Duration::from_millis(1)).unwrap();
        assert!(!fence.is_armed());
        assert_eq!(device.live_syncs(), 0);
    }

    #[test]
    fn rearming_replaces_sync() {
        let device = HeadlessDevice::new(4, 4);
        device.hold_fences(true);
        let mut fence = FenceSync::new(device.clone());
        fence.arm().unwrap();
        fence.arm().unwrap();
        assert_eq!(device.live_syncs(), 1);
        drop(fence);
        assert_eq!(device.live_syncs(), 0);
    }
}
