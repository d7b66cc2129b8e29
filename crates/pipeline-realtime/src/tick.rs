//! Non-overlapping execution guard for the periodic control task.
//!
//! The control task is timer-driven; if one tick is still running when the
//! next fires, the new tick must be skipped rather than queued so the timer
//! loop is never stalled by a slow calibration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Guard tracking whether a control tick is currently in flight.
pub struct TickGuard {
    in_flight: Arc<AtomicBool>,
}

impl TickGuard {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attempt to acquire the guard for one tick.
    ///
    /// Returns `None` if a previous tick is still running; the caller skips
    /// this invocation. The permit releases the guard on drop, including on
    /// panic.
    pub fn try_acquire(&self) -> Option<TickPermit> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(TickPermit {
                flag: self.in_flight.clone(),
            })
        } else {
            None
        }
    }

    /// Whether a tick is currently in flight.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for TickGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII permit releasing the tick guard when dropped.
pub struct TickPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_skipped() {
        let guard = TickGuard::new();

        let first = guard.try_acquire();
        assert!(first.is_some());
        assert!(guard.is_running());

        assert!(guard.try_acquire().is_none());

        drop(first);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let guard = TickGuard::new();
        {
            let _permit = guard.try_acquire().unwrap();
            assert!(guard.is_running());
        }
        assert!(!guard.is_running());
    }
}
