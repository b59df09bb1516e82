//! Idle timeout: deactivates an overlay after a period without overlay input.

use crate::host::{Scheduler, TimerHandle};
use std::time::Duration;

/// Owns at most one repeating scheduler timer.
///
/// The controller refreshes it on every overlay-owned trigger and treats an
/// expiry of the handle it currently owns as a request to deactivate. Ticks
/// from a cancelled handle, or from before the last refresh, are not owned
/// and are ignored.
#[derive(Debug, Default)]
pub struct TimeoutController {
    handle: Option<TimerHandle>,
}

impl TimeoutController {
    /// Start the countdown, replacing any previous timer.
    pub fn arm<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S, duration: Duration) {
        self.cancel(scheduler);
        self.handle = Some(scheduler.start_repeating(duration));
    }

    /// Restart the countdown without firing.
    pub fn refresh<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(handle) = self.handle {
            self.handle = Some(scheduler.reset(handle));
        }
    }

    /// Stop and release the timer.
    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(handle) = self.handle.take() {
            scheduler.cancel(handle);
        }
    }

    /// Whether `handle` is the live timer.
    pub fn owns(&self, handle: TimerHandle) -> bool {
        self.handle == Some(handle)
    }

    /// Whether a timer is running.
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualScheduler;

    #[test]
    fn arm_refresh_cancel() {
        let mut sched = ManualScheduler::default();
        let mut timeout = TimeoutController::default();
        assert!(!timeout.is_armed());

        timeout.arm(&mut sched, Duration::from_millis(100));
        assert!(timeout.is_armed());
        assert_eq!(sched.active_count(), 1);

        sched.set_now(Duration::from_millis(80));
        let before = timeout.handle;
        timeout.refresh(&mut sched);
        assert_ne!(timeout.handle, before);
        assert!(!timeout.owns(before.unwrap()));
        assert_eq!(sched.active_count(), 1);
        assert_eq!(sched.fire_next(Duration::from_millis(150)), None);
        let fired = sched.fire_next(Duration::from_millis(180)).unwrap();
        assert!(timeout.owns(fired));

        timeout.cancel(&mut sched);
        assert!(!timeout.is_armed());
        assert!(!timeout.owns(fired));
        assert_eq!(sched.active_count(), 0);
    }

    #[test]
    fn rearming_cancels_previous_timer() {
        let mut sched = ManualScheduler::default();
        let mut timeout = TimeoutController::default();
        timeout.arm(&mut sched, Duration::from_millis(100));
        timeout.arm(&mut sched, Duration::from_millis(100));
        assert_eq!(sched.active_count(), 1);
    }

    #[test]
    fn refresh_without_timer_is_noop() {
        let mut sched = ManualScheduler::default();
        let mut timeout = TimeoutController::default();
        timeout.refresh(&mut sched);
        timeout.cancel(&mut sched);
        assert_eq!(sched.active_count(), 0);
    }
}
