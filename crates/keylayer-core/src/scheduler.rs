//! A [`Scheduler`] backed by tokio intervals.

use crate::host::{Scheduler, TimerHandle};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::trace;

struct Timer {
    interval: Duration,
    abort: AbortHandle,
}

/// Runs each timer as a tokio task that sends its handle down a channel on
/// every tick.
///
/// The receiving half is returned by [`new`](Self::new); the embedding loop
/// turns each received handle into
/// [`HostEvent::TimerFired`](crate::controller::HostEvent::TimerFired):
///
/// ```rust,ignore
/// let (scheduler, mut ticks) = TokioScheduler::new();
/// let mut controller = Controller::new(MyHost::new(scheduler));
/// while let Some(handle) = ticks.recv().await {
///     controller.handle(HostEvent::TimerFired(handle))?;
/// }
/// ```
///
/// Timers are spawned with [`tokio::spawn`], so `start_repeating` and
/// `reset` must be called from inside a runtime.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerHandle>,
    timers: HashMap<TimerHandle, Timer>,
    next: u64,
}

impl TokioScheduler {
    /// Create a scheduler and the channel its ticks arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerHandle>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            timers: HashMap::new(),
            next: 0,
        };
        (scheduler, rx)
    }

    /// Number of running timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    fn ticks(handle: TimerHandle, interval: Duration) -> BoxStream<'static, TimerHandle> {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::pin(IntervalStream::new(ticker).map(move |_| handle))
    }

    fn spawn(&self, handle: TimerHandle, interval: Duration) -> AbortHandle {
        let tx = self.tx.clone();
        let mut stream = Self::ticks(handle, interval);
        tokio::spawn(async move {
            while let Some(handle) = stream.next().await {
                if tx.send(handle).is_err() {
                    break;
                }
            }
        })
        .abort_handle()
    }
}

impl Scheduler for TokioScheduler {
    fn start_repeating(&mut self, interval: Duration) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle(self.next);
        let abort = self.spawn(handle, interval);
        self.timers.insert(handle, Timer { interval, abort });
        trace!(?handle, ?interval, "timer started");
        handle
    }

    fn reset(&mut self, handle: TimerHandle) -> TimerHandle {
        let Some(timer) = self.timers.remove(&handle) else {
            return handle;
        };
        timer.abort.abort();
        // A tick may already sit in the channel under the old handle.
        self.next += 1;
        let fresh = TimerHandle(self.next);
        let abort = self.spawn(fresh, timer.interval);
        self.timers.insert(
            fresh,
            Timer {
                interval: timer.interval,
                abort,
            },
        );
        trace!(?handle, ?fresh, "timer reset");
        fresh
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(timer) = self.timers.remove(&handle) {
            timer.abort.abort();
            trace!(?handle, "timer cancelled");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort.abort();
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("timers", &self.timers.len())
            .finish()
    }
}
