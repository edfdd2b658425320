use crate::pipeline::OddsMonitor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Control side of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    pause_tx: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    pub fn pause(&self) {
        self.pause_tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.pause_tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Fixed-period ticker. Ticks that fall behind are skipped rather than
/// bunched up, ticks while paused do nothing, and cancellation interrupts
/// both the wait and an in-flight task.
pub struct Scheduler {
    period: Duration,
    cancel: CancellationToken,
    pause_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(period: Duration, cancel: CancellationToken) -> (Self, SchedulerHandle) {
        let (pause_tx, pause_rx) = watch::channel(false);
        let handle = SchedulerHandle {
            cancel: cancel.clone(),
            pause_tx: Arc::new(pause_tx),
        };
        let period = period.max(Duration::from_secs(1));
        (Self { period, cancel, pause_rx }, handle)
    }

    /// Run `task` once per period until cancelled. Returns how many times it ran.
    pub async fn run<F, Fut>(self, mut task: F) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if *self.pause_rx.borrow() {
                tracing::debug!("scheduler paused, tick skipped");
                continue;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = task() => runs += 1,
            }
        }

        tracing::info!(runs, "scheduler stopped");
        runs
    }
}

/// Spawn the periodic refresh loop for a monitor.
pub fn spawn_monitor(
    monitor: Arc<OddsMonitor>,
    period: Duration,
    cancel: CancellationToken,
) -> (JoinHandle<u64>, SchedulerHandle) {
    let (scheduler, handle) = Scheduler::new(period, cancel);
    let join = tokio::spawn(scheduler.run(move || {
        let monitor = monitor.clone();
        async move {
            monitor.refresh_cycle().await;
        }
    }));
    (join, handle)
}
