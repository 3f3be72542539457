use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One pull reconciliation pass.
#[async_trait]
pub trait PollWork: Send + Sync + 'static {
    async fn run(&self);
}

/// Runs `work` every `interval` and on demand.
///
/// Runs never overlap. A periodic tick that falls due while a run is in flight
/// is dropped; the next tick comes one full interval after the run ends.
/// Out-of-band triggers arriving during a run coalesce into a single rerun.
pub struct PollingScheduler {
    interval: Duration,
    trigger: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    /// Starts polling. The first run happens immediately.
    pub fn start(interval: Duration, work: Arc<dyn PollWork>) -> Self {
        let trigger = Arc::new(Notify::new());
        let handle = tokio::spawn(poll_loop(interval, work, Arc::clone(&trigger)));
        tracing::debug!(interval_ms = interval.as_millis() as u64, "polling started");
        Self {
            interval,
            trigger,
            handle: Some(handle),
        }
    }

    /// Requests an immediate run outside the periodic schedule.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels future runs. A run in flight is aborted at its next await and
    /// never reports.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("polling stopped");
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(interval: Duration, work: Arc<dyn PollWork>, trigger: Arc<Notify>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => tracing::debug!("periodic poll"),
            _ = trigger.notified() => tracing::debug!("out-of-band poll"),
        }
        work.run().await;
        ticker.reset();
    }
}
