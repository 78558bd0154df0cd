//! Status notifications for long-running applies
//!
//! The reconcile loop reports through [`StatusNotifier`]; the CLI uses
//! [`TracingNotifier`]. While an apply is in flight a [`StillWorking`]
//! ticker repeats a heartbeat until it is stopped.

use std::sync::Arc;
use std::time::Duration;

use clusterkit_kube::WriteOutcome;
#[cfg(test)]
use mockall::automock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Heartbeat period for the still-working ticker
pub const STILL_WORKING_PERIOD: Duration = Duration::from_secs(30);

/// What a task does to the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Configure existing resources
    Configure,
    /// Create resources
    Create,
    /// Modify resources
    Modify,
    /// Destroy resources
    Destroy,
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configure => "configure",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

impl From<WriteOutcome> for TaskAction {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Created => Self::Create,
            WriteOutcome::Patched => Self::Modify,
            WriteOutcome::Unchanged => Self::Configure,
        }
    }
}

/// Receives progress of a running task
#[cfg_attr(test, automock)]
pub trait StatusNotifier: Send + Sync {
    /// A task started
    fn start(&self, task: &str, action: TaskAction);
    /// Progress detail for the running task
    fn progress(&self, task: &str, detail: &str);
    /// Heartbeat while the task is still running
    fn still_working(&self, task: &str, elapsed: Duration);
    /// The task finished; `error` is set when it failed
    fn complete(&self, task: &str, error: Option<String>);
}

/// Writes status as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl StatusNotifier for TracingNotifier {
    fn start(&self, task: &str, action: TaskAction) {
        info!(task = %task, action = %action, "started");
    }

    fn progress(&self, task: &str, detail: &str) {
        info!(task = %task, "{}", detail);
    }

    fn still_working(&self, task: &str, elapsed: Duration) {
        info!(task = %task, elapsed_secs = elapsed.as_secs(), "still working");
    }

    fn complete(&self, task: &str, error: Option<String>) {
        match error {
            None => info!(task = %task, "completed"),
            Some(e) => error!(task = %task, error = %e, "failed"),
        }
    }
}

/// Periodic heartbeat that runs until stopped
pub struct StillWorking {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StillWorking {
    /// Start ticking every `period` for `task`.
    ///
    /// The first heartbeat fires one period after start. The ticker also
    /// stops when `parent` is cancelled.
    pub fn start(
        notifier: Arc<dyn StatusNotifier>,
        task: impl Into<String>,
        period: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let task = task.into();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = interval_at(started + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => notifier.still_working(&task, started.elapsed()),
                }
            }
            debug!(task = %task, "still-working ticker stopped");
        });

        Self { cancel, handle }
    }

    /// Stop ticking. No heartbeat is emitted once this returns.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            debug!(error = %e, "still-working ticker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        ticks: AtomicUsize,
    }

    impl StatusNotifier for CountingNotifier {
        fn start(&self, _: &str, _: TaskAction) {}
        fn progress(&self, _: &str, _: &str) {}
        fn still_working(&self, _: &str, _: Duration) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
        fn complete(&self, _: &str, _: Option<String>) {}
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_each_period_until_stopped() {
        let notifier = Arc::new(CountingNotifier::default());
        let ticker = StillWorking::start(
            notifier.clone(),
            "apply aws-auth",
            Duration::from_secs(10),
            &CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        ticker.stop().await;
        assert_eq!(notifier.ticks.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(notifier.ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_before_the_first_period_emits_nothing() {
        let mut notifier = MockStatusNotifier::new();
        notifier.expect_still_working().never();

        let ticker = StillWorking::start(
            Arc::new(notifier),
            "apply",
            Duration::from_secs(10),
            &CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        ticker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_the_ticker() {
        let notifier = Arc::new(CountingNotifier::default());
        let parent = CancellationToken::new();
        let ticker = StillWorking::start(
            notifier.clone(),
            "apply",
            Duration::from_secs(10),
            &parent,
        );

        parent.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(notifier.ticks.load(Ordering::SeqCst), 0);
        ticker.stop().await;
    }

    #[test]
    fn write_outcomes_map_to_actions() {
        assert_eq!(TaskAction::from(WriteOutcome::Created), TaskAction::Create);
        assert_eq!(TaskAction::from(WriteOutcome::Patched), TaskAction::Modify);
        assert_eq!(TaskAction::from(WriteOutcome::Unchanged), TaskAction::Configure);
    }

    #[test]
    fn actions_display_lowercase() {
        assert_eq!(TaskAction::Create.to_string(), "create");
        assert_eq!(TaskAction::Destroy.to_string(), "destroy");
    }
}
