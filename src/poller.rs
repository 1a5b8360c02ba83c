//! Background refresh polling.
//!
//! [`RefreshPoller`] asks the backend to re-poll upstream feeds on a fixed
//! interval for a bounded time, then reports whether anything new arrived.
//!
//! ```text
//!   Idle --start--> Polling --deadline--> Settling --finish--> Idle
//!     ^                |                      |
//!     +------stop------+----------stop--------+
//! ```
//!
//! One spawned task owns both timers, so [`RefreshPoller::stop`] (or dropping
//! the poller) cancels everything at once.

use crate::identity::Identity;
use crate::loader::PageSource;
use crate::util::catch_task_panic;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default time between pulls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default number of pulls per run.
pub const DEFAULT_POLL_ITERATIONS: u32 = 5;
/// Status shown when a run found nothing.
pub const NO_NEW_CONTENT_MESSAGE: &str = "No new posts found";

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// A tick served later than this past the deadline does not pull.
const LATE_TICK_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub iterations: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            iterations: DEFAULT_POLL_ITERATIONS,
        }
    }
}

impl PollerConfig {
    /// Total time a run may take before it settles.
    pub fn deadline(&self) -> Duration {
        self.interval.saturating_mul(self.iterations)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    /// The run is over; the owner is acting on the outcome.
    Settling,
}

/// Messages from the polling task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    Tick {
        generation: u64,
        iteration: u32,
        new_items_so_far: u64,
    },
    Settled {
        generation: u64,
        new_items: u64,
    },
    TaskPanicked {
        generation: u64,
        error: String,
    },
}

impl PollerEvent {
    fn generation(&self) -> u64 {
        match self {
            PollerEvent::Tick { generation, .. }
            | PollerEvent::Settled { generation, .. }
            | PollerEvent::TaskPanicked { generation, .. } => *generation,
        }
    }
}

/// Result of applying a [`PollerEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Progress {
        iteration: u32,
        new_items_so_far: u64,
    },
    /// New items arrived; the owner should reload its collection.
    NewContent(u64),
    /// Nothing new; the owner should show [`NO_NEW_CONTENT_MESSAGE`].
    NoNewContent,
    Failed(String),
    /// Event from a stopped run.
    Stale,
}

impl PollOutcome {
    /// True for outcomes that end a run.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PollOutcome::NewContent(_) | PollOutcome::NoNewContent | PollOutcome::Failed(_)
        )
    }
}

pub struct RefreshPoller {
    config: PollerConfig,
    state: PollerState,
    generation: u64,
    task: Option<JoinHandle<()>>,
    event_tx: mpsc::Sender<PollerEvent>,
    event_rx: mpsc::Receiver<PollerEvent>,
}

impl RefreshPoller {
    pub fn new(config: PollerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config: PollerConfig {
                iterations: config.iterations.max(1),
                ..config
            },
            state: PollerState::Idle,
            generation: 0,
            task: None,
            event_tx,
            event_rx,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    pub fn is_running(&self) -> bool {
        self.state != PollerState::Idle
    }

    /// Begin a polling run for `identity`.
    ///
    /// Returns false, starting nothing, unless the poller is idle.
    pub fn start<S: PageSource>(&mut self, identity: Identity, source: Arc<S>) -> bool {
        if self.state != PollerState::Idle {
            tracing::debug!(state = ?self.state, "Poller already running, ignoring start");
            return false;
        }

        self.generation = self.generation.wrapping_add(1);
        self.state = PollerState::Polling;
        tracing::info!(
            user_id = %identity.user_id,
            interval_ms = self.config.interval.as_millis() as u64,
            iterations = self.config.iterations,
            "Starting background refresh"
        );

        let generation = self.generation;
        let config = self.config;
        let tx = self.event_tx.clone();
        self.task = Some(tokio::spawn(async move {
            let tx_panic = tx.clone();
            if let Err(panic_msg) =
                catch_task_panic(poll_loop(generation, config, identity, source, tx)).await
            {
                tracing::error!(task = "refresh_poll", error = %panic_msg, "Background task panicked");
                let _ = tx_panic
                    .send(PollerEvent::TaskPanicked {
                        generation,
                        error: panic_msg,
                    })
                    .await;
            }
        }));
        true
    }

    /// Cancel the run, if any, and return to idle. Events already queued by
    /// the cancelled run are reported as stale.
    pub fn stop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            tracing::debug!("Background refresh stopped");
        }
        self.generation = self.generation.wrapping_add(1);
        self.state = PollerState::Idle;
    }

    /// Leave `Settling` once the owner has acted on the outcome.
    pub fn finish(&mut self) {
        if self.state == PollerState::Settling {
            self.task = None;
            self.state = PollerState::Idle;
        }
    }

    pub async fn next_event(&mut self) -> Option<PollOutcome> {
        let event = self.event_rx.recv().await?;
        Some(self.apply(event))
    }

    /// Apply every event that has already arrived.
    pub fn drain_events(&mut self) -> Vec<PollOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            outcomes.push(self.apply(event));
        }
        outcomes
    }

    /// Wait until the current run ends and return its final outcome.
    ///
    /// Returns `None` if the poller is not polling.
    pub async fn wait_settled(&mut self) -> Option<PollOutcome> {
        while self.state == PollerState::Polling {
            let outcome = self.next_event().await?;
            if outcome.is_final() {
                return Some(outcome);
            }
        }
        None
    }

    pub fn apply(&mut self, event: PollerEvent) -> PollOutcome {
        if event.generation() != self.generation || self.state != PollerState::Polling {
            tracing::debug!(?event, "Discarding stale poller event");
            return PollOutcome::Stale;
        }

        match event {
            PollerEvent::Tick {
                iteration,
                new_items_so_far,
                ..
            } => PollOutcome::Progress {
                iteration,
                new_items_so_far,
            },
            PollerEvent::Settled { new_items, .. } => {
                self.state = PollerState::Settling;
                tracing::info!(new_items, "Background refresh settled");
                if new_items > 0 {
                    PollOutcome::NewContent(new_items)
                } else {
                    PollOutcome::NoNewContent
                }
            }
            PollerEvent::TaskPanicked { error, .. } => {
                self.task = None;
                self.state = PollerState::Idle;
                PollOutcome::Failed(format!("Background refresh failed: {}", error))
            }
        }
    }
}

impl Drop for RefreshPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

/// Pull on every interval tick until the deadline passes or the iteration
/// budget is spent, then report the total.
async fn poll_loop<S: PageSource>(
    generation: u64,
    config: PollerConfig,
    identity: Identity,
    source: Arc<S>,
    tx: mpsc::Sender<PollerEvent>,
) {
    let start = Instant::now();
    let deadline_at = start + config.deadline();
    let deadline = tokio::time::sleep_until(deadline_at);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval_at(start + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut new_items: u64 = 0;
    let mut iteration: u32 = 0;

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => {}
            _ = &mut deadline => break,
        }

        // Slow pulls delay ticks; once the deadline has passed the run is over
        if Instant::now() > deadline_at + LATE_TICK_GRACE {
            break;
        }
        iteration += 1;

        let pulled = tokio::select! {
            biased;

            result = source.pull_fresh_content(&identity) => result,
            _ = &mut deadline => {
                tracing::debug!(iteration, "Deadline reached during pull, abandoning it");
                break;
            }
        };
        match pulled {
            Ok(count) => new_items = new_items.saturating_add(count),
            Err(e) => {
                tracing::warn!(iteration, error = %e, "Refresh pull failed, continuing");
            }
        }
        let _ = tx
            .send(PollerEvent::Tick {
                generation,
                iteration,
                new_items_so_far: new_items,
            })
            .await;
        if iteration >= config.iterations {
            break;
        }
    }

    if let Err(e) = tx
        .send(PollerEvent::Settled {
            generation,
            new_items,
        })
        .await
    {
        tracing::warn!(error = %e, "Channel send failed (receiver dropped)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ItemFlag, Page, Post};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Returns scripted pull results in order, then zeros.
    #[derive(Default)]
    struct ScriptedPulls {
        script: Mutex<VecDeque<Result<u64, ApiError>>>,
        pulls: AtomicUsize,
    }

    impl ScriptedPulls {
        fn new(script: Vec<Result<u64, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                pulls: AtomicUsize::new(0),
            })
        }

        fn pulls(&self) -> usize {
            self.pulls.load(Ordering::SeqCst)
        }
    }

    impl PageSource for ScriptedPulls {
        type Item = Post;

        async fn fetch_page(
            &self,
            _identity: &Identity,
            _limit: u32,
            _offset: u64,
        ) -> Result<Page<Post>, ApiError> {
            Ok(Page::empty())
        }

        async fn pull_fresh_content(&self, _identity: &Identity) -> Result<u64, ApiError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(0))
        }

        async fn set_flag(
            &self,
            _identity: &Identity,
            _item_id: Uuid,
            _flag: ItemFlag,
            _value: bool,
        ) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity::new(Uuid::from_u128(1), "alice")
    }

    /// Paused time jumps straight to timers, up to millisecond rounding.
    fn assert_settled_at_deadline(started: Instant, config: PollerConfig) {
        let elapsed = started.elapsed();
        assert!(elapsed >= config.deadline(), "settled early: {:?}", elapsed);
        assert!(
            elapsed <= config.deadline() + Duration::from_millis(10),
            "settled late: {:?}",
            elapsed
        );
    }

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.iterations, 5);
        assert_eq!(config.deadline(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_new_content() {
        let source = ScriptedPulls::new(vec![Ok(0), Ok(2), Ok(0), Ok(1), Ok(0)]);
        let mut poller = RefreshPoller::new(PollerConfig::default());

        assert!(poller.start(identity(), Arc::clone(&source)));
        assert_eq!(poller.state(), PollerState::Polling);

        let mut progress = Vec::new();
        let outcome = loop {
            match poller.next_event().await.unwrap() {
                PollOutcome::Progress {
                    new_items_so_far, ..
                } => progress.push(new_items_so_far),
                other => break other,
            }
        };

        assert_eq!(outcome, PollOutcome::NewContent(3));
        assert_eq!(progress, vec![0, 2, 2, 3, 3]);
        assert_eq!(source.pulls(), 5);
        assert_eq!(poller.state(), PollerState::Settling);

        poller.finish();
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_without_new_content() {
        let source = ScriptedPulls::new(Vec::new());
        let mut poller = RefreshPoller::new(PollerConfig::default());
        poller.start(identity(), source);

        assert_eq!(poller.wait_settled().await, Some(PollOutcome::NoNewContent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let source = ScriptedPulls::new(Vec::new());
        let mut poller = RefreshPoller::new(PollerConfig::default());
        poller.start(identity(), Arc::clone(&source));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.pulls(), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(source.pulls(), 1);
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_rejected() {
        let source = ScriptedPulls::new(Vec::new());
        let mut poller = RefreshPoller::new(PollerConfig::default());

        assert!(poller.start(identity(), Arc::clone(&source)));
        assert!(!poller.start(identity(), Arc::clone(&source)));
        poller.wait_settled().await;

        // One task only: one set of five pulls
        assert_eq!(source.pulls(), 5);

        // Still rejected while settling
        assert!(!poller.start(identity(), Arc::clone(&source)));
        poller.finish();
        assert!(poller.start(identity(), source));
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_ticks() {
        let source = ScriptedPulls::new(vec![Ok(4), Ok(4), Ok(4)]);
        let mut poller = RefreshPoller::new(PollerConfig::default());
        poller.start(identity(), Arc::clone(&source));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(source.pulls(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.pulls(), 2);

        // Ticks queued before the stop are stale now
        let outcomes = poller.drain_events();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| *o == PollOutcome::Stale));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_run() {
        let source = ScriptedPulls::new(vec![Ok(1), Ok(1), Ok(1)]);
        let mut poller = RefreshPoller::new(PollerConfig::default());
        poller.start(identity(), Arc::clone(&source));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(source.pulls(), 1);
        drop(poller);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.pulls(), 1);
        // Only the test still holds the source once the task is gone
        assert_eq!(Arc::strong_count(&source), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pulls_do_not_stop_run() {
        let source = ScriptedPulls::new(vec![
            Err(ApiError::HttpStatus(502)),
            Ok(1),
            Err(ApiError::Timeout),
        ]);
        let mut poller = RefreshPoller::new(PollerConfig::default());
        poller.start(identity(), Arc::clone(&source));

        assert_eq!(poller.wait_settled().await, Some(PollOutcome::NewContent(1)));
        assert_eq!(source.pulls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_slow_pulls() {
        // Each pull takes longer than the interval: the deadline ends the run
        struct SlowPulls(AtomicUsize);

        impl PageSource for SlowPulls {
            type Item = Post;

            async fn fetch_page(
                &self,
                _identity: &Identity,
                _limit: u32,
                _offset: u64,
            ) -> Result<Page<Post>, ApiError> {
                Ok(Page::empty())
            }

            async fn pull_fresh_content(&self, _identity: &Identity) -> Result<u64, ApiError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1500)).await;
                Ok(1)
            }

            async fn set_flag(
                &self,
                _identity: &Identity,
                _item_id: Uuid,
                _flag: ItemFlag,
                _value: bool,
            ) -> Result<(), ApiError> {
                Ok(())
            }
        }

        let source = Arc::new(SlowPulls(AtomicUsize::new(0)));
        let mut poller = RefreshPoller::new(PollerConfig::default());
        let started = Instant::now();
        poller.start(identity(), Arc::clone(&source));

        // Pulls finish at 2.5s and 4s; the third is cut off by the deadline
        let outcome = poller.wait_settled().await;
        assert_eq!(outcome, Some(PollOutcome::NewContent(2)));
        assert_eq!(source.0.load(Ordering::SeqCst), 3);
        assert_settled_at_deadline(started, PollerConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_pull_settles_at_deadline() {
        struct HangingPulls(AtomicUsize);

        impl PageSource for HangingPulls {
            type Item = Post;

            async fn fetch_page(
                &self,
                _identity: &Identity,
                _limit: u32,
                _offset: u64,
            ) -> Result<Page<Post>, ApiError> {
                Ok(Page::empty())
            }

            async fn pull_fresh_content(&self, _identity: &Identity) -> Result<u64, ApiError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(7)
            }

            async fn set_flag(
                &self,
                _identity: &Identity,
                _item_id: Uuid,
                _flag: ItemFlag,
                _value: bool,
            ) -> Result<(), ApiError> {
                Ok(())
            }
        }

        let config = PollerConfig::default();
        let source = Arc::new(HangingPulls(AtomicUsize::new(0)));
        let mut poller = RefreshPoller::new(config);
        let started = Instant::now();
        poller.start(identity(), Arc::clone(&source));

        assert_eq!(poller.wait_settled().await, Some(PollOutcome::NoNewContent));
        assert_settled_at_deadline(started, config);
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        assert_eq!(poller.state(), PollerState::Settling);
    }

    #[tokio::test]
    async fn test_wait_settled_when_idle() {
        let mut poller = RefreshPoller::new(PollerConfig::default());
        assert_eq!(poller.wait_settled().await, None);
    }
}
