//! The generic event processor runtime (C8): one scheduler, reused by both
//! the outbox and views processor families, parameterized by a processor
//! key type `K`.
//!
//! Scheduling (leadership gating, status gating, empty-batch backoff,
//! cooperative cancellation) is backend-agnostic and lives here. The
//! "begin transaction, fetch, handle, advance position, commit" step
//! is not: it needs fetch, handler invocation, and the
//! progress update to share one database transaction, so it is expressed
//! as a single [`ProcessorCycle::run_cycle`] call a backend implements
//! concretely, the same way this crate keeps transaction-scoped work out
//! of backend-agnostic traits elsewhere (see `event_store`'s module doc).
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::BackoffConfig;
use crate::leader::LeaderElector;
use crate::progress::{ProcessorStatus, ProgressDetails, ProgressTracker};

/// The outcome of one fetch-handle-advance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleOutcome {
    pub events_handled: u32,
    pub new_position: i64,
}

/// Runs one transactional fetch-handle-advance cycle for a single
/// processor key.
#[async_trait]
pub trait ProcessorCycle<K>: Send + Sync
where
    K: Send + Sync,
{
    type Error: std::error::Error + Send + Sync + 'static;

    async fn run_cycle(
        &self,
        key: &K,
        after_position: i64,
        batch_size: u32,
    ) -> Result<CycleOutcome, Self::Error>;
}

/// Per-processor scheduling parameters.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    pub enabled: bool,
    pub polling_interval: Duration,
    pub batch_size: u32,
    pub max_errors: u32,
    pub retry_delay: Duration,
    pub backoff: BackoffConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval: Duration::from_millis(500),
            batch_size: 100,
            max_errors: 10,
            retry_delay: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Schedules cycles for a fixed set of processor keys, gated by leadership
/// and per-processor status, with empty-batch backoff.
pub struct ProcessorRuntime<K, C, T, L>
where
    K: Clone + Debug + Eq + std::hash::Hash + Send + Sync + 'static,
    C: ProcessorCycle<K> + 'static,
    T: ProgressTracker<K> + 'static,
    L: LeaderElector + 'static,
{
    cycle: Arc<C>,
    tracker: Arc<T>,
    elector: Arc<L>,
    instance_id: String,
    processors: HashMap<K, ProcessorConfig>,
    cancellation: CancellationToken,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<K, C, T, L> ProcessorRuntime<K, C, T, L>
where
    K: Clone + Debug + Eq + std::hash::Hash + Send + Sync + 'static,
    C: ProcessorCycle<K> + 'static,
    T: ProgressTracker<K> + 'static,
    L: LeaderElector + 'static,
{
    pub fn new(
        cycle: Arc<C>,
        tracker: Arc<T>,
        elector: Arc<L>,
        instance_id: String,
        processors: HashMap<K, ProcessorConfig>,
    ) -> Self {
        Self {
            cycle,
            tracker,
            elector,
            instance_id,
            processors,
            cancellation: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one scheduling task per enabled processor key.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for (key, config) in self.processors.iter() {
            if !config.enabled {
                continue;
            }
            let cycle = self.cycle.clone();
            let tracker = self.tracker.clone();
            let elector = self.elector.clone();
            let instance_id = self.instance_id.clone();
            let key = key.clone();
            let config = *config;
            let token = self.cancellation.clone();
            handles.push(tokio::spawn(async move {
                run_processor_loop(cycle, tracker, elector, instance_id, key, config, token).await;
            }));
        }
    }

    /// Cancels every scheduling task and waits for in-flight cycles to
    /// drain.
    pub async fn stop(&self) {
        self.cancellation.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Stops `key` from being scheduled without tearing down its task: the
    /// next status read in its loop will see `Paused` and skip.
    pub async fn pause(&self, key: &K) -> Result<(), T::Error> {
        self.tracker.set_status(key, ProcessorStatus::Paused).await
    }

    /// Restores `key` to `Active` scheduling.
    pub async fn resume(&self, key: &K) -> Result<(), T::Error> {
        self.tracker.set_status(key, ProcessorStatus::Active).await
    }

    /// Clears `key`'s error counter and restores it to `Active`, undoing
    /// an automatic `FAILED` transition.
    pub async fn reset_error_count(&self, key: &K) -> Result<(), T::Error> {
        self.tracker.reset_error_count(key).await
    }

    pub async fn get_progress_details(&self, key: &K) -> Result<ProgressDetails, T::Error> {
        self.tracker.get_progress_details(key).await
    }

    /// Runs one fetch-handle-advance cycle for `key` outside its regular
    /// polling loop, bypassing leadership and status gating - callers use
    /// this for manual/administrative ticks.
    pub async fn process(&self, key: &K) -> Result<CycleOutcome, ProcessError<C::Error, T::Error>> {
        let config = self
            .processors
            .get(key)
            .copied()
            .ok_or(ProcessError::UnknownKey)?;
        self.tracker
            .auto_register(key, &self.instance_id)
            .await
            .map_err(ProcessError::Tracker)?;
        let after_position = self
            .tracker
            .get_last_position(key)
            .await
            .map_err(ProcessError::Tracker)?;
        let outcome = self
            .cycle
            .run_cycle(key, after_position, config.batch_size)
            .await
            .map_err(ProcessError::Cycle)?;
        self.tracker
            .update_progress(key, after_position + outcome.new_position - after_position)
            .await
            .map_err(ProcessError::Tracker)?;
        Ok(outcome)
    }
}

/// Errors a manual [`ProcessorRuntime::process`] tick can surface.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError<CE, TE> {
    #[error("no processor is configured for this key")]
    UnknownKey,
    #[error("cycle failed")]
    Cycle(#[source] CE),
    #[error("progress tracker failed")]
    Tracker(#[source] TE),
}

async fn run_processor_loop<K, C, T, L>(
    cycle: Arc<C>,
    tracker: Arc<T>,
    elector: Arc<L>,
    instance_id: String,
    key: K,
    config: ProcessorConfig,
    token: CancellationToken,
) where
    K: Clone + Debug + Eq + std::hash::Hash + Send + Sync + 'static,
    C: ProcessorCycle<K> + 'static,
    T: ProgressTracker<K> + 'static,
    L: LeaderElector + 'static,
{
    let mut consecutive_empty: u32 = 0;
    loop {
        if token.is_cancelled() {
            return;
        }
        let mut next_delay = config.polling_interval;
        if elector.is_leader() {
            match run_single_cycle(&cycle, &tracker, &instance_id, &key, &config).await {
                CycleStepResult::Skipped => {}
                CycleStepResult::Empty => {
                    consecutive_empty = consecutive_empty.saturating_add(1);
                    next_delay = config.backoff.next_delay(config.polling_interval, consecutive_empty);
                }
                CycleStepResult::Handled(_) => {
                    consecutive_empty = 0;
                }
                CycleStepResult::Failed => {
                    next_delay = config.retry_delay;
                }
            }
        }
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(next_delay) => {}
        }
    }
}

enum CycleStepResult {
    Skipped,
    Empty,
    Handled(u32),
    Failed,
}

async fn run_single_cycle<K, C, T>(
    cycle: &Arc<C>,
    tracker: &Arc<T>,
    instance_id: &str,
    key: &K,
    config: &ProcessorConfig,
) -> CycleStepResult
where
    K: Clone + Debug + Eq + std::hash::Hash + Send + Sync + 'static,
    C: ProcessorCycle<K> + 'static,
    T: ProgressTracker<K> + 'static,
{
    // auto_register runs before the status read: a key's row does not
    // exist before its first poll, and get_status on a missing row is an
    // infrastructure error, not "paused" - registering first guarantees
    // the read below always has a row to find.
    if tracker.auto_register(key, instance_id).await.is_err() {
        return CycleStepResult::Skipped;
    }

    let status = match tracker.get_status(key).await {
        Ok(ProcessorStatus::Active) => ProcessorStatus::Active,
        Ok(_) => return CycleStepResult::Skipped,
        Err(_) => return CycleStepResult::Skipped,
    };
    debug_assert_eq!(status, ProcessorStatus::Active);

    let after_position = match tracker.get_last_position(key).await {
        Ok(p) => p,
        Err(_) => return CycleStepResult::Skipped,
    };

    match cycle.run_cycle(key, after_position, config.batch_size).await {
        Ok(outcome) if outcome.events_handled == 0 => {
            let _ = tracker.heartbeat(key, instance_id).await;
            CycleStepResult::Empty
        }
        Ok(outcome) => {
            let _ = tracker.heartbeat(key, instance_id).await;
            CycleStepResult::Handled(outcome.events_handled)
        }
        Err(err) => {
            let _ = tracker
                .record_error(key, &err.to_string(), config.max_errors)
                .await;
            CycleStepResult::Failed
        }
    }
}
