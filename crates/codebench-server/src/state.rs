use std::sync::Arc;
use std::time::{Duration, Instant};

use codebench_benchmark::{BenchmarkRunner, CallbackNotifier};
use codebench_core::{RunState, ServiceConfig};
use codebench_scheduler::{ClaimStore, ClaimStoreHandle};
use dashmap::DashMap;

/// How long a finished run stays visible on `/runs/{runId}`.
pub const FINISHED_RUN_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct RunRecord {
    pub state: RunState,
    pub updated_at: Instant,
}

impl RunRecord {
    pub fn new(state: RunState) -> Self {
        Self {
            state,
            updated_at: Instant::now(),
        }
    }
}

pub struct AppState {
    pub runner: Arc<BenchmarkRunner>,
    pub notifier: CallbackNotifier,
    pub claims: ClaimStoreHandle,
    /// Last known state of runs started by this process. Finished runs are
    /// dropped after [`FINISHED_RUN_RETENTION`].
    pub runs: DashMap<String, RunRecord>,
}

impl AppState {
    pub fn new(runner: Arc<BenchmarkRunner>, notifier: CallbackNotifier, claims: ClaimStoreHandle) -> Self {
        Self {
            runner,
            notifier,
            claims,
            runs: DashMap::new(),
        }
    }

    /// Must be called inside a tokio runtime: the claim store starts here.
    pub fn from_config(config: &ServiceConfig) -> codebench_core::Result<Self> {
        let runner = BenchmarkRunner::from_config(config)?;
        Ok(Self::new(Arc::new(runner), CallbackNotifier::default(), ClaimStore::spawn()))
    }

    pub fn run_state(&self, run_id: &str) -> Option<RunState> {
        self.runs.get(run_id).map(|r| r.state)
    }

    pub fn set_run_state(&self, run_id: &str, state: RunState) {
        self.runs.insert(run_id.to_string(), RunRecord::new(state));
    }

    /// Forget runs that finished at least [`FINISHED_RUN_RETENTION`] before `now`.
    pub fn prune_finished(&self, now: Instant) -> usize {
        let before = self.runs.len();
        self.runs.retain(|_, record| {
            !record.state.is_terminal() || now.saturating_duration_since(record.updated_at) < FINISHED_RUN_RETENTION
        });
        before.saturating_sub(self.runs.len())
    }
}
