use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    Json,
};
use codebench_core::RunState;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::dto::{RunRequest, RunStartedResponse, RunStatusResponse};
use crate::error::AppError;
use crate::state::{AppState, RunRecord};

/// Accept a run and execute it in the background; progress goes to the
/// request's callback URL.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunStartedResponse>, AppError> {
    req.validate()?;
    let config = req.to_config();

    let pruned = state.prune_finished(Instant::now());
    if pruned > 0 {
        debug!("Forgot {} finished runs", pruned);
    }

    match state.runs.entry(config.run_id.clone()) {
        Entry::Occupied(existing) if !existing.get().state.is_terminal() => {
            return Err(AppError::Conflict(format!("Run {} is already in progress", config.run_id)));
        }
        Entry::Occupied(mut existing) => {
            existing.insert(RunRecord::new(RunState::Initialized));
        }
        Entry::Vacant(slot) => {
            slot.insert(RunRecord::new(RunState::Initialized));
        }
    }

    info!("Accepted run {} for {} ({})", config.run_id, config.model_name, config.provider_id);

    let run_id = config.run_id.clone();
    let api_keys = req.api_keys;
    let task_state = state.clone();
    tokio::spawn(async move {
        task_state.set_run_state(&config.run_id, RunState::Running);

        let (events, delivery) = task_state.notifier.spawn(config.callback_url.clone());
        let final_state = task_state.runner.run(&config, &api_keys, &events).await;
        drop(events);

        task_state.set_run_state(&config.run_id, final_state);
        if let Ok(stats) = delivery.await {
            info!(
                "Run {} callbacks: {} delivered, {} failed",
                config.run_id, stats.delivered, stats.failed
            );
        }
    });

    Ok(Json(RunStartedResponse {
        status: "started",
        run_id,
    }))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatusResponse>, AppError> {
    let run_state = state
        .run_state(&run_id)
        .ok_or_else(|| AppError::NotFound(format!("Unknown run: {run_id}")))?;

    Ok(Json(RunStatusResponse {
        run_id,
        state: run_state,
    }))
}
