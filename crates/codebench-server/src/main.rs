mod dto;
mod error;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use axum::Router;
use codebench_core::{SchedulerConfig, ServiceConfig};
use codebench_scheduler::{ClaimStoreHandle, HttpRunDispatcher, HttpScheduleSource, Scheduler};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = ServiceConfig::from_env()?;
    let state = Arc::new(AppState::from_config(&config)?);

    if let Some(scheduler) = build_scheduler(&config.scheduler, state.claims.clone()) {
        let interval = Duration::from_secs(config.scheduler.tick_interval_secs.max(1));
        tokio::spawn(scheduler.run(interval));
    }

    let addr = format!("0.0.0.0:{}", config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let logged_routes = Router::new()
        .route("/run", post(handlers::runs::start))
        .route("/runs/{run_id}", get(handlers::runs::status))
        .route("/claim", post(handlers::claims::claim))
        .route("/cleanup", post(handlers::claims::cleanup))
        .layer(trace_layer);

    Router::new()
        .merge(logged_routes)
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// The ticker runs only when schedules, a runner and a callback target are all configured.
fn build_scheduler(config: &SchedulerConfig, claims: ClaimStoreHandle) -> Option<Arc<Scheduler>> {
    let schedules_url = config.schedules_url.as_ref()?;
    let (Some(runner_url), Some(callback_url)) = (&config.runner_url, &config.callback_url) else {
        warn!("SCHEDULES_URL is set but RUNNER_URL or SCHEDULER_CALLBACK_URL is missing; scheduler disabled");
        return None;
    };

    info!("Scheduler enabled (schedules from {})", schedules_url);
    Some(Arc::new(Scheduler::new(
        Arc::new(HttpScheduleSource::new(schedules_url.clone())),
        Arc::new(HttpRunDispatcher::new(runner_url.clone(), callback_url.clone())),
        claims,
    )))
}
