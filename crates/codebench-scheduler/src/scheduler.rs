use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use codebench_core::infer_provider;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::time::MissedTickBehavior;

use crate::claims::{ClaimStoreError, ClaimStoreHandle, ScheduledMinute};
use crate::cron;

/// Claims older than this many minutes before the current one are purged each tick.
pub const CLAIM_RETENTION_MINUTES: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Claims(#[from] ClaimStoreError),
}

/// A configured recurring run, as served by the schedule API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default, alias = "modelId")]
    pub model_id: String,
    #[serde(default, alias = "cronExpression")]
    pub cron_expression: String,
    #[serde(default, alias = "isPaused", deserialize_with = "truthy")]
    pub is_paused: bool,
    #[serde(default, alias = "sampleSize")]
    pub sample_size: Option<i64>,
    #[serde(default, alias = "modelName")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl Schedule {
    fn is_runnable(&self) -> bool {
        !self.is_paused && !self.model_id.is_empty() && !self.cron_expression.trim().is_empty()
    }
}

/// Paused flags come back from the store as booleans or 0/1.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        None => false,
    })
}

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch_schedules(&self) -> Result<Vec<Schedule>, SchedulerError>;
}

#[async_trait]
pub trait RunDispatcher: Send + Sync {
    /// Start a run for `schedule`; returns the new run id.
    async fn dispatch(&self, schedule: &Schedule, minute: ScheduledMinute) -> Result<String, SchedulerError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub scheduled_minute: Option<ScheduledMinute>,
    pub triggered: Vec<String>,
    pub skipped_duplicates: Vec<String>,
    pub failed: Vec<String>,
    pub removed_claims: usize,
}

pub struct Scheduler {
    source: Arc<dyn ScheduleSource>,
    dispatcher: Arc<dyn RunDispatcher>,
    claims: ClaimStoreHandle,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        dispatcher: Arc<dyn RunDispatcher>,
        claims: ClaimStoreHandle,
    ) -> Self {
        Self {
            source,
            dispatcher,
            claims,
        }
    }

    /// Evaluate every schedule against the minute containing `now`.
    ///
    /// A run is dispatched only after its claim succeeds; a failed dispatch
    /// keeps the claim, so each minute triggers at most once.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let minute = ScheduledMinute::new(now);
        let mut report = TickReport {
            scheduled_minute: Some(minute),
            ..TickReport::default()
        };

        report.removed_claims = self
            .claims
            .cleanup(ScheduledMinute::new(minute.as_datetime() - Duration::minutes(CLAIM_RETENTION_MINUTES)))
            .await?;

        let schedules = self.source.fetch_schedules().await?;

        for schedule in schedules.iter().filter(|s| s.is_runnable()) {
            if !cron::matches(&schedule.cron_expression, minute.as_datetime()) {
                continue;
            }

            if !self.claims.claim(&schedule.model_id, minute).await? {
                tracing::debug!("Skipping {} - already triggered at {}", schedule.model_id, minute);
                report.skipped_duplicates.push(schedule.model_id.clone());
                continue;
            }

            match self.dispatcher.dispatch(schedule, minute).await {
                Ok(run_id) => {
                    tracing::info!("Triggered {} at {} (run {})", schedule.model_id, minute, run_id);
                    report.triggered.push(schedule.model_id.clone());
                }
                Err(e) => {
                    tracing::error!("Failed to trigger {}: {}", schedule.model_id, e);
                    report.failed.push(schedule.model_id.clone());
                }
            }
        }

        Ok(report)
    }

    /// Tick on a fixed interval forever. Errors are logged and the tick skipped.
    pub async fn run(self: Arc<Self>, interval: StdDuration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("Scheduler ticking every {:?}", interval);

        loop {
            ticker.tick().await;
            match self.tick(Utc::now()).await {
                Ok(report) if report.triggered.is_empty() => {
                    tracing::debug!("No schedules triggered");
                }
                Ok(report) => tracing::info!("Triggered {} runs", report.triggered.len()),
                Err(e) => tracing::error!("Scheduler tick skipped: {}", e),
            }
        }
    }
}

// =============================================================================
// HTTP implementations
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum SchedulesPayload {
    List(Vec<Schedule>),
    Wrapped { schedules: Vec<Schedule> },
}

pub struct HttpScheduleSource {
    url: String,
    client: reqwest::Client,
}

impl HttpScheduleSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ScheduleSource for HttpScheduleSource {
    async fn fetch_schedules(&self) -> Result<Vec<Schedule>, SchedulerError> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(SchedulerError::Status {
                url: self.url.clone(),
                status: resp.status().as_u16(),
            });
        }

        Ok(match resp.json::<SchedulesPayload>().await? {
            SchedulesPayload::List(schedules) => schedules,
            SchedulesPayload::Wrapped { schedules } => schedules,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchBody<'a> {
    run_id: String,
    model_id: &'a str,
    model_name: &'a str,
    provider: &'a str,
    sample_size: i64,
    callback_url: &'a str,
}

/// Starts runs by posting to a runner's `/run` endpoint.
pub struct HttpRunDispatcher {
    runner_url: String,
    callback_url: String,
    client: reqwest::Client,
}

impl HttpRunDispatcher {
    pub fn new(runner_url: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            runner_url: runner_url.into(),
            callback_url: callback_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RunDispatcher for HttpRunDispatcher {
    async fn dispatch(&self, schedule: &Schedule, minute: ScheduledMinute) -> Result<String, SchedulerError> {
        let model_name = schedule.model_name.as_deref().unwrap_or(&schedule.model_id);
        let body = DispatchBody {
            run_id: uuid::Uuid::new_v4().to_string(),
            model_id: &schedule.model_id,
            model_name,
            provider: schedule.provider.as_deref().unwrap_or_else(|| infer_provider(model_name)),
            sample_size: schedule.sample_size.unwrap_or(0),
            callback_url: &self.callback_url,
        };

        let url = format!("{}/run", self.runner_url.trim_end_matches('/'));
        tracing::debug!("Dispatching {} for {} to {}", body.run_id, minute, url);

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(SchedulerError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(body.run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::TimeZone;

    use crate::claims::ClaimStore;

    struct FixedSchedules(Mutex<Option<Vec<Schedule>>>);

    impl FixedSchedules {
        fn new(schedules: Vec<Schedule>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Some(schedules))))
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self(Mutex::new(None)))
        }
    }

    #[async_trait]
    impl ScheduleSource for FixedSchedules {
        async fn fetch_schedules(&self) -> Result<Vec<Schedule>, SchedulerError> {
            self.0.lock().unwrap().clone().ok_or_else(|| SchedulerError::Status {
                url: "http://schedules".into(),
                status: 502,
            })
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        dispatched: Mutex<Vec<(String, ScheduledMinute)>>,
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl RunDispatcher for RecordingDispatcher {
        async fn dispatch(&self, schedule: &Schedule, minute: ScheduledMinute) -> Result<String, SchedulerError> {
            if self.fail_for == Some(schedule.model_id.as_str()) {
                return Err(SchedulerError::Status {
                    url: "http://runner/run".into(),
                    status: 500,
                });
            }
            self.dispatched.lock().unwrap().push((schedule.model_id.clone(), minute));
            Ok(format!("run-{}", schedule.model_id))
        }
    }

    fn schedule(model_id: &str, cron: &str) -> Schedule {
        Schedule {
            model_id: model_id.into(),
            cron_expression: cron.into(),
            ..Schedule::default()
        }
    }

    fn six_am(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, second).unwrap()
    }

    #[tokio::test]
    async fn test_same_minute_triggers_once() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let scheduler = Scheduler::new(
            FixedSchedules::new(vec![schedule("claude", "0 6 * * *"), schedule("gpt", "30 6 * * *")]),
            dispatcher.clone(),
            ClaimStore::spawn(),
        );

        let first = scheduler.tick(six_am(5)).await.unwrap();
        assert_eq!(first.triggered, ["claude"]);

        let retry = scheduler.tick(six_am(40)).await.unwrap();
        assert!(retry.triggered.is_empty());
        assert_eq!(retry.skipped_duplicates, ["claude"]);

        let dispatched = dispatcher.dispatched.lock().unwrap();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].1, ScheduledMinute::new(six_am(0)));
    }

    #[tokio::test]
    async fn test_two_schedulers_share_claims() {
        let claims = ClaimStore::spawn();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let schedules = vec![schedule("claude", "* * * * *")];

        let a = Scheduler::new(FixedSchedules::new(schedules.clone()), dispatcher.clone(), claims.clone());
        let b = Scheduler::new(FixedSchedules::new(schedules), dispatcher.clone(), claims);

        let (ra, rb) = tokio::join!(a.tick(six_am(1)), b.tick(six_am(2)));
        let total = ra.unwrap().triggered.len() + rb.unwrap().triggered.len();
        assert_eq!(total, 1);
        assert_eq!(dispatcher.dispatched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_paused_and_incomplete_schedules_skipped() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let paused = Schedule {
            is_paused: true,
            ..schedule("paused", "* * * * *")
        };
        let scheduler = Scheduler::new(
            FixedSchedules::new(vec![paused, schedule("", "* * * * *"), schedule("no-cron", " ")]),
            dispatcher.clone(),
            ClaimStore::spawn(),
        );

        let report = scheduler.tick(six_am(0)).await.unwrap();
        assert!(report.triggered.is_empty());
        assert!(report.skipped_duplicates.is_empty());
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_claim() {
        let dispatcher = Arc::new(RecordingDispatcher {
            fail_for: Some("claude"),
            ..RecordingDispatcher::default()
        });
        let scheduler = Scheduler::new(
            FixedSchedules::new(vec![schedule("claude", "* * * * *")]),
            dispatcher,
            ClaimStore::spawn(),
        );

        assert_eq!(scheduler.tick(six_am(0)).await.unwrap().failed, ["claude"]);
        assert_eq!(scheduler.tick(six_am(30)).await.unwrap().skipped_duplicates, ["claude"]);
    }

    #[tokio::test]
    async fn test_fetch_error_skips_tick() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let scheduler = Scheduler::new(FixedSchedules::failing(), dispatcher.clone(), ClaimStore::spawn());

        assert!(matches!(
            scheduler.tick(six_am(0)).await,
            Err(SchedulerError::Status { status: 502, .. })
        ));
        assert!(dispatcher.dispatched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_old_claims_purged() {
        let claims = ClaimStore::spawn();
        let two_hours_ago = ScheduledMinute::new(six_am(0) - Duration::hours(2));
        let forty_min_ago = ScheduledMinute::new(six_am(0) - Duration::minutes(40));
        claims.claim("claude", two_hours_ago).await.unwrap();
        claims.claim("claude", forty_min_ago).await.unwrap();

        let scheduler = Scheduler::new(
            FixedSchedules::new(Vec::new()),
            Arc::new(RecordingDispatcher::default()),
            claims.clone(),
        );

        assert_eq!(scheduler.tick(six_am(0)).await.unwrap().removed_claims, 1);
        assert_eq!(claims.len().await.unwrap(), 1);
    }

    #[test]
    fn test_schedule_wire_forms() {
        let rows: Vec<Schedule> = serde_json::from_str(
            r#"[
                {"model_id": "claude", "cron_expression": "0 6 * * *", "is_paused": 0, "sample_size": 50},
                {"modelId": "gpt", "cronExpression": "0 7 * * *", "isPaused": true},
                {"model_id": "o3", "cron_expression": "0 8 * * *", "is_paused": null}
            ]"#,
        )
        .unwrap();

        assert!(!rows[0].is_paused);
        assert_eq!(rows[0].sample_size, Some(50));
        assert!(rows[1].is_paused);
        assert_eq!(rows[1].model_id, "gpt");
        assert!(!rows[2].is_paused);
    }

    mod http {
        use super::*;
        use axum::{routing::{get, post}, Json, Router};
        use serde_json::{json, Value};

        async fn serve(router: Router) -> String {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });
            format!("http://{addr}")
        }

        #[tokio::test]
        async fn test_schedule_source_accepts_wrapped_list() {
            let router = Router::new().route(
                "/api/schedules",
                get(|| async {
                    Json(json!({"schedules": [{"model_id": "claude", "cron_expression": "0 6 * * *", "is_paused": 1}]}))
                }),
            );
            let base = serve(router).await;

            let schedules = HttpScheduleSource::new(format!("{base}/api/schedules"))
                .fetch_schedules()
                .await
                .unwrap();
            assert_eq!(schedules.len(), 1);
            assert!(schedules[0].is_paused);
        }

        #[tokio::test]
        async fn test_dispatcher_posts_run_request() {
            let seen: Arc<Mutex<Option<Value>>> = Arc::default();
            let sink = seen.clone();
            let router = Router::new().route(
                "/run",
                post(move |Json(body): Json<Value>| async move {
                    *sink.lock().unwrap() = Some(body.clone());
                    Json(json!({"status": "started", "runId": body["runId"]}))
                }),
            );
            let base = serve(router).await;

            let dispatcher = HttpRunDispatcher::new(format!("{base}/"), "https://results.example/callback");
            let schedule = Schedule {
                sample_size: Some(25),
                ..schedule("gpt-4.1", "* * * * *")
            };
            let run_id = dispatcher.dispatch(&schedule, ScheduledMinute::new(six_am(0))).await.unwrap();

            let body = seen.lock().unwrap().clone().unwrap();
            assert_eq!(body["runId"], run_id.as_str());
            assert_eq!(body["modelId"], "gpt-4.1");
            assert_eq!(body["modelName"], "gpt-4.1");
            assert_eq!(body["provider"], "openai");
            assert_eq!(body["sampleSize"], 25);
            assert_eq!(body["callbackUrl"], "https://results.example/callback");
            assert!(uuid::Uuid::parse_str(&run_id).is_ok());
        }
    }
}
