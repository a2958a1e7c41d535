use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

const COMMAND_BUFFER: usize = 256;

pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(at)
}

/// A UTC instant truncated to the minute. Accepts any RFC 3339 timestamp on
/// the wire and drops seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "DateTime<Utc>", into = "DateTime<Utc>")]
pub struct ScheduledMinute(DateTime<Utc>);

impl ScheduledMinute {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(truncate_to_minute(at))
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for ScheduledMinute {
    fn from(at: DateTime<Utc>) -> Self {
        Self::new(at)
    }
}

impl From<ScheduledMinute> for DateTime<Utc> {
    fn from(minute: ScheduledMinute) -> Self {
        minute.0
    }
}

impl fmt::Display for ScheduledMinute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%MZ"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionClaim {
    pub model_id: String,
    pub scheduled_minute: ScheduledMinute,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimStoreError {
    #[error("Claim store is unavailable")]
    Unavailable,
}

enum Command {
    Claim {
        model_id: String,
        minute: ScheduledMinute,
        reply: oneshot::Sender<bool>,
    },
    Cleanup {
        older_than: ScheduledMinute,
        reply: oneshot::Sender<usize>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

/// Owns every claim record. Runs as a single task; commands are applied one
/// at a time in arrival order, which makes check-and-insert atomic.
///
/// Minutes below the highest cleanup threshold seen so far are refused, so a
/// key purged by `cleanup` can never be claimed a second time.
pub struct ClaimStore {
    claims: HashMap<(String, ScheduledMinute), ExecutionClaim>,
    floor: Option<ScheduledMinute>,
    commands: mpsc::Receiver<Command>,
}

impl ClaimStore {
    /// Start the store on the current runtime and return its only handle.
    pub fn spawn() -> ClaimStoreHandle {
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);
        let store = ClaimStore {
            claims: HashMap::new(),
            floor: None,
            commands,
        };
        tokio::spawn(store.run());
        ClaimStoreHandle { sender }
    }

    async fn run(mut self) {
        tracing::debug!("Claim store started");
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Claim { model_id, minute, reply } => {
                    let _ = reply.send(self.claim(model_id, minute));
                }
                Command::Cleanup { older_than, reply } => {
                    let _ = reply.send(self.cleanup(older_than));
                }
                Command::Len { reply } => {
                    let _ = reply.send(self.claims.len());
                }
            }
        }
        tracing::debug!("Claim store stopped with {} claims", self.claims.len());
    }

    fn claim(&mut self, model_id: String, minute: ScheduledMinute) -> bool {
        if self.floor.is_some_and(|floor| minute < floor) {
            tracing::debug!("Refusing stale claim for {} at {}", model_id, minute);
            return false;
        }
        match self.claims.entry((model_id, minute)) {
            Entry::Occupied(entry) => {
                tracing::debug!("Claim exists for {} at {}", entry.key().0, minute);
                false
            }
            Entry::Vacant(entry) => {
                let model_id = entry.key().0.clone();
                tracing::info!("Claimed {} at {}", model_id, minute);
                entry.insert(ExecutionClaim {
                    model_id,
                    scheduled_minute: minute,
                    claimed_at: Utc::now(),
                });
                true
            }
        }
    }

    fn cleanup(&mut self, older_than: ScheduledMinute) -> usize {
        self.floor = self.floor.max(Some(older_than));
        let before = self.claims.len();
        self.claims.retain(|_, claim| claim.scheduled_minute >= older_than);
        let removed = before - self.claims.len();
        if removed > 0 {
            tracing::info!("Removed {} claims older than {}", removed, older_than);
        }
        removed
    }
}

#[derive(Debug, Clone)]
pub struct ClaimStoreHandle {
    sender: mpsc::Sender<Command>,
}

impl ClaimStoreHandle {
    /// `true` for exactly one caller per `(model_id, minute)`.
    pub async fn claim(&self, model_id: &str, minute: ScheduledMinute) -> Result<bool, ClaimStoreError> {
        self.request(|reply| Command::Claim {
            model_id: model_id.to_string(),
            minute,
            reply,
        })
        .await
    }

    /// Drop claims with `scheduled_minute < older_than`; returns how many went.
    /// Later claims for those minutes return `false`.
    pub async fn cleanup(&self, older_than: ScheduledMinute) -> Result<usize, ClaimStoreError> {
        self.request(|reply| Command::Cleanup { older_than, reply }).await
    }

    pub async fn len(&self) -> Result<usize, ClaimStoreError> {
        self.request(|reply| Command::Len { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ClaimStoreError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| ClaimStoreError::Unavailable)?;
        response.await.map_err(|_| ClaimStoreError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn minute(h: u32, m: u32) -> ScheduledMinute {
        ScheduledMinute::new(Utc.with_ymd_and_hms(2025, 1, 15, h, m, 0).unwrap())
    }

    #[test]
    fn test_scheduled_minute_truncates() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, 42).unwrap() + Duration::milliseconds(300);
        assert_eq!(ScheduledMinute::new(at), minute(6, 0));
        assert_eq!(minute(6, 0).to_string(), "2025-01-15T06:00Z");
    }

    #[test]
    fn test_scheduled_minute_wire_format() {
        let parsed: ScheduledMinute = serde_json::from_str("\"2025-01-15T06:00:59Z\"").unwrap();
        assert_eq!(parsed, minute(6, 0));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"2025-01-15T06:00:00Z\"");
    }

    #[tokio::test]
    async fn test_second_claim_is_rejected() {
        let store = ClaimStore::spawn();
        assert!(store.claim("claude", minute(6, 0)).await.unwrap());
        assert!(!store.claim("claude", minute(6, 0)).await.unwrap());
        assert!(store.claim("claude", minute(6, 1)).await.unwrap());
        assert!(store.claim("gpt-4.1", minute(6, 0)).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_yield_one_winner() {
        let store = ClaimStore::spawn();

        let attempts: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim("claude", minute(6, 0)).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_stopped_store_is_unavailable() {
        let (sender, commands) = mpsc::channel(1);
        drop(commands);
        let handle = ClaimStoreHandle { sender };

        assert_eq!(handle.claim("claude", minute(6, 0)).await, Err(ClaimStoreError::Unavailable));
        assert_eq!(handle.cleanup(minute(6, 0)).await, Err(ClaimStoreError::Unavailable));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_threshold_and_newer() {
        let store = ClaimStore::spawn();
        for m in [0, 1, 2, 3] {
            store.claim("claude", minute(6, m)).await.unwrap();
        }

        assert_eq!(store.cleanup(minute(6, 2)).await.unwrap(), 2);
        assert_eq!(store.len().await.unwrap(), 2);

        assert!(!store.claim("claude", minute(6, 2)).await.unwrap());
        assert!(!store.claim("claude", minute(6, 3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_purged_minute_is_never_claimed_again() {
        let store = ClaimStore::spawn();
        assert!(store.claim("claude", minute(6, 0)).await.unwrap());
        assert_eq!(store.cleanup(minute(6, 2)).await.unwrap(), 1);

        assert!(!store.claim("claude", minute(6, 0)).await.unwrap());
        assert!(!store.claim("gpt-4.1", minute(6, 1)).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 0);

        // A lower threshold later does not reopen purged minutes.
        store.cleanup(minute(5, 0)).await.unwrap();
        assert!(!store.claim("claude", minute(6, 0)).await.unwrap());
        assert!(store.claim("claude", minute(6, 2)).await.unwrap());
    }
}
