use std::time::Duration;

use codebench_core::RunEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
}

/// Posts run events to a callback URL, at most once each.
///
/// Events are queued on an unbounded channel and sent in order by a
/// per-run task, so a slow or failing endpoint never stalls the run.
#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for CallbackNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TIMEOUT)
    }
}

impl CallbackNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn spawn(
        &self,
        callback_url: Option<String>,
    ) -> (mpsc::UnboundedSender<RunEvent>, JoinHandle<DeliveryStats>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RunEvent>();
        let notifier = self.clone();

        let task = tokio::spawn(async move {
            let mut stats = DeliveryStats::default();
            while let Some(event) = rx.recv().await {
                let Some(url) = callback_url.as_deref() else {
                    stats.dropped += 1;
                    continue;
                };
                match notifier.deliver(url, &event).await {
                    Ok(()) => stats.delivered += 1,
                    Err(e) => {
                        stats.failed += 1;
                        tracing::warn!("Callback delivery failed for run {}: {}", event.run_id(), e);
                    }
                }
            }
            stats
        });

        (tx, task)
    }

    pub async fn deliver(&self, url: &str, event: &RunEvent) -> Result<(), reqwest::Error> {
        self.client
            .post(url)
            .timeout(self.timeout)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
