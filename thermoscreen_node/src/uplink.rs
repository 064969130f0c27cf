// THEORY:
// The controller loop must never wait on the network. Readings go into a small
// bounded queue with `try_send`; a single background task drains it and POSTs
// each reading to the collector. When the queue is full the new reading is
// dropped and logged, because the next cycle will produce a fresher one anyway.
// A failed POST is retried a couple of times with a growing delay, then dropped.

use serde::Serialize;
use std::time::Duration;
use thermoscreen::Reading;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 2;
const RETRY_DELAY_MS: u64 = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Body of one collector submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubmitReading {
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Distance")]
    pub distance: i64,
}

impl SubmitReading {
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            temperature: (reading.temperature * 10.0).round() / 10.0,
            distance: i64::from(reading.distance_cm),
        }
    }
}

pub struct Uplink {
    sender: mpsc::Sender<SubmitReading>,
    dropped: u64,
}

impl Uplink {
    /// Starts the submit task. Without a collector URL readings are only logged.
    pub fn spawn(url: Option<String>, capacity: usize) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (sender, mut receiver) = mpsc::channel::<SubmitReading>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(submission) = receiver.recv().await {
                match url.as_deref() {
                    Some(url) => post_with_retry(&client, url, &submission).await,
                    None => tracing::info!(
                        temperature = submission.temperature,
                        distance = submission.distance,
                        "reading (no collector configured)"
                    ),
                }
            }
            tracing::debug!("uplink queue closed");
        });

        Ok((Self { sender, dropped: 0 }, worker))
    }

    /// Queues a reading without waiting. Returns false if it was dropped.
    pub fn submit(&mut self, reading: &Reading) -> bool {
        let submission = SubmitReading::from_reading(reading);
        match self.sender.try_send(submission) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "uplink queue full, reading dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped += 1;
                tracing::warn!("uplink task has stopped, reading dropped");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

async fn post_with_retry(client: &reqwest::Client, url: &str, submission: &SubmitReading) {
    let mut retries = 0;
    loop {
        let result = client
            .post(url)
            .json(submission)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(_) => {
                tracing::debug!(temperature = submission.temperature, "reading submitted");
                return;
            }
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                tracing::debug!(error = %e, retries, "collector request failed, retrying");
                sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(retries))).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "collector unreachable, reading dropped");
                return;
            }
        }
    }
}
