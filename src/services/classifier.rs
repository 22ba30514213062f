//! Costume classification.
//!
//! The classifier model runs as a separate HTTP service taking
//! `{"images": [<base64>]}` and answering
//! `{"results": [{"label": "...", "score": 0.93}, ...]}`. Only the three
//! best labels are kept with an upload.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{Error, Result};

/// Number of labels stored per upload.
pub const TOP_LABELS: usize = 3;

/// A predicted label and its score.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f64,
}

/// Predicts costume labels for a photo.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// All labels the model returned, in any order.
    async fn classify(&self, image: &[u8]) -> Result<Vec<ScoredLabel>>;
}

/// Outcome of classifying one photo.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Best labels first, at most [`TOP_LABELS`].
    pub labels: Vec<String>,
    pub elapsed: Duration,
}

impl Classification {
    /// Label at a 0-based rank.
    pub fn label(&self, rank: usize) -> Option<String> {
        self.labels.get(rank).cloned()
    }

    /// Elapsed time as stored with an upload, e.g. `0.42s`.
    pub fn time_consuming(&self) -> String {
        format!("{:.2}s", self.elapsed.as_secs_f64())
    }
}

/// Keep the best labels, highest score first.
pub fn top_labels(mut scored: Vec<ScoredLabel>) -> Vec<String> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
        .into_iter()
        .take(TOP_LABELS)
        .map(|s| s.label)
        .collect()
}

/// Classify a photo and time the call.
pub async fn classify(classifier: &dyn Classifier, image: &[u8]) -> Result<Classification> {
    let started = Instant::now();
    let scored = classifier.classify(image).await?;
    let labels = top_labels(scored);
    let elapsed = started.elapsed();

    debug!(?labels, elapsed_ms = elapsed.as_millis() as u64, "Classified upload");
    Ok(Classification { labels, elapsed })
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    results: Vec<ScoredLabel>,
}

/// HTTP client for the costume classifier model service.
#[derive(Clone)]
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Vec<ScoredLabel>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "images": [BASE64.encode(image)] }))
            .send()
            .await
            .map_err(|e| Error::Classifier(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Classifier(format!(
                "Service returned {}: {}",
                status, body
            )));
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| Error::Classifier(format!("Invalid response: {}", e)))?;

        Ok(parsed.results)
    }
}
