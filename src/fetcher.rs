use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

use crate::config::AppConfig;
use crate::errors::{AppResult, DiscoveryError};
use crate::normalize::RawPlace;

/// Cancellation signal shared between a session and its in-flight request.
/// Cancelling is sticky: every current and future waiter observes it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

#[async_trait]
pub trait PlaceSource: Send + Sync {
    async fn execute(&self, query: &str) -> Result<Vec<RawPlace>, DiscoveryError>;
}

#[derive(Clone)]
pub struct PlaceFetcher {
    source: Arc<dyn PlaceSource>,
}

impl PlaceFetcher {
    pub fn new(source: Arc<dyn PlaceSource>) -> Self {
        Self { source }
    }

    pub async fn fetch(
        &self,
        query: &str,
        deadline: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawPlace>, DiscoveryError> {
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
            result = timeout(deadline, self.source.execute(query)) => match result {
                Ok(result) => result,
                Err(_) => Err(DiscoveryError::Timeout),
            },
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(elements) => trace!(elapsed_ms, elements = elements.len(), "fetch completed"),
            Err(DiscoveryError::Cancelled) => debug!(elapsed_ms, "fetch cancelled"),
            Err(err) => warn!(?err, elapsed_ms, "fetch failed"),
        }
        outcome
    }
}

pub struct OverpassClient {
    http: Client,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Self::new(config.overpass_endpoint.clone(), &config.http_user_agent)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<RawPlace>,
}

#[async_trait]
impl PlaceSource for OverpassClient {
    async fn execute(&self, query: &str) -> Result<Vec<RawPlace>, DiscoveryError> {
        let response = self
            .http
            .post(&self.endpoint)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::HttpError {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(classify_transport)?;
        let parsed: OverpassResponse = serde_json::from_str(&body)
            .map_err(|err| DiscoveryError::malformed(err.to_string()))?;
        Ok(parsed.elements)
    }
}

fn classify_transport(err: reqwest::Error) -> DiscoveryError {
    if err.is_timeout() {
        DiscoveryError::Timeout
    } else if err.is_decode() {
        DiscoveryError::malformed(err.to_string())
    } else {
        DiscoveryError::network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedSource, SourceStep};

    #[tokio::test]
    async fn times_out_slow_sources() {
        let source = Arc::new(ScriptedSource::new(vec![SourceStep::Hang]));
        let fetcher = PlaceFetcher::new(source.clone());
        let result = fetcher
            .fetch("q", Duration::from_millis(30), &CancelToken::new())
            .await;
        assert_eq!(result.unwrap_err(), DiscoveryError::Timeout);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_fetch() {
        let source = Arc::new(ScriptedSource::new(vec![SourceStep::Hang]));
        let fetcher = PlaceFetcher::new(source);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let result = fetcher.fetch("q", Duration::from_secs(30), &cancel).await;
        assert_eq!(result.unwrap_err(), DiscoveryError::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_the_request() {
        let source = Arc::new(ScriptedSource::new(vec![SourceStep::Respond(vec![])]));
        let fetcher = PlaceFetcher::new(source.clone());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(fetcher.fetch("q", Duration::from_secs(1), &cancel).await.is_err());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn passes_source_errors_through() {
        let source = Arc::new(ScriptedSource::new(vec![SourceStep::Fail(
            DiscoveryError::HttpError { status: 503 },
        )]));
        let fetcher = PlaceFetcher::new(source);
        let err = fetcher
            .fetch("q", Duration::from_secs(1), &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, DiscoveryError::HttpError { status: 503 });
        assert!(err.is_retryable());
    }
}
