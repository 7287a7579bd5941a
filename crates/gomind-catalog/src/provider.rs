//! Capability Provider (§4.2): selects a prompt-ready slice of capability
//! text for a given request.

use crate::catalog::Catalog;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use async_trait::async_trait;
use gomind_core::RequestMetadata;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("capability service request failed: {0}")]
    Request(String),
    #[error("capability service in cooldown after repeated failures")]
    Cooldown,
}

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn get_capabilities(&self, request: &str, metadata: &RequestMetadata) -> Result<String, ProviderError>;
}

/// Default variant: returns every capability currently known to the catalog.
pub struct DefaultCapabilityProvider {
    catalog: Arc<Catalog>,
}

impl DefaultCapabilityProvider {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CapabilityProvider for DefaultCapabilityProvider {
    async fn get_capabilities(&self, _request: &str, _metadata: &RequestMetadata) -> Result<String, ProviderError> {
        Ok(self.catalog.snapshot().await.format_for_prompt())
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    threshold: f64,
    metadata: &'a RequestMetadata,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    capabilities: String,
    #[allow(dead_code)]
    #[serde(default)]
    agents_found: Option<i64>,
}

/// Tracks request failures within a rolling window to trigger a local
/// hard-fail cooldown (§4.2 layer 1: "≥ 5 failures within 30s").
struct FailureCounter {
    window: Duration,
    threshold: usize,
    failures: Mutex<VecDeque<Instant>>,
    cooldown_until: Mutex<Option<Instant>>,
}

impl FailureCounter {
    fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            failures: Mutex::new(VecDeque::new()),
            cooldown_until: Mutex::new(None),
        }
    }

    async fn in_cooldown(&self) -> bool {
        match *self.cooldown_until.lock().await {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    async fn record_failure(&self, cooldown_duration: Duration) {
        let now = Instant::now();
        let mut failures = self.failures.lock().await;
        failures.push_back(now);
        while let Some(front) = failures.front() {
            if now.duration_since(*front) > self.window {
                failures.pop_front();
            } else {
                break;
            }
        }
        if failures.len() >= self.threshold {
            *self.cooldown_until.lock().await = Some(now + cooldown_duration);
        }
    }

    async fn record_success(&self) {
        self.failures.lock().await.clear();
    }
}

/// Service-backed variant: calls an external semantic capability search
/// endpoint with three layered resilience strategies (§4.2).
pub struct ServiceCapabilityProvider {
    endpoint: String,
    http: reqwest::Client,
    top_k: usize,
    threshold: f64,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    fallback: Arc<dyn CapabilityProvider>,
    failure_counter: FailureCounter,
}

impl ServiceCapabilityProvider {
    pub fn new(endpoint: impl Into<String>, top_k: usize, threshold: f64, fallback: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
            top_k,
            threshold,
            circuit_breaker: None,
            fallback,
            failure_counter: FailureCounter::new(Duration::from_secs(30), 5),
        }
    }

    pub fn with_circuit_breaker(mut self, cb: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(cb);
        self
    }

    async fn call_once(&self, request: &str, metadata: &RequestMetadata) -> Result<String, ProviderError> {
        let body = SearchRequest {
            query: request,
            top_k: self.top_k,
            threshold: self.threshold,
            metadata,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!("status {}", response.status())));
        }
        let parsed: SearchResponse = response.json().await.map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(parsed.capabilities)
    }

    /// Built-in retry: up to 3 attempts, exponential backoff starting at
    /// 100ms, doubling, capped at 2s (§4.2 layer 1).
    async fn call_with_retry(&self, request: &str, metadata: &RequestMetadata) -> Result<String, ProviderError> {
        if self.failure_counter.in_cooldown().await {
            return Err(ProviderError::Cooldown);
        }

        let mut backoff = Duration::from_millis(100);
        let max_backoff = Duration::from_secs(2);
        let mut last_err = None;
        for attempt in 0..3 {
            match self.call_once(request, metadata).await {
                Ok(text) => {
                    self.failure_counter.record_success().await;
                    return Ok(text);
                }
                Err(err) => {
                    last_err = Some(err);
                    if attempt < 2 {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(max_backoff);
                    }
                }
            }
        }
        self.failure_counter.record_failure(Duration::from_secs(30)).await;
        Err(last_err.unwrap())
    }

    pub async fn health_check(&self) -> bool {
        let health_url = format!("{}/health", self.endpoint.trim_end_matches('/'));
        matches!(self.http.get(health_url).send().await, Ok(resp) if resp.status().is_success())
    }
}

#[async_trait]
impl CapabilityProvider for ServiceCapabilityProvider {
    async fn get_capabilities(&self, request: &str, metadata: &RequestMetadata) -> Result<String, ProviderError> {
        let primary_result = if let Some(cb) = &self.circuit_breaker {
            // Layer 2 bypasses the built-in retry counter entirely per §4.2.
            cb.call(|| self.call_once(request, metadata))
                .await
                .map_err(|e| match e {
                    CircuitBreakerError::Open => ProviderError::Cooldown,
                    CircuitBreakerError::Inner(inner) => inner,
                })
        } else {
            self.call_with_retry(request, metadata).await
        };

        match primary_result {
            Ok(text) => Ok(text),
            Err(err) => {
                warn!(error = %err, "capability service unavailable, falling back");
                self.fallback.get_capabilities(request, metadata).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFallback;

    #[async_trait]
    impl CapabilityProvider for AlwaysFallback {
        async fn get_capabilities(&self, _request: &str, _metadata: &RequestMetadata) -> Result<String, ProviderError> {
            Ok("fallback-capabilities".to_string())
        }
    }

    #[tokio::test]
    async fn falls_back_when_service_unreachable() {
        let provider =
            ServiceCapabilityProvider::new("http://127.0.0.1:1", 20, 0.7, Arc::new(AlwaysFallback));
        let result = provider.get_capabilities("find weather agents", &RequestMetadata::default()).await;
        assert_eq!(result.unwrap(), "fallback-capabilities");
    }
}
