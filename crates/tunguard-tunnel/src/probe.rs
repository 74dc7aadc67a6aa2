use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::debug;
use tunguard_types::{HealthResult, TunguardError, TunguardResult, HEALTH_BODY_LIMIT};

/// One outbound connectivity check per call.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> HealthResult;
}

/// Fetches a "what is my IP" style endpoint and compares the answer against
/// the expected egress identities.
pub struct HttpHealthProbe {
    client: Client,
    url: String,
    expected: Vec<String>,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration, expected: Vec<String>) -> TunguardResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| TunguardError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            expected: expected
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        })
    }

    async fn fetch(&self) -> Result<(StatusCode, String), String> {
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;
        let status = response.status();

        let mut body = Vec::with_capacity(256);
        while body.len() < HEALTH_BODY_LIMIT {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = HEALTH_BODY_LIMIT - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("body read from {} interrupted: {}", self.url, e);
                    break;
                }
            }
        }

        Ok((status, String::from_utf8_lossy(&body).trim().to_string()))
    }
}

#[async_trait]
impl HealthCheck for HttpHealthProbe {
    async fn check(&self) -> HealthResult {
        let started = Instant::now();
        let fetched = self.fetch().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match fetched {
            Ok((status, body)) => {
                let (ok, error) = evaluate(status.as_u16(), &body, &self.expected);
                HealthResult {
                    ok,
                    url: self.url.clone(),
                    status_code: status.as_u16(),
                    body,
                    latency_ms,
                    error,
                }
            }
            Err(e) => HealthResult {
                latency_ms,
                ..HealthResult::failed(self.url.clone(), e)
            },
        }
    }
}

/// Single probe without keeping a client around.
pub async fn check(url: &str, timeout: Duration, expected: &[String]) -> HealthResult {
    match HttpHealthProbe::new(url, timeout, expected.to_vec()) {
        Ok(probe) => probe.check().await,
        Err(e) => HealthResult::failed(url, e.to_string()),
    }
}

/// HTTP 200 with a non-empty body, and if identities are expected, the
/// trimmed body must equal one of them.
pub fn evaluate(status: u16, body: &str, expected: &[String]) -> (bool, Option<String>) {
    if status != 200 {
        return (false, Some(format!("unexpected HTTP status {}", status)));
    }
    let body = body.trim();
    if body.is_empty() {
        return (false, Some("empty response body".to_string()));
    }
    if expected.is_empty() || expected.iter().any(|e| e.trim() == body) {
        return (true, None);
    }
    (
        false,
        Some(format!(
            "unexpected egress identity {:?} (expected one of [{}])",
            body,
            expected.join(", ")
        )),
    )
}
