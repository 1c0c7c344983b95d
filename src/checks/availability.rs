//! Availability and latency checks
//!
//! Both issue a single GET against a service endpoint.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::http::{HttpClient, HttpResponse};
use crate::models::{TestBody, TestContext, TestOutcome};

/// Service answers with a 2xx or 3xx status
#[derive(Clone)]
pub struct AvailabilityCheck {
    pub service: String,
    pub url: String,
    client: Arc<HttpClient>,
}

impl AvailabilityCheck {
    pub fn new(
        client: Arc<HttpClient>,
        service: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl TestBody for AvailabilityCheck {
    async fn execute(&self, ctx: TestContext) -> Result<TestOutcome> {
        info!(
            "Checking availability of {} (attempt {})",
            self.service, ctx.attempt
        );
        let response = self.client.get(&self.url).await?;
        Ok(evaluate_availability(&response))
    }
}

pub fn evaluate_availability(response: &HttpResponse) -> TestOutcome {
    let metrics = serde_json::json!({
        "status_code": response.status_code,
        "response_time_ms": response.duration_ms,
    });

    if response.is_available() {
        TestOutcome::pass().with_metrics(metrics)
    } else {
        TestOutcome::fail(format!("unexpected status {}", response.status_code))
            .with_metrics(metrics)
    }
}

/// Service answers within the configured response-time limit
#[derive(Clone)]
pub struct LatencyCheck {
    pub service: String,
    pub url: String,
    pub limit_ms: u64,
    client: Arc<HttpClient>,
}

impl LatencyCheck {
    pub fn new(
        client: Arc<HttpClient>,
        service: impl Into<String>,
        url: impl Into<String>,
        limit_ms: u64,
    ) -> Self {
        Self {
            service: service.into(),
            url: url.into(),
            limit_ms,
            client,
        }
    }
}

#[async_trait]
impl TestBody for LatencyCheck {
    async fn execute(&self, _ctx: TestContext) -> Result<TestOutcome> {
        let response = self.client.get(&self.url).await?;
        debug!("{} answered in {}ms", self.service, response.duration_ms);
        Ok(evaluate_latency(&response, self.limit_ms))
    }
}

pub fn evaluate_latency(response: &HttpResponse, limit_ms: u64) -> TestOutcome {
    let metrics = serde_json::json!({
        "response_time_ms": response.duration_ms,
        "limit_ms": limit_ms,
    });

    if !response.is_available() {
        TestOutcome::fail(format!("unexpected status {}", response.status_code))
            .with_metrics(metrics)
    } else if response.duration_ms > limit_ms {
        TestOutcome::fail(format!(
            "response took {}ms, limit is {}ms",
            response.duration_ms, limit_ms
        ))
        .with_metrics(metrics)
    } else {
        TestOutcome::pass().with_metrics(metrics)
    }
}
