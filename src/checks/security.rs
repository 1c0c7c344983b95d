//! Security header check

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::http::{HttpClient, HttpResponse};
use crate::models::{TestBody, TestContext, TestOutcome};

/// Headers every production response must carry
pub const REQUIRED_SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "x-content-type-options",
    "x-frame-options",
];

#[derive(Clone)]
pub struct SecurityHeadersCheck {
    pub url: String,
    client: Arc<HttpClient>,
}

impl SecurityHeadersCheck {
    pub fn new(client: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl TestBody for SecurityHeadersCheck {
    async fn execute(&self, _ctx: TestContext) -> Result<TestOutcome> {
        info!("Checking security headers on {}", self.url);
        let response = self.client.get(&self.url).await?;
        Ok(evaluate_security_headers(&response))
    }
}

pub fn evaluate_security_headers(response: &HttpResponse) -> TestOutcome {
    let missing: Vec<&str> = REQUIRED_SECURITY_HEADERS
        .iter()
        .copied()
        .filter(|name| response.get_header(name).is_none())
        .collect();

    let metrics = serde_json::json!({ "missing_headers": missing });
    if missing.is_empty() {
        TestOutcome::pass().with_metrics(metrics)
    } else {
        TestOutcome::fail(format!("missing security headers: {}", missing.join(", ")))
            .with_metrics(metrics)
    }
}
