//! Built-in production checks
//!
//! The table of checks is assembled from the configured target at startup:
//!
//! ### Availability
//! - every service answers GET with 2xx or 3xx
//!
//! ### Performance
//! - every service answers within `monitoring.slow_response_ms`
//!   (runs after the availability check of the same service)
//!
//! ### Security
//! - the base URL sends the required security headers

mod availability;
mod security;

pub use availability::{evaluate_availability, evaluate_latency, AvailabilityCheck, LatencyCheck};
pub use security::{evaluate_security_headers, SecurityHeadersCheck, REQUIRED_SECURITY_HEADERS};

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::{EngineConfig, ServiceEndpoint};
use crate::http::HttpClient;
use crate::models::{TestDefinition, TestSuite, TestSuiteConfig};

pub const CATEGORY_AVAILABILITY: &str = "availability";
pub const CATEGORY_PERFORMANCE: &str = "performance";
pub const CATEGORY_SECURITY: &str = "security";

pub const CATEGORIES: &[&str] = &[CATEGORY_AVAILABILITY, CATEGORY_PERFORMANCE, CATEGORY_SECURITY];

/// Services checked for the configured target
fn target_services(config: &EngineConfig) -> Vec<ServiceEndpoint> {
    if config.target.services.is_empty() && !config.target.base_url.is_empty() {
        vec![ServiceEndpoint::new("target", config.target.base_url.clone())]
    } else {
        config.target.services.clone()
    }
}

/// All built-in checks for the configured target
pub fn builtin_tests(config: &EngineConfig, client: Arc<HttpClient>) -> Vec<TestDefinition> {
    let execution = &config.execution;
    let mut tests = Vec::new();

    for service in target_services(config) {
        let availability_id = format!("availability.{}", service.name);
        tests.push(
            TestDefinition::new(
                availability_id.clone(),
                format!("{} availability", service.name),
                CATEGORY_AVAILABILITY,
                AvailabilityCheck::new(client.clone(), &service.name, &service.url),
            )
            .description(format!("GET {} answers with 2xx or 3xx", service.url)),
        );
        tests.push(
            TestDefinition::new(
                format!("latency.{}", service.name),
                format!("{} latency", service.name),
                CATEGORY_PERFORMANCE,
                LatencyCheck::new(
                    client.clone(),
                    &service.name,
                    &service.url,
                    config.monitoring.slow_response_ms,
                ),
            )
            .description(format!(
                "GET {} answers within {}ms",
                service.url, config.monitoring.slow_response_ms
            ))
            .depends_on(availability_id),
        );
    }

    if !config.target.base_url.is_empty() {
        tests.push(
            TestDefinition::new(
                "security.headers",
                "Security headers",
                CATEGORY_SECURITY,
                SecurityHeadersCheck::new(client, config.target.base_url.clone()),
            )
            .description("Responses carry HSTS, nosniff and frame-options headers"),
        );
    }

    tests
        .into_iter()
        .map(|t| {
            t.timeout(execution.test_timeout())
                .retries(execution.retry_count)
        })
        .collect()
}

/// Build the built-in suite, optionally restricted to one category.
///
/// Dependencies pointing outside the selected category are dropped.
pub fn builtin_suite(
    config: &EngineConfig,
    suite_config: TestSuiteConfig,
    category: Option<&str>,
) -> Result<TestSuite> {
    if let Some(category) = category {
        if !CATEGORIES.contains(&category) {
            bail!(
                "Unknown category '{}', expected one of: {}",
                category,
                CATEGORIES.join(", ")
            );
        }
    }

    let client = Arc::new(
        HttpClient::with_timeout(config.execution.test_timeout())?
            .base_url(config.target.base_url.clone()),
    );

    let mut tests: Vec<TestDefinition> = builtin_tests(config, client)
        .into_iter()
        .filter(|t| category.map_or(true, |c| t.category == c))
        .collect();

    let ids: Vec<String> = tests.iter().map(|t| t.id.clone()).collect();
    for test in &mut tests {
        test.dependencies.retain(|dep| ids.contains(dep));
    }

    let id = match category {
        Some(category) => format!("builtin.{category}"),
        None => "builtin".to_string(),
    };
    Ok(TestSuite::new(id, "Production checks", suite_config)
        .description(format!("Read-only checks against {}", config.target.base_url))
        .with_tests(tests))
}
