//! HTTP connectivity and health checks for the production target

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ConnectionProvider, ConnectionReport, ConnectionStatus, HealthReport};
use crate::config::{EngineConfig, ServiceEndpoint};
use crate::http::HttpClient;

/// Probes every configured service with read-only requests
pub struct HttpConnectionProvider {
    client: HttpClient,
    services: Vec<ServiceEndpoint>,
    statuses: Mutex<HashMap<String, ConnectionStatus>>,
    max_age: Duration,
    slow_response_ms: u64,
}

impl HttpConnectionProvider {
    pub fn new(client: HttpClient, services: Vec<ServiceEndpoint>) -> Self {
        Self {
            client,
            services,
            statuses: Mutex::new(HashMap::new()),
            max_age: Duration::from_secs(300),
            slow_response_ms: 10_000,
        }
    }

    /// Build a provider for the target and thresholds of `config`
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let client = HttpClient::with_timeout(config.execution.test_timeout())?
            .base_url(config.target.base_url.clone());

        let mut services = config.target.services.clone();
        if services.is_empty() && !config.target.base_url.is_empty() {
            services.push(ServiceEndpoint::new("target", config.target.base_url.clone()));
        }

        Ok(Self {
            max_age: Duration::from_secs(config.monitoring.health_max_age_secs),
            slow_response_ms: config.monitoring.slow_response_ms,
            ..Self::new(client, services)
        })
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.lock().values().cloned().collect()
    }

    async fn probe(&self, service: &ServiceEndpoint) -> ConnectionStatus {
        debug!("Probing {} at {}", service.name, service.url);
        let last_checked = Utc::now();

        match self.client.head(&service.url).await {
            Ok(response) if response.is_available() || response.status_code == 405 => {
                ConnectionStatus {
                    service: service.name.clone(),
                    connected: true,
                    last_checked,
                    response_time_ms: response.duration_ms,
                    error: None,
                }
            }
            Ok(response) => ConnectionStatus {
                service: service.name.clone(),
                connected: false,
                last_checked,
                response_time_ms: response.duration_ms,
                error: Some(format!("HTTP {}", response.status_code)),
            },
            Err(e) => ConnectionStatus {
                service: service.name.clone(),
                connected: false,
                last_checked,
                response_time_ms: 0,
                error: Some(format!("{e:#}")),
            },
        }
    }
}

#[async_trait]
impl ConnectionProvider for HttpConnectionProvider {
    async fn test_connection(&self) -> ConnectionReport {
        info!("Testing connectivity to {} service(s)", self.services.len());

        let statuses = join_all(self.services.iter().map(|s| self.probe(s))).await;
        let report = summarize(&statuses);

        let mut stored = self.statuses.lock();
        for status in statuses {
            stored.insert(status.service.clone(), status);
        }

        report
    }

    async fn health_check(&self) -> HealthReport {
        let never_probed = self.statuses.lock().is_empty();
        if never_probed && !self.services.is_empty() {
            self.test_connection().await;
        }

        let statuses = self.statuses();
        let report = evaluate_health(&statuses, Utc::now(), self.max_age, self.slow_response_ms);
        if !report.healthy {
            warn!("Health check found {} issue(s)", report.issues.len());
        }
        report
    }
}

fn summarize(statuses: &[ConnectionStatus]) -> ConnectionReport {
    let mut report = ConnectionReport {
        success: true,
        ..ConnectionReport::default()
    };

    for status in statuses {
        report.total_response_time_ms += status.response_time_ms;
        if status.connected {
            report.connected_services.push(status.service.clone());
        } else {
            warn!(
                "Service {} unreachable: {}",
                status.service,
                status.error.as_deref().unwrap_or("unknown error")
            );
            report.failed_services.push(status.service.clone());
            report.success = false;
        }
    }
    report.details = statuses.to_vec();
    report
}

/// Turn stored connection statuses into a health report
fn evaluate_health(
    statuses: &[ConnectionStatus],
    now: DateTime<Utc>,
    max_age: Duration,
    slow_response_ms: u64,
) -> HealthReport {
    let mut report = HealthReport::healthy();
    let max_age_secs = max_age.as_secs() as i64;

    let mut sorted: Vec<&ConnectionStatus> = statuses.iter().collect();
    sorted.sort_by(|a, b| a.service.cmp(&b.service));

    for status in sorted {
        let age_secs = (now - status.last_checked).num_seconds();
        if age_secs > max_age_secs {
            report.issues.push(format!(
                "{}: connection status is stale ({}s old)",
                status.service, age_secs
            ));
            report
                .recommendations
                .push(format!("Re-run the connectivity test for {}", status.service));
        }

        if !status.connected {
            report.issues.push(format!(
                "{}: connection failed ({})",
                status.service,
                status.error.as_deref().unwrap_or("unknown error")
            ));
            report
                .recommendations
                .push(format!("Check availability of {}", status.service));
        } else if status.response_time_ms > slow_response_ms {
            report.issues.push(format!(
                "{}: slow response ({}ms)",
                status.service, status.response_time_ms
            ));
            report
                .recommendations
                .push(format!("Investigate latency of {}", status.service));
        }
    }

    report.healthy = report.issues.is_empty();
    report
}
