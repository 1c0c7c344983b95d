//! Configuration module
//!
//! Handles loading, validating and saving the engine configuration.

mod env;

pub use env::{print_env_help, EnvConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The only region production tests may run against
pub const ALLOWED_REGION: &str = "ap-northeast-1";

/// Upper bound on concurrently running tests
pub const MAX_CONCURRENT_TESTS_LIMIT: usize = 10;

/// Engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target region
    pub region: String,

    /// Environment name, must be "production"
    pub environment: String,

    /// Credentials profile used by test bodies
    pub profile: String,

    /// Safety constraints; all three are required
    pub safety_mode: bool,
    pub read_only_mode: bool,
    pub emergency_stop_enabled: bool,

    pub execution: ExecutionSettings,
    pub monitoring: MonitoringSettings,
    pub target: TargetSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: ALLOWED_REGION.to_string(),
            environment: "production".to_string(),
            profile: "default".to_string(),
            safety_mode: true,
            read_only_mode: true,
            emergency_stop_enabled: true,
            execution: ExecutionSettings::default(),
            monitoring: MonitoringSettings::default(),
            target: TargetSettings::default(),
        }
    }
}

/// Test execution settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub max_concurrent_tests: usize,
    pub test_timeout_ms: u64,
    pub retry_count: u32,
    /// Backoff unit; attempt `n` waits `n * retry_base_delay_ms`
    pub retry_base_delay_ms: u64,
    pub fail_fast: bool,
    pub max_test_duration_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tests: 5,
            test_timeout_ms: 300_000,
            retry_count: 2,
            retry_base_delay_ms: 1_000,
            fail_fast: false,
            max_test_duration_ms: 3_600_000,
        }
    }
}

impl ExecutionSettings {
    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Health monitoring thresholds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Connection statuses older than this are reported stale
    pub health_max_age_secs: u64,
    /// Responses slower than this are reported as a health issue
    pub slow_response_ms: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            health_max_age_secs: 300,
            slow_response_ms: 10_000,
        }
    }
}

/// Production target description
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    pub base_url: String,
    pub services: Vec<ServiceEndpoint>,
}

/// A named service probed for connectivity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Errors and warnings found in a configuration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl EngineConfig {
    /// Load configuration from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Default config location under the user config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prod-test-engine")
            .join("config.yaml")
    }

    /// Full validation used by the `config validate` command
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.region != ALLOWED_REGION {
            report
                .errors
                .push(format!("region must be {ALLOWED_REGION}, got {}", self.region));
        }
        if self.environment != "production" {
            report
                .errors
                .push(format!("environment must be production, got {}", self.environment));
        }
        report.errors.extend(self.safety_violations());
        if self.target.base_url.is_empty() {
            report.errors.push("target.base_url is not set".to_string());
        }

        if self.execution.max_concurrent_tests > MAX_CONCURRENT_TESTS_LIMIT {
            report.warnings.push(format!(
                "max_concurrent_tests {} exceeds the production limit of {MAX_CONCURRENT_TESTS_LIMIT}",
                self.execution.max_concurrent_tests
            ));
        }
        if self.execution.test_timeout_ms < 30_000 {
            report
                .warnings
                .push("test_timeout_ms below 30000 may be too short".to_string());
        }

        report
    }

    /// Safety flags that must all be enabled
    pub fn safety_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if !self.safety_mode {
            violations.push("safety_mode is required for production tests".to_string());
        }
        if !self.read_only_mode {
            violations.push("read_only_mode is required for production tests".to_string());
        }
        if !self.emergency_stop_enabled {
            violations.push("emergency_stop_enabled is required for production tests".to_string());
        }
        violations
    }
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
