//! Environment variable configuration
//!
//! Provides environment variable overrides for the engine configuration.

use std::env;

use super::EngineConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "PROD_TEST";

/// Overrides read from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Region from PROD_TEST_REGION
    pub region: Option<String>,
    /// Target base URL from PROD_TEST_BASE_URL
    pub base_url: Option<String>,
    /// Concurrency limit from PROD_TEST_MAX_CONCURRENT
    pub max_concurrent: Option<usize>,
    /// Per-test timeout from PROD_TEST_TIMEOUT_MS
    pub timeout_ms: Option<u64>,
    /// Retry count from PROD_TEST_RETRIES
    pub retries: Option<u32>,
    /// Fail fast from PROD_TEST_FAIL_FAST
    pub fail_fast: Option<bool>,
    /// Config file from PROD_TEST_CONFIG
    pub config_file: Option<String>,
    /// Output format from PROD_TEST_FORMAT
    pub format: Option<String>,
    /// Verbose from PROD_TEST_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load overrides from environment variables
    pub fn load() -> Self {
        Self {
            region: get_env("REGION"),
            base_url: get_env("BASE_URL"),
            max_concurrent: get_env_parse("MAX_CONCURRENT"),
            timeout_ms: get_env_parse("TIMEOUT_MS"),
            retries: get_env_parse("RETRIES"),
            fail_fast: get_env_bool("FAIL_FAST"),
            config_file: get_env("CONFIG"),
            format: get_env("FORMAT"),
            verbose: get_env_bool("VERBOSE"),
        }
    }

    /// Check if any override is set
    pub fn has_any(&self) -> bool {
        self.region.is_some()
            || self.base_url.is_some()
            || self.max_concurrent.is_some()
            || self.timeout_ms.is_some()
            || self.retries.is_some()
            || self.fail_fast.is_some()
            || self.config_file.is_some()
            || self.format.is_some()
            || self.verbose.is_some()
    }

    /// Apply the overrides onto a loaded configuration.
    ///
    /// Safety flags are deliberately not overridable from the environment.
    pub fn apply_to(&self, config: &mut EngineConfig) {
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.target.base_url = base_url.clone();
        }
        if let Some(max) = self.max_concurrent {
            config.execution.max_concurrent_tests = max;
        }
        if let Some(timeout) = self.timeout_ms {
            config.execution.test_timeout_ms = timeout;
        }
        if let Some(retries) = self.retries {
            config.execution.retry_count = retries;
        }
        if let Some(fail_fast) = self.fail_fast {
            config.execution.fail_fast = fail_fast;
        }
    }

    /// Print current environment overrides
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_REGION:         {:?}", ENV_PREFIX, self.region);
        println!("  {}_BASE_URL:       {:?}", ENV_PREFIX, self.base_url);
        println!("  {}_MAX_CONCURRENT: {:?}", ENV_PREFIX, self.max_concurrent);
        println!("  {}_TIMEOUT_MS:     {:?}", ENV_PREFIX, self.timeout_ms);
        println!("  {}_RETRIES:        {:?}", ENV_PREFIX, self.retries);
        println!("  {}_FAIL_FAST:      {:?}", ENV_PREFIX, self.fail_fast);
        println!("  {}_CONFIG:         {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_FORMAT:         {:?}", ENV_PREFIX, self.format);
        println!("  {}_VERBOSE:        {:?}", ENV_PREFIX, self.verbose);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all PROD_TEST environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_REGION          Target region (must be ap-northeast-1)");
    println!("  {ENV_PREFIX}_BASE_URL        Base URL of the production service");
    println!("  {ENV_PREFIX}_MAX_CONCURRENT  Maximum concurrently running tests");
    println!("  {ENV_PREFIX}_TIMEOUT_MS      Per-test timeout in milliseconds");
    println!("  {ENV_PREFIX}_RETRIES         Retries per test after the first attempt");
    println!("  {ENV_PREFIX}_FAIL_FAST       Stop at the first failing test (true/false)");
    println!("  {ENV_PREFIX}_CONFIG          Path to configuration file");
    println!("  {ENV_PREFIX}_FORMAT          Output format (table, json, csv, summary)");
    println!("  {ENV_PREFIX}_VERBOSE         Enable verbose output (true/false)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_BASE_URL=https://app.example.com");
    println!("  prod-test-engine run --parallel --concurrent 3");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for the lifetime of the guard
    struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let previous = vars
                .iter()
                .map(|(k, v)| {
                    let key = format!("{ENV_PREFIX}_{k}");
                    let old = env::var(&key).ok();
                    env::set_var(&key, v);
                    (key, old)
                })
                .collect();
            Self { previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_overrides_apply() {
        let _guard = EnvGuard::set(&[
            ("BASE_URL", "https://app.example.com"),
            ("MAX_CONCURRENT", "3"),
            ("RETRIES", "1"),
            ("FAIL_FAST", "yes"),
        ]);

        let overrides = EnvConfig::load();
        assert!(overrides.has_any());

        let mut config = EngineConfig::default();
        overrides.apply_to(&mut config);
        assert_eq!(config.target.base_url, "https://app.example.com");
        assert_eq!(config.execution.max_concurrent_tests, 3);
        assert_eq!(config.execution.retry_count, 1);
        assert!(config.execution.fail_fast);
        assert!(config.read_only_mode);
    }

    #[test]
    fn test_unparseable_values_are_ignored() {
        let config = EnvConfig {
            timeout_ms: "soon".parse().ok(),
            ..Default::default()
        };
        assert!(config.timeout_ms.is_none());
    }
}
