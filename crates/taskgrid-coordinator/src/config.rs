use serde::Deserialize;
use std::path::Path;
use taskgrid_core::{TaskgridError, TaskgridResult};

/// Static performance thresholds evaluated after every metrics update.
///
/// Owned by the coordinator instance and read-only at run time.
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceThresholds {
    /// Maximum acceptable average response time, in milliseconds.
    #[serde(default = "default_max_response_time_ms")]
    pub max_response_time_ms: f64,
    /// Minimum acceptable success rate, in percent.
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Maximum acceptable error rate, in percent.
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
    /// Maximum acceptable load percentage.
    #[serde(default = "default_max_load_percentage")]
    pub max_load_percentage: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            max_response_time_ms: default_max_response_time_ms(),
            min_success_rate: default_min_success_rate(),
            max_error_rate: default_max_error_rate(),
            max_load_percentage: default_max_load_percentage(),
        }
    }
}

fn default_max_response_time_ms() -> f64 {
    5000.0
}
fn default_min_success_rate() -> f64 {
    90.0
}
fn default_max_error_rate() -> f64 {
    10.0
}
fn default_max_load_percentage() -> f64 {
    80.0
}

/// Coordinator runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Bounded wait of the dispatcher's queue pop, in seconds. Doubles as
    /// the shutdown-check cadence when the queue is empty.
    #[serde(default = "default_queue_poll_interval_secs")]
    pub queue_poll_interval_secs: u64,
    /// Yield after re-queueing a task whose agent is saturated, in ms.
    #[serde(default = "default_saturation_backoff_ms")]
    pub saturation_backoff_ms: u64,
    /// Recovery pause after an unexpected dispatcher fault, in ms.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Silence beyond this marks an agent offline, in seconds.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// Cadence of the background liveness sweep, in seconds.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    /// Alerting thresholds.
    #[serde(default)]
    pub thresholds: PerformanceThresholds,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            queue_poll_interval_secs: default_queue_poll_interval_secs(),
            saturation_backoff_ms: default_saturation_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
            thresholds: PerformanceThresholds::default(),
        }
    }
}

fn default_queue_poll_interval_secs() -> u64 {
    1
}
fn default_saturation_backoff_ms() -> u64 {
    100
}
fn default_error_backoff_ms() -> u64 {
    1000
}
fn default_heartbeat_timeout_secs() -> u64 {
    300
}
fn default_health_check_interval_secs() -> u64 {
    60
}

impl CoordinatorConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> TaskgridResult<Self> {
        toml::from_str(raw).map_err(|e| TaskgridError::Config(format!("invalid config: {e}")))
    }

    /// Load a configuration from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> TaskgridResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            TaskgridError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.queue_poll_interval_secs, 1);
        assert_eq!(config.heartbeat_timeout_secs, 300);
        assert_eq!(config.thresholds.min_success_rate, 90.0);
        assert_eq!(config.thresholds.max_load_percentage, 80.0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            heartbeat_timeout_secs = 30

            [thresholds]
            max_response_time_ms = 250.0
            "#,
        )
        .unwrap();
        assert_eq!(config.heartbeat_timeout_secs, 30);
        assert_eq!(config.thresholds.max_response_time_ms, 250.0);
        // Everything unspecified keeps its default.
        assert_eq!(config.saturation_backoff_ms, 100);
        assert_eq!(config.thresholds.max_error_rate, 10.0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = CoordinatorConfig::from_toml_str("queue_poll_interval_secs = \"soon\"")
            .unwrap_err();
        assert!(matches!(err, TaskgridError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "health_check_interval_secs = 5").unwrap();
        let config = CoordinatorConfig::load(file.path()).await.unwrap();
        assert_eq!(config.health_check_interval_secs, 5);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = CoordinatorConfig::load("/nonexistent/taskgrid.toml")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskgridError::Config(_)));
    }
}
