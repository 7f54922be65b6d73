use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WaitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// How often the crash-loop check polls the workload while waiting.
    #[serde(default = "default_crash_check_interval")]
    pub crash_check_interval_seconds: u64,
    /// Sub-second precision override; never read from or written to disk.
    #[serde(skip)]
    pub(crate) timeout_override: Option<Duration>,
}

const MIN_TIMEOUT: Duration = Duration::from_millis(1);

fn default_timeout_seconds() -> u64 {
    600
}

fn default_crash_check_interval() -> u64 {
    5
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            crash_check_interval_seconds: default_crash_check_interval(),
            timeout_override: None,
        }
    }
}

impl WaitConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| Duration::from_secs(self.timeout_seconds))
    }

    /// Replace the timeout for this copy only. Anything under a millisecond
    /// is raised to one so a wait always gets a chance to observe the store.
    pub fn override_timeout(&mut self, timeout: Duration) {
        self.timeout_override = Some(timeout.max(MIN_TIMEOUT));
    }

    pub fn crash_check_interval(&self) -> Duration {
        Duration::from_secs(self.crash_check_interval_seconds.max(1))
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_millis")]
    pub backoff_millis: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_millis() -> u64 {
    10
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_millis: default_backoff_millis(),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_millis)
    }
}

// ---------------------------------------------------------------------------
// BulkConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Upper bound on workloads transitioned at once within one wave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
}

impl OrchestratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OrchestratorError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: OrchestratorConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::write_config_file(path, &data)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.wait.timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "wait.timeout_seconds is 0: every wait would time out immediately"
                    .to_string(),
            });
        }

        if self.wait.crash_check_interval_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "wait.crash_check_interval_seconds is 0; using 1".to_string(),
            });
        } else if self.wait.crash_check_interval_seconds >= self.wait.timeout_seconds
            && self.wait.timeout_seconds > 0
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "crash-loop check interval ({}s) is not shorter than the wait timeout ({}s); \
                     crash loops will only surface as timeouts",
                    self.wait.crash_check_interval_seconds, self.wait.timeout_seconds
                ),
            });
        }

        if self.retry.max_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }

        if self.bulk.max_concurrency == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "bulk.max_concurrency must be at least 1 when set".to_string(),
            });
        }

        warnings
    }

    /// Fail on the first error-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(OrchestratorError::Config(w.message)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
