use crate::error::ConfigError;
use crate::services::estimator::TransferEstimator;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;

pub const SFTP_TARGET_ENV: &str = "SFTP_TARGET";

/// Upper bound on messages per receive call imposed by the queue.
pub const MAX_BATCH_SIZE: i32 = 10;

/// Worker tuning, loaded from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue URL (takes precedence over `queue_name`)
    pub queue_url: Option<String>,

    /// Queue name, resolved to a URL at startup
    pub queue_name: Option<String>,

    /// Messages per poll, 1..=10 (default: 10)
    pub batch_size: i32,

    /// Assumed transfer throughput in MB/s (default: 1)
    pub throughput_mbps: u64,

    /// Lease safety margin percentage, 1..=100 (default: 15)
    pub margin_percent: u32,

    /// Count the source pull against the lease as well (default: true)
    pub double_for_source: bool,

    /// Multiplier applied to the estimate (default: 1)
    pub penalty_factor: u32,

    /// Pause between polling cycles in seconds (default: 1)
    pub poll_interval_secs: u64,

    /// Local bound on each pull and push; none by default
    pub operation_timeout_secs: Option<u64>,

    /// Metrics namespace (default: "S3ToSFTP")
    pub metrics_namespace: String,

    /// Verbose logging (default: false)
    pub debug: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_url: None,
            queue_name: None,
            batch_size: MAX_BATCH_SIZE,
            throughput_mbps: 1,
            margin_percent: 15,
            double_for_source: true,
            penalty_factor: 1,
            poll_interval_secs: 1,
            operation_timeout_secs: None,
            metrics_namespace: "S3ToSFTP".to_string(),
            debug: false,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            queue_url: env::var("QUEUE_URL").ok().filter(|v| !v.is_empty()),

            queue_name: env::var("QUEUE_NAME").ok().filter(|v| !v.is_empty()),

            batch_size: env::var("SQS_MAX_MESSAGES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.batch_size),

            throughput_mbps: env::var("TRANSFER_SPEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.throughput_mbps),

            margin_percent: env::var("TRANSFER_MARGIN_PERCENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.margin_percent),

            double_for_source: env::var("DOUBLE_FOR_SOURCE")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.double_for_source),

            penalty_factor: env::var("PENALTY_FACTOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.penalty_factor),

            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_interval_secs),

            operation_timeout_secs: env::var("OPERATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0),

            metrics_namespace: env::var("METRICS_NAMESPACE")
                .unwrap_or(default.metrics_namespace),

            debug: env::var("DEBUG")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.debug),
        }
        .clamped()
    }

    /// Pulls every tunable back into its supported range.
    pub fn clamped(mut self) -> Self {
        self.batch_size = self.batch_size.clamp(1, MAX_BATCH_SIZE);
        self.throughput_mbps = self.throughput_mbps.max(1);
        self.margin_percent = self.margin_percent.clamp(1, 100);
        self.penalty_factor = self.penalty_factor.max(1);
        self
    }

    pub fn estimator(&self) -> TransferEstimator {
        TransferEstimator::new(
            self.throughput_mbps,
            self.margin_percent,
            self.double_for_source,
        )
        .with_penalty_factor(self.penalty_factor)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

fn default_port() -> u16 {
    22
}

/// Connection details of the remote SFTP endpoint.
#[derive(Clone, Deserialize)]
pub struct SftpTarget {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Path to the client private key
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_pass: Option<String>,
    /// Prefix for every remote destination path
    #[serde(default)]
    pub default_path: Option<String>,
}

impl fmt::Debug for SftpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key)
            .field("private_key_pass", &self.private_key_pass.as_ref().map(|_| "***"))
            .field("default_path", &self.default_path)
            .finish()
    }
}

impl SftpTarget {
    /// Reads the JSON document in `SFTP_TARGET`, then applies per-field
    /// environment overrides (`host`, `port`, `username`, ...).
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var(SFTP_TARGET_ENV).map_err(|_| ConfigError::Missing(SFTP_TARGET_ENV))?;
        let mut target: SftpTarget = serde_json::from_str(&raw)?;
        target.apply_overrides(|key| env::var(key).ok())?;
        target.validate()?;
        Ok(target)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let target: SftpTarget = serde_json::from_str(raw)?;
        target.validate()?;
        Ok(target)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = lookup("host") {
            self.host = host;
        }
        if let Some(port) = lookup("port") {
            self.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "port",
                reason: format!("{:?} is not a port number", port),
            })?;
        }
        if let Some(username) = lookup("username") {
            self.username = username;
        }
        if let Some(password) = lookup("password") {
            self.password = Some(password);
        }
        if let Some(private_key) = lookup("private_key") {
            self.private_key = Some(private_key);
        }
        if let Some(pass) = lookup("private_key_pass") {
            self.private_key_pass = Some(pass);
        }
        if let Some(path) = lookup("default_path") {
            self.default_path = Some(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "username",
                reason: "must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                key: "port",
                reason: "must not be 0".to_string(),
            });
        }
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        let has_key = self.private_key.as_deref().is_some_and(|k| !k.is_empty());
        if !has_password && !has_key {
            return Err(ConfigError::Invalid {
                key: "password",
                reason: "either password or private_key is required".to_string(),
            });
        }
        Ok(())
    }
}
