//! Configuration module for DriftSync.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, defaults, and a builder pattern for
//! programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriftSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub bandwidth: BandwidthConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub conflicts: ConflictsConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root directory of the local sync tree.
    pub root: PathBuf,
    /// Seconds between remote change-feed polls.
    pub poll_interval: u64,
    /// Seconds to wait after a local change before reconciling (debounce).
    pub debounce_delay: u64,
    /// Glob patterns excluded from sync at startup, relative to `root`.
    pub excluded_patterns: Vec<String>,
}

/// Bandwidth governor and scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthConfig {
    /// Upload rate cap in KiB/s; 0 means unlimited.
    pub upload_limit_kbps: u64,
    /// Download rate cap in KiB/s; 0 means unlimited.
    pub download_limit_kbps: u64,
    /// Maximum transfers in flight at once.
    pub max_concurrent_transfers: u32,
    /// Seconds of budget the governor may accumulate while idle.
    pub burst_seconds: u64,
    /// Admission floor in KiB/s: a new transfer only starts if the per-transfer
    /// share of the limit stays at or above this.
    #[serde(default = "default_min_bandwidth_per_transfer_kbps")]
    pub min_bandwidth_per_transfer_kbps: u64,
    /// Fully pause transfers while the connection is metered.
    #[serde(default)]
    pub pause_on_metered: bool,
    /// Percentage of the configured limits applied on a metered connection
    /// when `pause_on_metered` is off (1-100).
    #[serde(default = "default_metered_throttle_percent")]
    pub metered_throttle_percent: u8,
    /// Recurring local-time windows during which limits are scaled down.
    #[serde(default)]
    pub throttle_windows: Vec<ThrottleWindow>,
    /// Seconds a single chunk or metadata call may take before the attempt
    /// is treated as a network failure; 0 disables the bound.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
}

fn default_min_bandwidth_per_transfer_kbps() -> u64 {
    64
}

fn default_transfer_timeout_secs() -> u64 {
    300
}

fn default_metered_throttle_percent() -> u8 {
    50
}

/// A recurring daily window that scales bandwidth limits
///
/// Hours are local wall-clock; a window with `start_hour > end_hour` wraps
/// past midnight (e.g. 22 to 6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleWindow {
    /// Hour the window opens (0-23).
    pub start_hour: u8,
    /// Hour the window closes, exclusive (0-23).
    pub end_hour: u8,
    /// Percentage of the configured limits in force inside the window (1-100).
    pub throttle_percent: u8,
}

impl ThrottleWindow {
    /// Whether local `hour` falls inside the window.
    pub fn contains_hour(&self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Retry and pause behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before an operation is recorded as a permanent failure.
    pub max_retries: u32,
    /// Base backoff delay in seconds; doubles per attempt.
    pub base_delay_secs: u64,
    /// Ceiling on the backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Length of the rolling error-rate window in seconds.
    pub error_window_secs: u64,
    /// Failures within the window that trigger a global pause.
    pub error_window_threshold: u32,
}

/// Offline cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disk budget for offline copies in gigabytes.
    pub max_size_gb: u64,
    /// Percentage of the budget that triggers an eviction sweep (0-100).
    pub eviction_threshold_percent: u8,
    /// Minutes between background eviction sweeps.
    pub sweep_interval_minutes: u32,
}

/// Conflict resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictsConfig {
    /// Default strategy: `ask_user`, `keep_local`, `keep_cloud`,
    /// `keep_both`, `keep_newer`, or `keep_larger`.
    pub default_strategy: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Path to the log file.
    pub file: PathBuf,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/driftsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("driftsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("DriftSync"),
            poll_interval: 30,
            debounce_delay: 2,
            excluded_patterns: Vec::new(),
        }
    }
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            upload_limit_kbps: 0,
            download_limit_kbps: 0,
            max_concurrent_transfers: 4,
            burst_seconds: 2,
            min_bandwidth_per_transfer_kbps: default_min_bandwidth_per_transfer_kbps(),
            pause_on_metered: false,
            metered_throttle_percent: default_metered_throttle_percent(),
            throttle_windows: Vec::new(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1,
            max_delay_secs: 300,
            error_window_secs: 60,
            error_window_threshold: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_gb: 10,
            eviction_threshold_percent: 80,
            sweep_interval_minutes: 60,
        }
    }
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            default_strategy: "ask_user".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("driftsync");
        Self {
            level: "info".to_string(),
            file: data_dir.join("driftsync.log"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `conflicts.default_strategy`.
const VALID_CONFLICT_STRATEGIES: &[&str] = &[
    "ask_user",
    "keep_local",
    "keep_cloud",
    "keep_both",
    "keep_newer",
    "keep_larger",
];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.poll_interval == 0 {
            errors.push(ValidationError {
                field: "sync.poll_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.debounce_delay == 0 {
            errors.push(ValidationError {
                field: "sync.debounce_delay".into(),
                message: "must be greater than 0".into(),
            });
        }
        for pattern in &self.sync.excluded_patterns {
            if glob::Pattern::new(pattern).is_err() {
                errors.push(ValidationError {
                    field: "sync.excluded_patterns".into(),
                    message: format!("invalid glob pattern '{}'", pattern),
                });
            }
        }

        // Check sync root only when it does not start with `~` (tilde is expanded at runtime).
        let root_str = self.sync.root.to_string_lossy();
        if !root_str.starts_with('~') && !self.sync.root.is_absolute() {
            errors.push(ValidationError {
                field: "sync.root".into(),
                message: format!("must be an absolute path: {}", self.sync.root.display()),
            });
        }

        // --- bandwidth ---
        if self.bandwidth.max_concurrent_transfers == 0 {
            errors.push(ValidationError {
                field: "bandwidth.max_concurrent_transfers".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.bandwidth.burst_seconds == 0 {
            errors.push(ValidationError {
                field: "bandwidth.burst_seconds".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.bandwidth.metered_throttle_percent == 0
            || self.bandwidth.metered_throttle_percent > 100
        {
            errors.push(ValidationError {
                field: "bandwidth.metered_throttle_percent".into(),
                message: "must be in range 1..=100".into(),
            });
        }
        for (i, window) in self.bandwidth.throttle_windows.iter().enumerate() {
            if window.start_hour > 23 || window.end_hour > 23 {
                errors.push(ValidationError {
                    field: format!("bandwidth.throttle_windows[{i}]"),
                    message: "hours must be in range 0..=23".into(),
                });
            }
            if window.throttle_percent == 0 || window.throttle_percent > 100 {
                errors.push(ValidationError {
                    field: format!("bandwidth.throttle_windows[{i}]"),
                    message: "throttle_percent must be in range 1..=100".into(),
                });
            }
        }

        // --- retry ---
        if self.retry.max_retries == 0 {
            errors.push(ValidationError {
                field: "retry.max_retries".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.base_delay_secs == 0 {
            errors.push(ValidationError {
                field: "retry.base_delay_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            errors.push(ValidationError {
                field: "retry.max_delay_secs".into(),
                message: format!(
                    "max_delay_secs ({}) must not be below base_delay_secs ({})",
                    self.retry.max_delay_secs, self.retry.base_delay_secs
                ),
            });
        }
        if self.retry.error_window_secs == 0 {
            errors.push(ValidationError {
                field: "retry.error_window_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.error_window_threshold == 0 {
            errors.push(ValidationError {
                field: "retry.error_window_threshold".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- cache ---
        if self.cache.max_size_gb == 0 {
            errors.push(ValidationError {
                field: "cache.max_size_gb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.cache.eviction_threshold_percent == 0
            || self.cache.eviction_threshold_percent > 100
        {
            errors.push(ValidationError {
                field: "cache.eviction_threshold_percent".into(),
                message: "must be in range 1..=100".into(),
            });
        }
        if self.cache.sweep_interval_minutes == 0 {
            errors.push(ValidationError {
                field: "cache.sweep_interval_minutes".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- conflicts ---
        if !VALID_CONFLICT_STRATEGIES.contains(&self.conflicts.default_strategy.as_str()) {
            errors.push(ValidationError {
                field: "conflicts.default_strategy".into(),
                message: format!(
                    "invalid strategy '{}'; valid options: {}",
                    self.conflicts.default_strategy,
                    VALID_CONFLICT_STRATEGIES.join(", ")
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use driftsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/home/user/DriftSync"))
///     .bandwidth_upload_limit_kbps(512)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    pub fn sync_debounce_delay(mut self, seconds: u64) -> Self {
        self.config.sync.debounce_delay = seconds;
        self
    }

    pub fn sync_excluded_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.sync.excluded_patterns = patterns;
        self
    }

    // --- bandwidth ---

    pub fn bandwidth_upload_limit_kbps(mut self, kbps: u64) -> Self {
        self.config.bandwidth.upload_limit_kbps = kbps;
        self
    }

    pub fn bandwidth_download_limit_kbps(mut self, kbps: u64) -> Self {
        self.config.bandwidth.download_limit_kbps = kbps;
        self
    }

    pub fn bandwidth_max_concurrent_transfers(mut self, n: u32) -> Self {
        self.config.bandwidth.max_concurrent_transfers = n;
        self
    }

    pub fn bandwidth_burst_seconds(mut self, seconds: u64) -> Self {
        self.config.bandwidth.burst_seconds = seconds;
        self
    }

    pub fn bandwidth_min_per_transfer_kbps(mut self, kbps: u64) -> Self {
        self.config.bandwidth.min_bandwidth_per_transfer_kbps = kbps;
        self
    }

    pub fn bandwidth_pause_on_metered(mut self, pause: bool) -> Self {
        self.config.bandwidth.pause_on_metered = pause;
        self
    }

    pub fn bandwidth_metered_throttle_percent(mut self, percent: u8) -> Self {
        self.config.bandwidth.metered_throttle_percent = percent;
        self
    }

    pub fn bandwidth_throttle_windows(mut self, windows: Vec<ThrottleWindow>) -> Self {
        self.config.bandwidth.throttle_windows = windows;
        self
    }

    pub fn bandwidth_transfer_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.bandwidth.transfer_timeout_secs = seconds;
        self
    }

    // --- retry ---

    pub fn retry_max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn retry_base_delay_secs(mut self, seconds: u64) -> Self {
        self.config.retry.base_delay_secs = seconds;
        self
    }

    pub fn retry_max_delay_secs(mut self, seconds: u64) -> Self {
        self.config.retry.max_delay_secs = seconds;
        self
    }

    pub fn retry_error_window_secs(mut self, seconds: u64) -> Self {
        self.config.retry.error_window_secs = seconds;
        self
    }

    pub fn retry_error_window_threshold(mut self, n: u32) -> Self {
        self.config.retry.error_window_threshold = n;
        self
    }

    // --- cache ---

    pub fn cache_max_size_gb(mut self, gb: u64) -> Self {
        self.config.cache.max_size_gb = gb;
        self
    }

    pub fn cache_eviction_threshold_percent(mut self, percent: u8) -> Self {
        self.config.cache.eviction_threshold_percent = percent;
        self
    }

    pub fn cache_sweep_interval_minutes(mut self, minutes: u32) -> Self {
        self.config.cache.sweep_interval_minutes = minutes;
        self
    }

    // --- conflicts ---

    pub fn conflicts_default_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.config.conflicts.default_strategy = strategy.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = file;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
