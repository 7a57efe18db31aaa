//! Harness settings and configuration management.
//!
//! Supports multiple configuration sources with proper precedence:
//! defaults, then a TOML/JSON file, then `STEALTH_HARNESS_*` environment
//! variables, then CLI arguments.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::harness::IsolationMode;
use crate::profile::StealthProfile;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration.
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Unsupported file format.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

impl std::str::FromStr for IsolationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared-context" | "shared" => Ok(IsolationMode::SharedContext),
            "per-entry-context" | "per-entry" => Ok(IsolationMode::PerEntryContext),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown isolation mode: {}. Valid modes are: shared-context, per-entry-context",
                s
            ))),
        }
    }
}

/// Named identity presets the CLI and configuration accept.
pub const PROFILE_PRESETS: [&str; 4] = ["windows-chrome", "mac-chrome", "linux-chrome", "random"];

/// Main harness configuration.
///
/// # Configuration Precedence
///
/// Settings are applied in the following order (later sources override earlier):
/// 1. Default values
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
/// 4. CLI arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Identity preset: one of [`PROFILE_PRESETS`].
    #[serde(default = "default_profile_preset")]
    pub profile_preset: String,

    /// Seed for a deterministic identity. Overrides `profile_preset` when
    /// set; the same seed always yields the same identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_seed: Option<String>,

    /// Context-sharing strategy across the entries of a run.
    #[serde(default = "default_isolation")]
    pub isolation: IsolationMode,

    /// Per-entry timeout in milliseconds. A run applies this budget to
    /// every selected target.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Capture a screenshot per entry.
    #[serde(default)]
    pub capture_screenshots: bool,

    /// Directory screenshots are written into.
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Names of targets to run. Empty means every registered target.
    #[serde(default)]
    pub targets: Vec<String>,
}

// Default value functions for serde
fn default_profile_preset() -> String {
    "windows-chrome".to_string()
}

fn default_isolation() -> IsolationMode {
    IsolationMode::SharedContext
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            profile_preset: default_profile_preset(),
            profile_seed: None,
            isolation: default_isolation(),
            default_timeout_ms: default_timeout_ms(),
            capture_screenshots: false,
            screenshot_dir: default_screenshot_dir(),
            targets: Vec::new(),
        }
    }
}

impl HarnessSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a configuration file.
    ///
    /// Supports both TOML and JSON formats, detected by file extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "toml" => Ok(toml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Saves settings to a configuration file, format by extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = match extension.as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Applies `STEALTH_HARNESS_*` environment variable overrides:
    /// - `STEALTH_HARNESS_PROFILE_PRESET`
    /// - `STEALTH_HARNESS_PROFILE_SEED`
    /// - `STEALTH_HARNESS_ISOLATION`
    /// - `STEALTH_HARNESS_DEFAULT_TIMEOUT_MS`
    /// - `STEALTH_HARNESS_CAPTURE_SCREENSHOTS`
    /// - `STEALTH_HARNESS_SCREENSHOT_DIR`
    /// - `STEALTH_HARNESS_TARGETS` (comma-separated)
    pub fn merge_with_env(mut self) -> Self {
        if let Ok(val) = env::var("STEALTH_HARNESS_PROFILE_PRESET") {
            self.profile_preset = val;
        }
        if let Ok(val) = env::var("STEALTH_HARNESS_PROFILE_SEED") {
            self.profile_seed = Some(val);
        }
        if let Ok(val) = env::var("STEALTH_HARNESS_ISOLATION") {
            if let Ok(mode) = val.parse() {
                self.isolation = mode;
            }
        }
        if let Ok(val) = env::var("STEALTH_HARNESS_DEFAULT_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.default_timeout_ms = timeout;
            }
        }
        if let Ok(val) = env::var("STEALTH_HARNESS_CAPTURE_SCREENSHOTS") {
            self.capture_screenshots = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("STEALTH_HARNESS_SCREENSHOT_DIR") {
            self.screenshot_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("STEALTH_HARNESS_TARGETS") {
            self.targets = val
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        self
    }

    /// Applies parsed CLI arguments as overrides.
    pub fn merge_with_args(mut self, args: &CliArgs) -> Self {
        if let Some(ref preset) = args.profile_preset {
            self.profile_preset = preset.clone();
        }
        if let Some(ref seed) = args.profile_seed {
            self.profile_seed = Some(seed.clone());
        }
        if let Some(isolation) = args.isolation {
            self.isolation = isolation;
        }
        if let Some(timeout) = args.timeout_ms {
            self.default_timeout_ms = timeout;
        }
        if let Some(capture) = args.capture_screenshots {
            self.capture_screenshots = capture;
        }
        if let Some(ref dir) = args.screenshot_dir {
            self.screenshot_dir = dir.clone();
        }
        if !args.targets.is_empty() {
            self.targets = args.targets.clone();
        }
        self
    }

    /// Validates all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile_seed.is_none() && !PROFILE_PRESETS.contains(&self.profile_preset.as_str())
        {
            return Err(ConfigError::ValidationError(format!(
                "Unknown profile preset: {}. Valid presets are: {}",
                self.profile_preset,
                PROFILE_PRESETS.join(", ")
            )));
        }
        if self.default_timeout_ms < 1000 {
            return Err(ConfigError::ValidationError(
                "Default timeout must be at least 1000ms".to_string(),
            ));
        }
        if self.default_timeout_ms > 300000 {
            return Err(ConfigError::ValidationError(
                "Default timeout cannot exceed 300000ms (5 minutes)".to_string(),
            ));
        }
        if self.targets.iter().any(|t| t.is_empty()) {
            return Err(ConfigError::ValidationError(
                "Target names cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the identity these settings describe. A seed takes precedence
    /// over the named preset.
    pub fn profile(&self) -> Result<StealthProfile, ConfigError> {
        if let Some(ref seed) = self.profile_seed {
            return Ok(StealthProfile::consistent(seed));
        }
        match self.profile_preset.as_str() {
            "windows-chrome" => Ok(StealthProfile::windows_chrome()),
            "mac-chrome" => Ok(StealthProfile::mac_chrome()),
            "linux-chrome" => Ok(StealthProfile::linux_chrome()),
            "random" => Ok(StealthProfile::random()),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown profile preset: {other}"
            ))),
        }
    }

    // Builder-style methods for convenient configuration

    pub fn with_profile_preset(mut self, preset: impl Into<String>) -> Self {
        self.profile_preset = preset.into();
        self
    }

    pub fn with_profile_seed(mut self, seed: impl Into<String>) -> Self {
        self.profile_seed = Some(seed.into());
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_screenshots(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_screenshots = true;
        self.screenshot_dir = dir.into();
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }
}

/// CLI argument structure for parsing command line options.
///
/// All fields are optional to allow partial overrides.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    /// Identity preset name.
    pub profile_preset: Option<String>,
    /// Deterministic identity seed.
    pub profile_seed: Option<String>,
    /// Context isolation mode.
    pub isolation: Option<IsolationMode>,
    /// Default per-entry timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Capture screenshots per entry.
    pub capture_screenshots: Option<bool>,
    /// Screenshot output directory.
    pub screenshot_dir: Option<PathBuf>,
    /// Target names to run; empty means all.
    pub targets: Vec<String>,
    /// Configuration file path.
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the final settings by applying the full configuration chain:
    /// defaults, file (if specified), environment, then these arguments.
    pub fn load_settings(&self) -> Result<HarnessSettings, ConfigError> {
        let settings = if let Some(ref config_file) = self.config_file {
            HarnessSettings::from_file(config_file)?
        } else {
            HarnessSettings::default()
        };

        let settings = settings.merge_with_env().merge_with_args(self);
        settings.validate()?;
        Ok(settings)
    }
}
