//! Configuration module for the stealth harness.
//!
//! Provides configuration management for runs, including:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides (`STEALTH_HARNESS_*`)
//! - CLI argument merging
//! - Validation and defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use stealth_harness::config::HarnessSettings;
//!
//! // Defaults
//! let settings = HarnessSettings::default();
//!
//! // Load from a specific file
//! let settings = HarnessSettings::from_file("harness.toml").unwrap();
//!
//! // Override with environment variables
//! let settings = settings.merge_with_env();
//! ```

mod settings;

pub use settings::{CliArgs, ConfigError, HarnessSettings, PROFILE_PRESETS};
