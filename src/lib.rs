//! # Stealth Harness
//!
//! A browser-identity stealth layer and detection-verification harness
//! written in Rust.
//!
//! The crate has two halves. The patch engine compiles a declarative
//! [`profile::StealthProfile`] into ordered runtime overrides and applies
//! them to fresh browsing contexts before any adversarial script runs. The
//! harness then drives registered bot-detection targets against the patched
//! identity and reports which of them the identity survived.
//!
//! ## Features
//!
//! - **Consistent Identity Profiles**: cross-field validated platform, UA,
//!   GPU, screen, timezone, and noise parameters with named presets and
//!   deterministic seeded generation
//! - **Phased Patch Engine**: identity markers, static attributes, dynamic
//!   fingerprint surfaces, then a non-configurable lock-in pass
//! - **Bounded Fingerprint Noise**: canvas and audio reads perturbed within
//!   an amplitude bound, never bit-identical across reads
//! - **Detection Registry**: pluggable extractor/validator targets with
//!   built-ins for BotD, Sannysoft, Are-You-Headless, and FingerprintJS
//! - **Verification Harness**: sequential runs with per-entry failure
//!   isolation, twin timeout budgets, cancellation, and JSON reports
//! - **Flexible Configuration**: TOML/JSON files, environment variables,
//!   CLI arguments
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stealth_harness::{
//!     context::MockContextProvider,
//!     harness::{Harness, IsolationMode},
//!     profile::StealthProfile,
//!     registry::DetectionRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let profile = StealthProfile::windows_chrome();
//!     let registry = DetectionRegistry::with_builtin_targets();
//!
//!     let provider = Arc::new(MockContextProvider::default());
//!     let harness = Harness::new(provider, profile);
//!
//!     let report = harness
//!         .run(registry.entries(), IsolationMode::PerEntryContext)
//!         .await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`profile`]: declarative browser identity with consistency validation
//! - [`patch`]: directive compilation, phased application, noise generation
//! - [`context`]: browsing-context provider boundary and mock implementation
//! - [`registry`]: detection target catalog and built-in targets
//! - [`harness`]: the verification run loop and cancellation
//! - [`report`]: run reports and screenshot artifact sinks
//! - [`config`]: configuration loading and management
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`STEALTH_HARNESS_*`)
//! 4. CLI arguments
//!
//! See [`config::HarnessSettings`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Declarative browser identity profiles with cross-field validation.
pub mod profile;

/// Patch directive compilation, phased application, and fingerprint noise.
pub mod patch;

/// Browsing-context provider boundary plus the mock implementation.
pub mod context;

/// Detection target registry and built-in targets.
pub mod registry;

/// The detection-verification run loop and cancellation plumbing.
pub mod harness;

/// Run reports and screenshot artifact sinks.
pub mod report;

/// Configuration management for loading settings from files, env, and CLI.
pub mod config;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Profile types
pub use profile::{
    GpuStrings, OsFamily, ProfileError, ScreenMetrics, StealthProfile, StealthProfileBuilder,
};

// Patch types
pub use patch::{
    ApplyReport, Idempotency, NoiseGenerator, PatchDirective, PatchEngine, PatchPhase,
    ReplacementKind, SkippedDirective,
};

// Context types
pub use context::{
    BrowsingContext, ContextProvider, MockBehavior, MockBrowsingContext, MockContextHandle,
    MockContextProvider,
};

// Registry types
pub use registry::{
    DetectionRegistry, DetectionTestEntry, Extractor, FnExtractor, FnValidator, RawData,
    RegistryError, ValidatorFault, Validator, Verdict, WaitCondition,
};

// Harness types
pub use harness::{cancel_pair, CancelHandle, CancelSignal, Harness, HarnessError, IsolationMode};

// Report types
pub use report::{
    AggregateReport, ArtifactSink, FsArtifactSink, MemoryArtifactSink, NullArtifactSink, Outcome,
    TestRunResult,
};

// Config types
pub use config::{CliArgs, ConfigError, HarnessSettings};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use stealth_harness::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CliArgs, HarnessSettings};
    pub use crate::context::{BrowsingContext, ContextProvider, MockContextProvider};
    pub use crate::harness::{Harness, IsolationMode};
    pub use crate::patch::PatchEngine;
    pub use crate::profile::StealthProfile;
    pub use crate::registry::{DetectionRegistry, DetectionTestEntry};
    pub use crate::report::{AggregateReport, Outcome};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
    }

    #[test]
    fn test_prelude_imports() {
        // Verify prelude types are accessible
        use crate::prelude::*;
        let _ = VERSION;
        let _ = NAME;
    }
}
