//! Stealth Profile Model
//!
//! A [`StealthProfile`] is the declarative description of the synthetic
//! browser identity: platform, vendor, hardware, screen geometry, GPU
//! strings, timezone, and noise parameters. It carries no behavior of its
//! own; the patch engine compiles it into runtime overrides.
//!
//! The profile enforces cross-field consistency at construction time.
//! Mismatched signals (a Windows platform with a macOS user agent, or a
//! Direct3D renderer string on Linux) are themselves a detection vector, so
//! an inconsistent profile is rejected with [`ProfileError`] instead of
//! being silently tolerated.
//!
//! # Usage
//!
//! ```rust,no_run
//! use stealth_harness::profile::StealthProfile;
//!
//! // Named preset
//! let profile = StealthProfile::windows_chrome();
//!
//! // Deterministic identity derived from a session seed
//! let consistent = StealthProfile::consistent("user-session-id");
//!
//! // Custom identity, validated on build
//! let custom = StealthProfile::builder()
//!     .timezone_offset_minutes(300)
//!     .hardware_concurrency(12)
//!     .build()
//!     .expect("consistent profile");
//! ```

mod presets;

pub use presets::GpuStrings;

use serde::Serialize;
use thiserror::Error;

/// Errors raised when a profile fails cross-field consistency validation.
///
/// All variants are fatal at construction time and are never passed further
/// downstream; the patch engine only ever sees validated profiles.
#[derive(Debug, Clone, Error)]
pub enum ProfileError {
    /// The platform string is not one of the supported values.
    #[error("unknown platform string: {0:?} (expected Win32, MacIntel, or Linux x86_64)")]
    UnknownPlatform(String),

    /// The user agent does not match the OS family implied by `platform`.
    #[error("user agent {user_agent:?} does not match the {family} platform")]
    UserAgentMismatch { family: OsFamily, user_agent: String },

    /// The WebGL vendor/renderer pair is not drawn from the platform's OS family.
    #[error("webgl renderer {renderer:?} is not a {family} GPU string")]
    GpuFamilyMismatch { family: OsFamily, renderer: String },

    /// The ordered language list is empty.
    #[error("languages must contain at least one entry")]
    EmptyLanguages,

    /// Device memory must be a power of two between 2 and 32 GB.
    #[error("device memory must be a power of two in 2..=32 GB, got {0}")]
    InvalidDeviceMemory(u8),

    /// Screen geometry is internally inconsistent.
    #[error("invalid screen geometry: {0}")]
    InvalidScreen(String),

    /// Timezone offset outside the real-world range.
    #[error("timezone offset {0} minutes is outside -720..=840")]
    InvalidTimezoneOffset(i32),

    /// A noise amplitude is outside its legal range.
    #[error("invalid noise amplitude: {0}")]
    InvalidNoiseAmplitude(String),
}

/// Operating-system family a profile's signals must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

impl OsFamily {
    /// Maps a `navigator.platform` string to its OS family.
    pub fn from_platform(platform: &str) -> Option<OsFamily> {
        match platform {
            "Win32" => Some(OsFamily::Windows),
            "MacIntel" => Some(OsFamily::MacOs),
            "Linux x86_64" => Some(OsFamily::Linux),
            _ => None,
        }
    }

    /// The canonical `navigator.platform` value for this family.
    pub fn platform(&self) -> &'static str {
        match self {
            OsFamily::Windows => "Win32",
            OsFamily::MacOs => "MacIntel",
            OsFamily::Linux => "Linux x86_64",
        }
    }

    /// Checks that a user agent string is shaped like this OS family.
    pub fn matches_user_agent(&self, user_agent: &str) -> bool {
        match self {
            OsFamily::Windows => user_agent.contains("Windows NT"),
            OsFamily::MacOs => {
                user_agent.contains("Macintosh") || user_agent.contains("Mac OS X")
            }
            OsFamily::Linux => user_agent.contains("X11") || user_agent.contains("Linux"),
        }
    }

    /// Classifies a WebGL renderer string by the OS it could plausibly come
    /// from. Direct3D only exists on Windows, Apple GPUs only on macOS, and
    /// Mesa/OpenGL strings are the Linux shape.
    pub fn matches_renderer(&self, renderer: &str) -> bool {
        match self {
            OsFamily::Windows => renderer.contains("Direct3D") || renderer.contains("D3D11"),
            OsFamily::MacOs => renderer.contains("Apple"),
            OsFamily::Linux => {
                renderer.contains("Mesa")
                    || (renderer.contains("OpenGL") && !renderer.contains("Apple"))
            }
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Windows => write!(f, "Windows"),
            OsFamily::MacOs => write!(f, "macOS"),
            OsFamily::Linux => write!(f, "Linux"),
        }
    }
}

/// Screen geometry and color depth exposed through the `screen` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenMetrics {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    pub color_depth: u8,
    pub pixel_depth: u8,
}

impl ScreenMetrics {
    /// Creates metrics for a full-screen display with a taskbar-sized
    /// available-height reduction, the shape real desktops report.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            avail_width: width,
            avail_height: height.saturating_sub(40),
            color_depth: 24,
            pixel_depth: 24,
        }
    }

    fn validate(&self) -> Result<(), ProfileError> {
        if self.width == 0 || self.height == 0 {
            return Err(ProfileError::InvalidScreen(
                "width and height must be non-zero".to_string(),
            ));
        }
        if self.avail_width > self.width || self.avail_height > self.height {
            return Err(ProfileError::InvalidScreen(format!(
                "available area {}x{} exceeds screen {}x{}",
                self.avail_width, self.avail_height, self.width, self.height
            )));
        }
        if self.color_depth != self.pixel_depth {
            return Err(ProfileError::InvalidScreen(format!(
                "color depth {} differs from pixel depth {}",
                self.color_depth, self.pixel_depth
            )));
        }
        Ok(())
    }
}

/// Declarative synthetic browser identity.
///
/// Constructed once per logical automation session and immutable thereafter.
/// Fields are only reachable through accessors so a validated profile cannot
/// drift out of consistency. Persistence is an external collaborator concern;
/// the profile itself is never written to disk by this crate.
#[derive(Debug, Clone, Serialize)]
pub struct StealthProfile {
    pub(crate) platform: String,
    pub(crate) vendor: String,
    pub(crate) product: String,
    pub(crate) product_sub: String,
    pub(crate) vendor_sub: String,
    pub(crate) user_agent: String,
    pub(crate) languages: Vec<String>,
    pub(crate) hardware_concurrency: u8,
    pub(crate) device_memory: u8,
    pub(crate) max_touch_points: u8,
    pub(crate) screen: ScreenMetrics,
    pub(crate) webgl_vendor: String,
    pub(crate) webgl_renderer: String,
    pub(crate) timezone_offset_minutes: i32,
    pub(crate) canvas_noise_amplitude: u8,
    pub(crate) audio_noise_amplitude: f64,
}

impl StealthProfile {
    /// Windows 10/11 with Chrome, the most common desktop identity.
    pub fn windows_chrome() -> Self {
        presets::preset(OsFamily::Windows)
    }

    /// macOS with Chrome.
    pub fn mac_chrome() -> Self {
        presets::preset(OsFamily::MacOs)
    }

    /// Linux with Chrome.
    pub fn linux_chrome() -> Self {
        presets::preset(OsFamily::Linux)
    }

    /// Deterministic profile derived from a seed string. The same seed
    /// always yields the same identity, which keeps a session's fingerprint
    /// stable across restarts.
    pub fn consistent(seed: &str) -> Self {
        presets::from_seed(presets::hash_seed(seed))
    }

    /// Fresh randomized profile.
    pub fn random() -> Self {
        presets::from_seed(presets::entropy_seed())
    }

    /// Starts a builder pre-populated with the Windows Chrome preset.
    pub fn builder() -> StealthProfileBuilder {
        StealthProfileBuilder::new()
    }

    /// Verifies cross-field consistency. Preset and seeded constructors are
    /// drawn from curated per-OS tables and always pass; the builder calls
    /// this before handing out a profile.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let family = OsFamily::from_platform(&self.platform)
            .ok_or_else(|| ProfileError::UnknownPlatform(self.platform.clone()))?;

        if !family.matches_user_agent(&self.user_agent) {
            return Err(ProfileError::UserAgentMismatch {
                family,
                user_agent: self.user_agent.clone(),
            });
        }
        if !family.matches_renderer(&self.webgl_renderer) {
            return Err(ProfileError::GpuFamilyMismatch {
                family,
                renderer: self.webgl_renderer.clone(),
            });
        }
        if self.languages.is_empty() {
            return Err(ProfileError::EmptyLanguages);
        }
        if !matches!(self.device_memory, 2 | 4 | 8 | 16 | 32) {
            return Err(ProfileError::InvalidDeviceMemory(self.device_memory));
        }
        self.screen.validate()?;
        if !(-720..=840).contains(&self.timezone_offset_minutes) {
            return Err(ProfileError::InvalidTimezoneOffset(
                self.timezone_offset_minutes,
            ));
        }
        if !(1..=4).contains(&self.canvas_noise_amplitude) {
            return Err(ProfileError::InvalidNoiseAmplitude(format!(
                "canvas amplitude {} outside 1..=4",
                self.canvas_noise_amplitude
            )));
        }
        if !(self.audio_noise_amplitude > 0.0 && self.audio_noise_amplitude <= 1e-3) {
            return Err(ProfileError::InvalidNoiseAmplitude(format!(
                "audio amplitude {} outside (0, 1e-3]",
                self.audio_noise_amplitude
            )));
        }
        Ok(())
    }

    /// The OS family all of this profile's signals agree on.
    pub fn os_family(&self) -> OsFamily {
        // Validated profiles always carry a known platform string.
        OsFamily::from_platform(&self.platform).unwrap_or(OsFamily::Windows)
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn product_sub(&self) -> &str {
        &self.product_sub
    }

    pub fn vendor_sub(&self) -> &str {
        &self.vendor_sub
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Ordered language list; the first entry is the primary language.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn hardware_concurrency(&self) -> u8 {
        self.hardware_concurrency
    }

    pub fn device_memory(&self) -> u8 {
        self.device_memory
    }

    pub fn max_touch_points(&self) -> u8 {
        self.max_touch_points
    }

    pub fn screen(&self) -> &ScreenMetrics {
        &self.screen
    }

    pub fn webgl_vendor(&self) -> &str {
        &self.webgl_vendor
    }

    pub fn webgl_renderer(&self) -> &str {
        &self.webgl_renderer
    }

    /// Offset in minutes as `Date.prototype.getTimezoneOffset` reports it
    /// (positive west of UTC).
    pub fn timezone_offset_minutes(&self) -> i32 {
        self.timezone_offset_minutes
    }

    /// Maximum per-channel delta the canvas noise wrapper may apply.
    pub fn canvas_noise_amplitude(&self) -> u8 {
        self.canvas_noise_amplitude
    }

    /// Maximum per-sample delta the audio noise wrapper may apply.
    pub fn audio_noise_amplitude(&self) -> f64 {
        self.audio_noise_amplitude
    }
}

/// Fluent builder for custom profiles.
///
/// Starts from the Windows Chrome preset; every `build` re-runs the full
/// consistency validation, so a builder cannot produce an inconsistent
/// profile.
#[derive(Debug, Clone)]
pub struct StealthProfileBuilder {
    profile: StealthProfile,
}

impl StealthProfileBuilder {
    pub fn new() -> Self {
        Self {
            profile: StealthProfile::windows_chrome(),
        }
    }

    /// Replaces the whole identity base with another preset.
    pub fn from_profile(profile: StealthProfile) -> Self {
        Self { profile }
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.profile.platform = platform.into();
        self
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.profile.vendor = vendor.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.profile.user_agent = user_agent.into();
        self
    }

    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.profile.languages = languages;
        self
    }

    pub fn hardware_concurrency(mut self, cores: u8) -> Self {
        self.profile.hardware_concurrency = cores;
        self
    }

    pub fn device_memory(mut self, memory_gb: u8) -> Self {
        self.profile.device_memory = memory_gb;
        self
    }

    pub fn max_touch_points(mut self, points: u8) -> Self {
        self.profile.max_touch_points = points;
        self
    }

    pub fn screen(mut self, screen: ScreenMetrics) -> Self {
        self.profile.screen = screen;
        self
    }

    pub fn webgl_strings(
        mut self,
        vendor: impl Into<String>,
        renderer: impl Into<String>,
    ) -> Self {
        self.profile.webgl_vendor = vendor.into();
        self.profile.webgl_renderer = renderer.into();
        self
    }

    pub fn timezone_offset_minutes(mut self, minutes: i32) -> Self {
        self.profile.timezone_offset_minutes = minutes;
        self
    }

    pub fn canvas_noise_amplitude(mut self, amplitude: u8) -> Self {
        self.profile.canvas_noise_amplitude = amplitude;
        self
    }

    pub fn audio_noise_amplitude(mut self, amplitude: f64) -> Self {
        self.profile.audio_noise_amplitude = amplitude;
        self
    }

    /// Validates and returns the profile, failing fast on any cross-field
    /// inconsistency.
    pub fn build(self) -> Result<StealthProfile, ProfileError> {
        self.profile.validate()?;
        Ok(self.profile)
    }
}

impl Default for StealthProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
