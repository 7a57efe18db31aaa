//! Stealth Patch Engine
//!
//! Compiles a [`StealthProfile`](crate::profile::StealthProfile) into an
//! ordered set of [`PatchDirective`]s and applies them to a fresh browsing
//! context before any adversarial script can observe the original values.
//!
//! Application is phased, and the phase order is fixed:
//!
//! 1. **Identity markers**: webdriver flags and automation globals, read
//!    synchronously by detectors on the first tick after document creation.
//! 2. **Static attribute surface**: navigator/screen/timezone attributes
//!    rewritten as computed getters consistent with the profile.
//! 3. **Dynamic fingerprint surfaces**: canvas read-back, audio samples,
//!    and WebGL parameter queries wrapped with clamped, never-bit-identical
//!    perturbation.
//! 4. **Lock-in**: the highest-risk properties re-asserted as
//!    non-configurable so later writes by the hosting framework lose.
//!
//! Patches are context-scoped: each new context must re-run the full
//! sequence.

mod directive;
mod engine;
mod noise;
mod scripts;

pub use directive::{Idempotency, PatchDirective, PatchPhase, ReplacementKind};
pub use engine::{ApplyReport, PatchEngine, SkippedDirective};
pub use noise::NoiseGenerator;
