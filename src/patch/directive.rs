//! One atomic runtime override.

/// Application phase of a directive. Directives are partially ordered into
/// phases; the phase order is fixed and not caller-configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatchPhase {
    /// Automation markers removed or spoofed.
    IdentityMarkers,
    /// Navigator/screen/timezone attributes rewritten as read-only getters.
    StaticAttributes,
    /// Canvas, audio, and WebGL surfaces wrapped with perturbation.
    DynamicSurfaces,
    /// Highest-risk properties re-asserted as non-configurable. Runs last
    /// and must win any subsequent write attempt.
    LockIn,
}

impl PatchPhase {
    /// All phases in their fixed application order.
    pub const ORDER: [PatchPhase; 4] = [
        PatchPhase::IdentityMarkers,
        PatchPhase::StaticAttributes,
        PatchPhase::DynamicSurfaces,
        PatchPhase::LockIn,
    ];

    pub fn rank(&self) -> u8 {
        match self {
            PatchPhase::IdentityMarkers => 0,
            PatchPhase::StaticAttributes => 1,
            PatchPhase::DynamicSurfaces => 2,
            PatchPhase::LockIn => 3,
        }
    }
}

impl std::fmt::Display for PatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchPhase::IdentityMarkers => write!(f, "identity-markers"),
            PatchPhase::StaticAttributes => write!(f, "static-attributes"),
            PatchPhase::DynamicSurfaces => write!(f, "dynamic-surfaces"),
            PatchPhase::LockIn => write!(f, "lock-in"),
        }
    }
}

/// How the override replaces the original surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplacementKind {
    /// A fixed value.
    ConstantValue,
    /// A getter computed per read.
    ComputedGetter,
    /// A wrapper around the original function.
    FunctionWrapper,
}

/// Whether a directive may safely run more than once in one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Idempotency {
    /// Re-running overwrites with the same result.
    SafeToReapply,
    /// Re-running would double-wrap an original or fight a non-configurable
    /// property; run exactly once per context.
    ApplyOnce,
}

/// One atomic override of a fingerprintable surface.
#[derive(Debug, Clone)]
pub struct PatchDirective {
    /// Target surface path, e.g. `navigator.webdriver`.
    pub surface: String,
    pub kind: ReplacementKind,
    pub phase: PatchPhase,
    /// Lower applies earlier within a phase. Directives with equal priority
    /// may be applied in any order.
    pub priority: u8,
    pub idempotency: Idempotency,
    /// Global the hosting runtime must expose for this directive to apply.
    /// When absent the directive is skipped and reported, not failed.
    pub required_global: Option<&'static str>,
    /// Rendered override script.
    pub script: String,
}

impl PatchDirective {
    /// Sort key establishing the fixed phase order and intra-phase priority.
    pub fn sort_key(&self) -> (u8, u8) {
        (self.phase.rank(), self.priority)
    }
}
