//! Directive compilation and phased application.

use std::collections::HashSet;

use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::BrowsingContext;
use crate::profile::StealthProfile;

use super::directive::{Idempotency, PatchDirective, PatchPhase, ReplacementKind};
use super::scripts;

/// A directive that could not run because the hosting runtime lacks a
/// required global. Skips are reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDirective {
    pub surface: String,
    pub missing_global: &'static str,
}

/// Outcome of one phased application pass over a context.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Surfaces whose directives ran, in application order.
    pub applied: Vec<String>,
    /// Directives skipped for a missing runtime global.
    pub skipped: Vec<SkippedDirective>,
}

impl ApplyReport {
    /// True when every compiled directive ran.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Compiles a [`StealthProfile`] into ordered [`PatchDirective`]s and
/// applies them to browsing contexts.
///
/// The engine is context-scoped in effect: patches installed in one context
/// never leak into another, and every fresh context needs its own
/// application pass. The engine remembers which contexts it has patched so
/// a repeated pass only re-runs directives that are safe to reapply.
pub struct PatchEngine {
    profile: StealthProfile,
    directives: Vec<PatchDirective>,
    patched: Mutex<HashSet<Uuid>>,
}

impl PatchEngine {
    /// Compiles the full directive set for `profile`, sorted by phase and
    /// intra-phase priority.
    pub fn new(profile: StealthProfile) -> Self {
        let mut directives = compile(&profile);
        directives.sort_by_key(PatchDirective::sort_key);
        Self {
            profile,
            directives,
            patched: Mutex::new(HashSet::new()),
        }
    }

    pub fn profile(&self) -> &StealthProfile {
        &self.profile
    }

    /// Compiled directives in application order.
    pub fn directives(&self) -> &[PatchDirective] {
        &self.directives
    }

    /// Applies the phased directive sequence to `ctx`.
    ///
    /// Directives whose `required_global` is absent from the runtime are
    /// skipped and collected in the report. On a context this engine has
    /// already patched, only [`Idempotency::SafeToReapply`] directives run
    /// again; function wrappers would otherwise double-wrap their targets.
    pub async fn apply(&self, ctx: &dyn BrowsingContext) -> Result<ApplyReport> {
        let first_pass = !self.patched.lock().contains(&ctx.id());
        let mut report = ApplyReport::default();

        for directive in &self.directives {
            if !first_pass && directive.idempotency == Idempotency::ApplyOnce {
                debug!(
                    surface = %directive.surface,
                    context = %ctx.id(),
                    "directive already installed, not reapplying"
                );
                continue;
            }

            if let Some(global) = directive.required_global {
                let probe = format!("typeof {global} !== 'undefined'");
                let present = ctx
                    .evaluate(&probe)
                    .await
                    .with_context(|| format!("probing for global {global}"))?;
                if present != serde_json::Value::Bool(true) {
                    warn!(
                        surface = %directive.surface,
                        missing = global,
                        context = %ctx.id(),
                        "runtime lacks required global, skipping directive"
                    );
                    report.skipped.push(SkippedDirective {
                        surface: directive.surface.clone(),
                        missing_global: global,
                    });
                    continue;
                }
            }

            ctx.evaluate(&directive.script)
                .await
                .with_context(|| format!("applying override for {}", directive.surface))?;
            debug!(
                surface = %directive.surface,
                phase = %directive.phase,
                context = %ctx.id(),
                "override applied"
            );
            report.applied.push(directive.surface.clone());
        }

        // Only a completed pass counts; an error above leaves the context
        // unmarked so a retry reinstalls everything.
        self.patched.lock().insert(ctx.id());
        Ok(report)
    }

    /// Concatenates every directive script into one injectable block, for
    /// hosts that install scripts before document creation instead of
    /// evaluating them one by one. Global-presence guards are inlined so
    /// missing runtimes degrade the same way `apply` does.
    pub fn full_script(&self) -> String {
        let mut out = String::new();
        for directive in &self.directives {
            out.push_str(&format!("// {} [{}]\n", directive.surface, directive.phase));
            match directive.required_global {
                Some(global) => {
                    out.push_str(&format!("if (typeof {global} !== 'undefined') {{\n"));
                    out.push_str(&directive.script);
                    out.push_str("\n}\n\n");
                }
                None => {
                    out.push_str(&directive.script);
                    out.push_str("\n\n");
                }
            }
        }
        out
    }
}

/// Renders the directive set for one profile. Order within the returned
/// vector is irrelevant; the engine sorts by `sort_key`.
fn compile(profile: &StealthProfile) -> Vec<PatchDirective> {
    let mut directives = Vec::new();

    // Phase 1: markers detectors read synchronously on the first tick.
    directives.push(PatchDirective {
        surface: "navigator.webdriver".to_string(),
        kind: ReplacementKind::ComputedGetter,
        phase: PatchPhase::IdentityMarkers,
        priority: 0,
        idempotency: Idempotency::SafeToReapply,
        required_global: None,
        script: scripts::webdriver_script(),
    });
    directives.push(PatchDirective {
        surface: "window automation markers".to_string(),
        kind: ReplacementKind::FunctionWrapper,
        phase: PatchPhase::IdentityMarkers,
        priority: 1,
        idempotency: Idempotency::SafeToReapply,
        required_global: None,
        script: scripts::automation_markers_script(),
    });
    directives.push(PatchDirective {
        surface: "window.chrome".to_string(),
        kind: ReplacementKind::ConstantValue,
        phase: PatchPhase::IdentityMarkers,
        priority: 2,
        idempotency: Idempotency::SafeToReapply,
        required_global: None,
        script: scripts::chrome_namespace_script(),
    });

    // Phase 2: every static attribute rewritten as a profile-consistent getter.
    let string_getters: [(&str, &str, String); 6] = [
        ("navigator.platform", "platform", profile.platform().to_string()),
        ("navigator.vendor", "vendor", profile.vendor().to_string()),
        ("navigator.product", "product", profile.product().to_string()),
        ("navigator.productSub", "productSub", profile.product_sub().to_string()),
        ("navigator.vendorSub", "vendorSub", profile.vendor_sub().to_string()),
        ("navigator.userAgent", "userAgent", profile.user_agent().to_string()),
    ];
    for (i, (surface, prop, value)) in string_getters.into_iter().enumerate() {
        directives.push(PatchDirective {
            surface: surface.to_string(),
            kind: ReplacementKind::ComputedGetter,
            phase: PatchPhase::StaticAttributes,
            priority: i as u8,
            idempotency: Idempotency::SafeToReapply,
            required_global: None,
            script: scripts::navigator_getter(
                prop,
                &format!("\"{}\"", scripts::escape_js_string(&value)),
            ),
        });
    }

    let numeric_getters: [(&str, &str, u32); 3] = [
        (
            "navigator.hardwareConcurrency",
            "hardwareConcurrency",
            u32::from(profile.hardware_concurrency()),
        ),
        (
            "navigator.deviceMemory",
            "deviceMemory",
            u32::from(profile.device_memory()),
        ),
        (
            "navigator.maxTouchPoints",
            "maxTouchPoints",
            u32::from(profile.max_touch_points()),
        ),
    ];
    for (i, (surface, prop, value)) in numeric_getters.into_iter().enumerate() {
        directives.push(PatchDirective {
            surface: surface.to_string(),
            kind: ReplacementKind::ComputedGetter,
            phase: PatchPhase::StaticAttributes,
            priority: 6 + i as u8,
            idempotency: Idempotency::SafeToReapply,
            required_global: None,
            script: scripts::navigator_getter(prop, &value.to_string()),
        });
    }

    directives.push(PatchDirective {
        surface: "navigator.languages".to_string(),
        kind: ReplacementKind::ComputedGetter,
        phase: PatchPhase::StaticAttributes,
        priority: 9,
        idempotency: Idempotency::SafeToReapply,
        required_global: None,
        script: scripts::languages_script(profile.languages()),
    });

    let screen = profile.screen();
    let screen_props: [(&str, u32); 6] = [
        ("width", screen.width),
        ("height", screen.height),
        ("availWidth", screen.avail_width),
        ("availHeight", screen.avail_height),
        ("colorDepth", u32::from(screen.color_depth)),
        ("pixelDepth", u32::from(screen.pixel_depth)),
    ];
    for (i, (prop, value)) in screen_props.into_iter().enumerate() {
        directives.push(PatchDirective {
            surface: format!("screen.{prop}"),
            kind: ReplacementKind::ComputedGetter,
            phase: PatchPhase::StaticAttributes,
            priority: 10 + i as u8,
            idempotency: Idempotency::SafeToReapply,
            required_global: None,
            script: scripts::screen_getter(prop, value),
        });
    }

    directives.push(PatchDirective {
        surface: "Date.prototype.getTimezoneOffset".to_string(),
        kind: ReplacementKind::ConstantValue,
        phase: PatchPhase::StaticAttributes,
        priority: 16,
        idempotency: Idempotency::SafeToReapply,
        required_global: None,
        script: scripts::timezone_script(profile.timezone_offset_minutes()),
    });
    directives.push(PatchDirective {
        surface: "navigator.plugins".to_string(),
        kind: ReplacementKind::ComputedGetter,
        phase: PatchPhase::StaticAttributes,
        priority: 17,
        idempotency: Idempotency::SafeToReapply,
        required_global: Some("PluginArray"),
        script: scripts::plugins_script(),
    });

    // Phase 3: wrappers over originals. Never reapplied; a second wrap
    // would stack perturbation on already-perturbed output.
    directives.push(PatchDirective {
        surface: "canvas read-back".to_string(),
        kind: ReplacementKind::FunctionWrapper,
        phase: PatchPhase::DynamicSurfaces,
        priority: 0,
        idempotency: Idempotency::ApplyOnce,
        required_global: Some("CanvasRenderingContext2D"),
        script: scripts::canvas_noise_script(profile.canvas_noise_amplitude()),
    });
    directives.push(PatchDirective {
        surface: "canvas text metrics".to_string(),
        kind: ReplacementKind::FunctionWrapper,
        phase: PatchPhase::DynamicSurfaces,
        priority: 1,
        idempotency: Idempotency::ApplyOnce,
        required_global: Some("CanvasRenderingContext2D"),
        script: scripts::text_metrics_script(),
    });
    directives.push(PatchDirective {
        surface: "audio samples".to_string(),
        kind: ReplacementKind::FunctionWrapper,
        phase: PatchPhase::DynamicSurfaces,
        priority: 2,
        idempotency: Idempotency::ApplyOnce,
        required_global: Some("AudioBuffer"),
        script: scripts::audio_noise_script(profile.audio_noise_amplitude()),
    });
    directives.push(PatchDirective {
        surface: "webgl parameters".to_string(),
        kind: ReplacementKind::FunctionWrapper,
        phase: PatchPhase::DynamicSurfaces,
        priority: 3,
        idempotency: Idempotency::ApplyOnce,
        required_global: Some("WebGLRenderingContext"),
        script: scripts::webgl_parameter_script(
            "WebGLRenderingContext",
            profile.webgl_vendor(),
            profile.webgl_renderer(),
        ),
    });
    directives.push(PatchDirective {
        surface: "webgl2 parameters".to_string(),
        kind: ReplacementKind::FunctionWrapper,
        phase: PatchPhase::DynamicSurfaces,
        priority: 4,
        idempotency: Idempotency::ApplyOnce,
        required_global: Some("WebGL2RenderingContext"),
        script: scripts::webgl_parameter_script(
            "WebGL2RenderingContext",
            profile.webgl_vendor(),
            profile.webgl_renderer(),
        ),
    });

    // Phase 4: non-configurable re-assertion wins any later write.
    directives.push(PatchDirective {
        surface: "identity lock-in".to_string(),
        kind: ReplacementKind::ComputedGetter,
        phase: PatchPhase::LockIn,
        priority: 0,
        idempotency: Idempotency::ApplyOnce,
        required_global: None,
        script: scripts::lock_in_script(profile),
    });

    directives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MockBehavior, MockBrowsingContext};

    fn engine() -> PatchEngine {
        PatchEngine::new(StealthProfile::windows_chrome())
    }

    #[test]
    fn directives_are_phase_ordered() {
        let engine = engine();
        let keys: Vec<(u8, u8)> = engine
            .directives()
            .iter()
            .map(PatchDirective::sort_key)
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        assert_eq!(engine.directives()[0].surface, "navigator.webdriver");
        assert_eq!(
            engine.directives().last().map(|d| d.phase),
            Some(PatchPhase::LockIn)
        );
    }

    #[tokio::test]
    async fn apply_installs_every_directive_on_full_runtime() {
        let engine = engine();
        let ctx = MockBrowsingContext::new(MockBehavior::default());

        let report = engine.apply(&ctx).await.unwrap();
        assert!(report.is_complete(), "skipped: {:?}", report.skipped);
        assert_eq!(report.applied.len(), engine.directives().len());
        assert_eq!(report.applied[0], "navigator.webdriver");
    }

    #[tokio::test]
    async fn missing_global_skips_without_failing() {
        let engine = engine();
        let ctx = MockBrowsingContext::new(
            MockBehavior::new().without_global("WebGL2RenderingContext"),
        );

        let report = engine.apply(&ctx).await.unwrap();
        assert_eq!(
            report.skipped,
            vec![SkippedDirective {
                surface: "webgl2 parameters".to_string(),
                missing_global: "WebGL2RenderingContext",
            }]
        );
        assert!(report.applied.iter().any(|s| s == "webgl parameters"));
    }

    #[tokio::test]
    async fn second_pass_only_reruns_safe_directives() {
        let engine = engine();
        let ctx = MockBrowsingContext::new(MockBehavior::default());

        engine.apply(&ctx).await.unwrap();
        let second = engine.apply(&ctx).await.unwrap();

        assert!(second.applied.iter().all(|surface| {
            engine
                .directives()
                .iter()
                .find(|d| &d.surface == surface)
                .map(|d| d.idempotency == Idempotency::SafeToReapply)
                .unwrap_or(false)
        }));
        assert!(!second.applied.iter().any(|s| s == "canvas read-back"));
    }

    #[tokio::test]
    async fn fresh_context_gets_full_pass_again() {
        let engine = engine();
        let first = MockBrowsingContext::new(MockBehavior::default());
        let second = MockBrowsingContext::new(MockBehavior::default());

        engine.apply(&first).await.unwrap();
        let report = engine.apply(&second).await.unwrap();
        assert_eq!(report.applied.len(), engine.directives().len());
    }

    #[tokio::test]
    async fn failed_pass_is_not_recorded_as_patched() {
        let engine = engine();
        let ctx = MockBrowsingContext::new(
            MockBehavior::new().fail_next_evaluations("page crashed", 1),
        );

        assert!(engine.apply(&ctx).await.is_err());

        // The retry must reinstall everything, apply-once wrappers included.
        let report = engine.apply(&ctx).await.unwrap();
        assert_eq!(report.applied.len(), engine.directives().len());
    }

    #[test]
    fn full_script_guards_conditional_directives() {
        let script = engine().full_script();
        assert!(script.contains("if (typeof WebGLRenderingContext !== 'undefined')"));
        assert!(script.contains("navigator.webdriver"));
        // Lock-in renders after everything else.
        let lock = script.find("identity lock-in").unwrap();
        let canvas = script.find("canvas read-back").unwrap();
        assert!(lock > canvas);
    }
}
