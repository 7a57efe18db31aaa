//! Integration tests for the patch engine and identity profiles.

use base64::Engine as _;
use serde_json::Value;
use stealth_harness::context::{BrowsingContext, MockBehavior, MockBrowsingContext};
use stealth_harness::patch::{PatchEngine, PatchPhase};
use stealth_harness::profile::StealthProfile;

const CANVAS_READ: &str = "document.querySelector('canvas').toDataURL()";

fn decoded_canvas(value: &Value) -> Vec<u8> {
    let encoded = value.as_str().expect("canvas read returns a string");
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .expect("canvas payload is base64")
}

#[tokio::test]
async fn webdriver_reads_undefined_in_every_fresh_context() {
    let engine = PatchEngine::new(StealthProfile::windows_chrome());

    for _ in 0..2 {
        let ctx = MockBrowsingContext::new(MockBehavior::default());
        assert_eq!(
            ctx.evaluate("navigator.webdriver").await.unwrap(),
            Value::Bool(true),
            "unpatched context must still expose the flag"
        );

        let report = engine.apply(&ctx).await.unwrap();
        assert!(report.is_complete());

        assert_eq!(
            ctx.evaluate("navigator.webdriver").await.unwrap(),
            Value::Null,
            "patched context must hide the flag"
        );
    }
}

#[tokio::test]
async fn canvas_reads_are_bounded_and_never_identical() {
    let source: Vec<u8> = (0..128u8).collect();
    let amplitude = 2u8;
    let behavior = MockBehavior::new()
        .canvas_source(source.clone())
        .noise_amplitude(amplitude);
    let ctx = MockBrowsingContext::new(behavior);

    let profile = StealthProfile::builder()
        .canvas_noise_amplitude(amplitude)
        .build()
        .unwrap();
    PatchEngine::new(profile).apply(&ctx).await.unwrap();

    let mut previous: Option<Vec<u8>> = None;
    for _ in 0..8 {
        let pixels = decoded_canvas(&ctx.evaluate(CANVAS_READ).await.unwrap());
        assert_eq!(pixels.len(), source.len());

        for (orig, noised) in source.iter().zip(pixels.iter()) {
            let delta = (i16::from(*orig) - i16::from(*noised)).abs();
            assert!(delta <= i16::from(amplitude), "delta {delta} exceeds bound");
        }
        if let Some(prev) = previous {
            assert_ne!(prev, pixels, "two reads of an unchanged canvas matched");
        }
        previous = Some(pixels);
    }
}

#[tokio::test]
async fn unpatched_canvas_reads_are_stable() {
    let ctx = MockBrowsingContext::new(MockBehavior::default());
    let first = decoded_canvas(&ctx.evaluate(CANVAS_READ).await.unwrap());
    let second = decoded_canvas(&ctx.evaluate(CANVAS_READ).await.unwrap());
    assert_eq!(first, second, "without the wrapper the canvas is deterministic");
}

#[tokio::test]
async fn missing_runtime_globals_degrade_to_reported_skips() {
    let engine = PatchEngine::new(StealthProfile::linux_chrome());
    let ctx = MockBrowsingContext::new(
        MockBehavior::new()
            .without_global("AudioBuffer")
            .without_global("WebGL2RenderingContext"),
    );

    let report = engine.apply(&ctx).await.unwrap();

    let missing: Vec<&str> = report.skipped.iter().map(|s| s.missing_global).collect();
    assert_eq!(missing, vec!["AudioBuffer", "WebGL2RenderingContext"]);
    // Everything else still applied, including the lock-in pass.
    assert!(report.applied.iter().any(|s| s == "identity lock-in"));
    assert!(report.applied.iter().any(|s| s == "canvas read-back"));
}

#[test]
fn directive_phases_follow_the_fixed_order() {
    let engine = PatchEngine::new(StealthProfile::mac_chrome());
    let phases: Vec<PatchPhase> = engine.directives().iter().map(|d| d.phase).collect();

    let mut sorted = phases.clone();
    sorted.sort();
    assert_eq!(phases, sorted);
    assert_eq!(phases.first(), Some(&PatchPhase::IdentityMarkers));
    assert_eq!(phases.last(), Some(&PatchPhase::LockIn));
}

#[test]
fn full_script_reflects_the_profile_identity() {
    let profile = StealthProfile::builder()
        .webgl_strings(
            "Google Inc. (Intel)",
            "ANGLE (Intel, Intel(R) UHD Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
        )
        .timezone_offset_minutes(300)
        .build()
        .unwrap();
    let script = PatchEngine::new(profile).full_script();

    assert!(script.contains("Win32"));
    assert!(script.contains("ANGLE (Intel, Intel(R) UHD Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)"));
    assert!(script.contains("return 300"));
    assert!(script.contains("configurable: false"));
}
