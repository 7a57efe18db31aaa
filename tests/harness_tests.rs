//! Integration tests for the detection-verification harness.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use stealth_harness::context::{BrowsingContext, MockBehavior, MockContextProvider};
use stealth_harness::harness::{cancel_pair, Harness, HarnessError, IsolationMode};
use stealth_harness::profile::StealthProfile;
use stealth_harness::registry::{
    DetectionTestEntry, Extractor, FnValidator, RawData, Validator, ValidatorFault, Verdict,
};
use stealth_harness::report::{MemoryArtifactSink, Outcome};

struct StaticExtractor(serde_json::Value);

#[async_trait]
impl Extractor for StaticExtractor {
    async fn extract(&self, _ctx: &dyn BrowsingContext) -> anyhow::Result<RawData> {
        Ok(self.0.clone())
    }
}

struct FaultingExtractor(&'static str);

#[async_trait]
impl Extractor for FaultingExtractor {
    async fn extract(&self, _ctx: &dyn BrowsingContext) -> anyhow::Result<RawData> {
        anyhow::bail!(self.0)
    }
}

/// Never resolves; the run loop's budget has to cut it off.
struct HangingExtractor;

#[async_trait]
impl Extractor for HangingExtractor {
    async fn extract(&self, _ctx: &dyn BrowsingContext) -> anyhow::Result<RawData> {
        futures::future::pending().await
    }
}

fn extractor_returning(value: serde_json::Value) -> Arc<dyn Extractor> {
    Arc::new(StaticExtractor(value))
}

fn faulting_extractor(message: &'static str) -> Arc<dyn Extractor> {
    Arc::new(FaultingExtractor(message))
}

fn bot_flag_validator() -> Arc<dyn Validator> {
    Arc::new(FnValidator(|data: &RawData| {
        Ok(match data.get("bot").and_then(serde_json::Value::as_bool) {
            Some(false) => Verdict::pass(),
            _ => Verdict::fail(vec!["page judged the identity a bot".to_string()]),
        })
    }))
}

fn entry(name: &str, value: serde_json::Value) -> DetectionTestEntry {
    DetectionTestEntry::new(
        name,
        format!("https://{name}.test/"),
        extractor_returning(value),
        bot_flag_validator(),
    )
    .with_timeout(Duration::from_secs(2))
}

fn harness_with(behavior: MockBehavior) -> (Harness, Arc<MockContextProvider>) {
    let provider = Arc::new(MockContextProvider::new(behavior));
    let harness = Harness::new(provider.clone(), StealthProfile::windows_chrome());
    (harness, provider)
}

#[tokio::test]
async fn clean_pass_produces_full_pass_rate() {
    // The end-to-end identity: Windows platform, D3D11 renderer, UTC-5.
    let profile = StealthProfile::builder()
        .webgl_strings(
            "Google Inc. (Intel)",
            "ANGLE (Intel, Intel(R) UHD Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
        )
        .timezone_offset_minutes(300)
        .build()
        .unwrap();
    let provider = Arc::new(MockContextProvider::default());
    let harness = Harness::new(provider, profile);

    let report = harness
        .run(
            &[entry("botd", json!({ "bot": false }))],
            IsolationMode::SharedContext,
        )
        .await
        .unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.errored, 0);
    assert!((report.pass_rate() - 1.0).abs() < f64::EPSILON);
    assert_eq!(report.results[0].outcome, Outcome::Passed);
    assert_eq!(report.results[0].raw_data, Some(json!({ "bot": false })));
}

#[tokio::test]
async fn navigation_timeout_errors_with_canonical_reason() {
    let (harness, provider) = harness_with(
        MockBehavior::new().navigation_delay(Duration::from_secs(60)),
    );
    let slow = entry("unreachable", json!({ "bot": false }))
        .with_timeout(Duration::from_millis(1));

    let report = harness
        .run(&[slow], IsolationMode::PerEntryContext)
        .await
        .unwrap();

    assert_eq!(report.errored, 1);
    let result = &report.results[0];
    assert_eq!(result.outcome, Outcome::Errored);
    assert_eq!(result.reasons, vec!["navigation timeout".to_string()]);
    assert!(result.raw_data.is_none());
    assert!(provider.contexts().iter().all(|c| c.is_closed()));
}

#[tokio::test]
async fn hung_wait_errors_rather_than_fails() {
    let (harness, provider) = harness_with(MockBehavior::new().hang_waits());
    let waiting = entry("stuck", json!({ "bot": false }))
        .with_wait_for_selector("#results")
        .with_timeout(Duration::from_millis(50));

    let report = harness
        .run(&[waiting], IsolationMode::PerEntryContext)
        .await
        .unwrap();

    assert_eq!(report.failed, 0);
    assert_eq!(report.errored, 1);
    assert_eq!(report.results[0].reasons, vec!["wait timeout".to_string()]);
    assert!(provider.contexts().iter().all(|c| c.is_closed()));
}

#[tokio::test]
async fn slow_extraction_gets_only_the_budget_remainder() {
    // The wait eats most of the shared budget; a hanging extractor then
    // times out with the extraction reason, not the wait reason.
    let (harness, _provider) = harness_with(
        MockBehavior::new().wait_delay(Duration::from_millis(80)),
    );
    let hanging = DetectionTestEntry::new(
        "slow-extract",
        "https://slow.test/",
        Arc::new(HangingExtractor),
        bot_flag_validator(),
    )
    .with_wait_for_selector("table")
    .with_timeout(Duration::from_millis(120));

    let report = harness
        .run(&[hanging], IsolationMode::SharedContext)
        .await
        .unwrap();

    assert_eq!(report.errored, 1);
    assert_eq!(
        report.results[0].reasons,
        vec!["extraction timeout".to_string()]
    );
}

#[tokio::test]
async fn extractor_fault_is_isolated_to_its_entry() {
    let (harness, _provider) = harness_with(MockBehavior::default());
    let entries = vec![
        DetectionTestEntry::new(
            "broken",
            "https://broken.test/",
            faulting_extractor("page layout changed"),
            bot_flag_validator(),
        )
        .with_timeout(Duration::from_secs(2)),
        entry("healthy", json!({ "bot": false })),
    ];

    let report = harness
        .run(&entries, IsolationMode::SharedContext)
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.errored, 1);
    assert_eq!(report.passed, 1);
    let broken = &report.results[0];
    assert_eq!(broken.outcome, Outcome::Errored);
    assert_eq!(broken.reasons.len(), 1);
    assert!(broken.reasons[0].contains("page layout changed"));
}

#[tokio::test]
async fn missing_expected_keys_error_before_validation() {
    let (harness, _provider) = harness_with(MockBehavior::default());
    let drifted = entry("drifted", json!({ "unexpected": 1 }))
        .with_expected_keys(vec!["visitorId".to_string(), "status".to_string()]);

    let report = harness
        .run(&[drifted], IsolationMode::SharedContext)
        .await
        .unwrap();

    assert_eq!(report.errored, 1);
    assert_eq!(
        report.results[0].reasons,
        vec![
            "missing expected key `visitorId`".to_string(),
            "missing expected key `status`".to_string(),
        ]
    );
}

#[tokio::test]
async fn validator_fault_aborts_the_run() {
    let (harness, provider) = harness_with(MockBehavior::default());
    let faulty = DetectionTestEntry::new(
        "faulty-plugin",
        "https://faulty.test/",
        extractor_returning(json!({})),
        Arc::new(FnValidator(|_data: &RawData| {
            Err(ValidatorFault("panicked on shape".to_string()))
        })),
    )
    .with_timeout(Duration::from_secs(2));
    let entries = vec![faulty, entry("never-runs", json!({ "bot": false }))];

    let err = harness
        .run(&entries, IsolationMode::SharedContext)
        .await
        .unwrap_err();

    match err {
        HarnessError::ValidatorFault { target, fault } => {
            assert_eq!(target, "faulty-plugin");
            assert!(fault.to_string().contains("panicked on shape"));
        }
        other => panic!("expected validator fault, got {other:?}"),
    }
    assert!(provider.contexts().iter().all(|c| c.is_closed()));
}

#[tokio::test]
async fn pass_rate_is_exact_over_mixed_outcomes() {
    let (harness, _provider) = harness_with(MockBehavior::default());
    let entries = vec![
        entry("pass-1", json!({ "bot": false })),
        entry("pass-2", json!({ "bot": false })),
        entry("fail-1", json!({ "bot": true })),
        DetectionTestEntry::new(
            "error-1",
            "https://error.test/",
            faulting_extractor("boom"),
            bot_flag_validator(),
        )
        .with_timeout(Duration::from_secs(2)),
    ];

    let report = harness
        .run(&entries, IsolationMode::PerEntryContext)
        .await
        .unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.passed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errored, 1);
    assert!((report.pass_rate() - 0.5).abs() < f64::EPSILON);

    let empty = harness
        .run(&[], IsolationMode::SharedContext)
        .await
        .unwrap();
    assert_eq!(empty.pass_rate(), 0.0);
}

#[tokio::test]
async fn isolation_modes_control_context_counts() {
    let entries = vec![
        entry("a", json!({ "bot": false })),
        entry("b", json!({ "bot": false })),
        entry("c", json!({ "bot": false })),
    ];

    let (shared, shared_provider) = harness_with(MockBehavior::default());
    shared
        .run(&entries, IsolationMode::SharedContext)
        .await
        .unwrap();
    assert_eq!(shared_provider.contexts().len(), 1);

    let (isolated, isolated_provider) = harness_with(MockBehavior::default());
    isolated
        .run(&entries, IsolationMode::PerEntryContext)
        .await
        .unwrap();
    assert_eq!(isolated_provider.contexts().len(), 3);
    // Every context was patched before its entry ran, then released.
    assert!(isolated_provider
        .contexts()
        .iter()
        .all(|c| c.webdriver_patched() && c.is_closed()));
}

#[tokio::test]
async fn cancellation_stops_the_run_and_releases_contexts() {
    let (harness, provider) = harness_with(
        MockBehavior::new().navigation_delay(Duration::from_secs(60)),
    );
    let entries = vec![entry("slow", json!({ "bot": false }))
        .with_timeout(Duration::from_secs(120))];

    let (handle, signal) = cancel_pair();
    let run = tokio::spawn({
        let entries = entries.clone();
        async move {
            harness
                .run_with_cancel(&entries, IsolationMode::SharedContext, signal)
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let err = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("cancellation must end the run promptly")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, HarnessError::Cancelled));
    assert!(provider.contexts().iter().all(|c| c.is_closed()));
}

#[tokio::test]
async fn screenshots_are_captured_through_the_sink() {
    let provider = Arc::new(MockContextProvider::new(
        MockBehavior::new().screenshot_bytes(b"fake-png".to_vec()),
    ));
    let sink = Arc::new(MemoryArtifactSink::new());
    let harness = Harness::new(provider, StealthProfile::windows_chrome())
        .with_artifact_sink(sink.clone());

    let report = harness
        .run(
            &[entry("shot", json!({ "bot": false }))],
            IsolationMode::SharedContext,
        )
        .await
        .unwrap();

    assert_eq!(sink.stored().len(), 1);
    assert_eq!(sink.stored()[0].0, "shot");
    assert!(report.results[0].screenshot_ref.is_some());
}

#[tokio::test]
async fn builtin_botd_target_runs_against_a_cooperative_page() {
    use stealth_harness::registry::targets::BOTD_EXTRACT_SCRIPT;

    let behavior =
        MockBehavior::new().eval_result(BOTD_EXTRACT_SCRIPT, json!({ "bot": false }));
    let provider = Arc::new(MockContextProvider::new(behavior));
    let harness = Harness::new(provider, StealthProfile::windows_chrome());

    let registry = stealth_harness::registry::DetectionRegistry::with_builtin_targets();
    let botd = registry.lookup("botd").unwrap().clone();

    let report = harness
        .run(&[botd], IsolationMode::SharedContext)
        .await
        .unwrap();

    assert_eq!(report.passed, 1);
    assert_eq!(report.results[0].page_name, "botd");
}
