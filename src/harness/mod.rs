//! Detection-Verification Harness
//!
//! Drives a set of registered detection targets against a patched browser
//! identity and aggregates their verdicts. Entries run sequentially within
//! a run; every entry's failure is isolated, so one timeout or extractor
//! fault never prevents the remaining entries from running. The one
//! exception is a faulting validator, which is a plugin-contract defect and
//! aborts the whole run.

mod cancel;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{BrowsingContext, ContextProvider};
use crate::patch::PatchEngine;
use crate::profile::StealthProfile;
use crate::registry::{DetectionTestEntry, ValidatorFault, WaitCondition};
use crate::report::{AggregateReport, ArtifactSink, NullArtifactSink, Outcome, TestRunResult};

/// Context-sharing strategy across the entries of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// One patched context, reused by every entry. Faster; entries can
    /// observe page state left behind by earlier ones.
    SharedContext,
    /// A fresh patched context per entry. Slower; full isolation.
    PerEntryContext,
}

/// Errors that abort a whole run. Per-entry failures are not here; they
/// land in the report as `Errored` results.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A validator returned `Err`. The run's verdicts can no longer be
    /// trusted, so the run stops instead of recording a result.
    #[error("validator for target {target:?} faulted: {fault}")]
    ValidatorFault {
        target: String,
        fault: ValidatorFault,
    },

    /// The run was cancelled through its [`CancelSignal`].
    #[error("run cancelled")]
    Cancelled,

    /// A browsing context could not be created or patched.
    #[error("context provisioning failed: {0:#}")]
    Provision(anyhow::Error),
}

enum EntryAbort {
    Cancelled,
    ValidatorFault { target: String, fault: ValidatorFault },
}

enum Step<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Races a future against its time budget and the run's cancel signal.
async fn bounded<T>(
    cancel: &mut CancelSignal,
    limit: Duration,
    fut: impl Future<Output = T>,
) -> Step<T> {
    tokio::select! {
        _ = cancel.cancelled() => Step::Cancelled,
        outcome = tokio::time::timeout(limit, fut) => match outcome {
            Ok(value) => Step::Done(value),
            Err(_) => Step::TimedOut,
        }
    }
}

/// Runs detection entries against a patched identity.
pub struct Harness {
    provider: Arc<dyn ContextProvider>,
    engine: PatchEngine,
    sink: Arc<dyn ArtifactSink>,
    capture_screenshots: bool,
}

impl Harness {
    pub fn new(provider: Arc<dyn ContextProvider>, profile: StealthProfile) -> Self {
        Self {
            provider,
            engine: PatchEngine::new(profile),
            sink: Arc::new(NullArtifactSink),
            capture_screenshots: false,
        }
    }

    /// Captures a best-effort screenshot per entry into `sink`.
    pub fn with_artifact_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self.capture_screenshots = true;
        self
    }

    pub fn engine(&self) -> &PatchEngine {
        &self.engine
    }

    /// Runs `entries` to completion without external cancellation.
    pub async fn run(
        &self,
        entries: &[DetectionTestEntry],
        mode: IsolationMode,
    ) -> Result<AggregateReport, HarnessError> {
        self.run_with_cancel(entries, mode, CancelSignal::never())
            .await
    }

    /// Runs `entries`, stopping promptly when `cancel` fires. Contexts are
    /// closed on every exit path, including cancellation and validator
    /// faults.
    pub async fn run_with_cancel(
        &self,
        entries: &[DetectionTestEntry],
        mode: IsolationMode,
        mut cancel: CancelSignal,
    ) -> Result<AggregateReport, HarnessError> {
        let mut report = AggregateReport::new();
        info!(
            run_id = %report.run_id,
            entries = entries.len(),
            ?mode,
            "starting detection run"
        );

        let shared = match mode {
            IsolationMode::SharedContext => Some(self.provision().await?),
            IsolationMode::PerEntryContext => None,
        };

        for entry in entries {
            if cancel.is_cancelled() {
                if let Some(ctx) = &shared {
                    let _ = ctx.close().await;
                }
                return Err(HarnessError::Cancelled);
            }

            let owned;
            let ctx: &dyn BrowsingContext = match &shared {
                Some(ctx) => ctx.as_ref(),
                None => {
                    owned = match self.provision().await {
                        Ok(ctx) => ctx,
                        Err(err) => return Err(err),
                    };
                    owned.as_ref()
                }
            };

            let outcome = self.run_entry(entry, ctx, &mut cancel).await;

            // Per-entry contexts are released as soon as the entry is done.
            if shared.is_none() {
                let _ = ctx.close().await;
            }

            match outcome {
                Ok(result) => {
                    debug!(
                        target = entry.name(),
                        outcome = ?result.outcome,
                        elapsed_ms = result.elapsed_ms,
                        "entry finished"
                    );
                    report.record(result);
                }
                Err(abort) => {
                    if let Some(ctx) = &shared {
                        let _ = ctx.close().await;
                    }
                    return Err(match abort {
                        EntryAbort::Cancelled => HarnessError::Cancelled,
                        EntryAbort::ValidatorFault { target, fault } => {
                            HarnessError::ValidatorFault { target, fault }
                        }
                    });
                }
            }
        }

        if let Some(ctx) = &shared {
            let _ = ctx.close().await;
        }
        info!(
            run_id = %report.run_id,
            passed = report.passed,
            failed = report.failed,
            errored = report.errored,
            "detection run complete"
        );
        Ok(report)
    }

    /// Creates a fresh context and runs the full phased patch sequence on
    /// it before anything else executes there.
    async fn provision(&self) -> Result<Box<dyn BrowsingContext>, HarnessError> {
        let ctx = self
            .provider
            .create_context()
            .await
            .map_err(HarnessError::Provision)?;
        // A context that could not be patched must not leak.
        let apply = match self.engine.apply(ctx.as_ref()).await {
            Ok(apply) => apply,
            Err(err) => {
                let _ = ctx.close().await;
                return Err(HarnessError::Provision(err));
            }
        };
        if !apply.is_complete() {
            warn!(
                context = %ctx.id(),
                skipped = apply.skipped.len(),
                "identity applied partially"
            );
        }
        Ok(ctx)
    }

    async fn run_entry(
        &self,
        entry: &DetectionTestEntry,
        ctx: &dyn BrowsingContext,
        cancel: &mut CancelSignal,
    ) -> Result<TestRunResult, EntryAbort> {
        let started = Instant::now();
        let errored = |reasons: Vec<String>, started: Instant| TestRunResult {
            page_name: entry.name().to_string(),
            outcome: Outcome::Errored,
            reasons,
            raw_data: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
            screenshot_ref: None,
        };

        // Navigation gets one full entry budget.
        match bounded(cancel, entry.timeout(), ctx.navigate(entry.url())).await {
            Step::Cancelled => return Err(EntryAbort::Cancelled),
            Step::TimedOut => {
                return Ok(errored(vec!["navigation timeout".to_string()], started))
            }
            Step::Done(Err(err)) => return Ok(errored(vec![format!("{err:#}")], started)),
            Step::Done(Ok(())) => {}
        }

        // Wait and extraction share a second, independent budget; the wait
        // consumes from it and extraction receives the remainder.
        let budget_started = Instant::now();
        if let Some(wait) = entry.wait() {
            let waited = match wait {
                WaitCondition::Selector(selector) => {
                    bounded(cancel, entry.timeout(), ctx.wait_for_selector(selector)).await
                }
                WaitCondition::Predicate(predicate) => {
                    bounded(cancel, entry.timeout(), ctx.wait_for_predicate(predicate)).await
                }
            };
            match waited {
                Step::Cancelled => return Err(EntryAbort::Cancelled),
                Step::TimedOut => {
                    return Ok(errored(vec!["wait timeout".to_string()], started))
                }
                Step::Done(Err(err)) => {
                    return Ok(errored(vec![format!("{err:#}")], started))
                }
                Step::Done(Ok(())) => {}
            }
        }

        let remaining = entry.timeout().saturating_sub(budget_started.elapsed());
        let raw_data = match bounded(cancel, remaining, entry.extractor().extract(ctx)).await
        {
            Step::Cancelled => return Err(EntryAbort::Cancelled),
            Step::TimedOut => {
                return Ok(errored(vec!["extraction timeout".to_string()], started))
            }
            // An extractor fault is caught at the boundary; its message is
            // the sole reason.
            Step::Done(Err(fault)) => {
                return Ok(errored(vec![format!("{fault:#}")], started))
            }
            Step::Done(Ok(data)) => data,
        };

        // Schema drift is an error, not a failed verdict; the validator
        // never sees a payload missing its contract keys.
        let missing: Vec<String> = entry
            .expected_keys()
            .iter()
            .filter(|key| raw_data.get(key.as_str()).is_none())
            .map(|key| format!("missing expected key `{key}`"))
            .collect();
        if !missing.is_empty() {
            return Ok(errored(missing, started));
        }

        let verdict = match entry.validator().validate(&raw_data) {
            Ok(verdict) => verdict,
            Err(fault) => {
                return Err(EntryAbort::ValidatorFault {
                    target: entry.name().to_string(),
                    fault,
                })
            }
        };

        let screenshot_ref = if self.capture_screenshots {
            self.capture(entry.name(), ctx).await
        } else {
            None
        };

        Ok(TestRunResult {
            page_name: entry.name().to_string(),
            outcome: if verdict.passed {
                Outcome::Passed
            } else {
                Outcome::Failed
            },
            reasons: verdict.reasons,
            raw_data: Some(raw_data),
            elapsed_ms: started.elapsed().as_millis() as u64,
            screenshot_ref,
        })
    }

    /// Best-effort capture; failures are logged and never change outcomes.
    async fn capture(&self, entry_name: &str, ctx: &dyn BrowsingContext) -> Option<String> {
        let bytes = match ctx.screenshot().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target = entry_name, error = %err, "screenshot capture failed");
                return None;
            }
        };
        match self.sink.store_screenshot(entry_name, &bytes) {
            Ok(reference) if reference.is_empty() => None,
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(target = entry_name, error = %err, "screenshot store failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MockBehavior, MockContextProvider};
    use crate::registry::{Extractor, FnValidator, RawData, Verdict};
    use async_trait::async_trait;
    use serde_json::json;

    /// Evaluates a trivial script so extraction is exercised end to end,
    /// then returns its fixed payload.
    struct ProbingExtractor(serde_json::Value);

    #[async_trait]
    impl Extractor for ProbingExtractor {
        async fn extract(&self, ctx: &dyn BrowsingContext) -> anyhow::Result<RawData> {
            ctx.evaluate("document.title").await?;
            Ok(self.0.clone())
        }
    }

    fn entry_with(
        name: &str,
        value: serde_json::Value,
        passed: bool,
    ) -> DetectionTestEntry {
        let validator = move |_data: &RawData| {
            Ok(if passed {
                Verdict::pass()
            } else {
                Verdict::fail(vec!["page flagged the identity".to_string()])
            })
        };
        DetectionTestEntry::new(
            name,
            format!("https://{name}.test/"),
            Arc::new(ProbingExtractor(value)),
            Arc::new(FnValidator(validator)),
        )
        .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn shared_mode_reuses_one_context() {
        let provider = Arc::new(MockContextProvider::default());
        let harness = Harness::new(provider.clone(), StealthProfile::windows_chrome());
        let entries = vec![
            entry_with("alpha", json!({}), true),
            entry_with("beta", json!({}), true),
        ];

        let report = harness
            .run(&entries, IsolationMode::SharedContext)
            .await
            .unwrap();

        assert_eq!(report.passed, 2);
        assert_eq!(provider.contexts().len(), 1);
        assert!(provider.contexts()[0].is_closed());
    }

    #[tokio::test]
    async fn per_entry_mode_provisions_per_entry() {
        let provider = Arc::new(MockContextProvider::default());
        let harness = Harness::new(provider.clone(), StealthProfile::windows_chrome());
        let entries = vec![
            entry_with("alpha", json!({}), true),
            entry_with("beta", json!({}), false),
        ];

        let report = harness
            .run(&entries, IsolationMode::PerEntryContext)
            .await
            .unwrap();

        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        let contexts = provider.contexts();
        assert_eq!(contexts.len(), 2);
        assert!(contexts.iter().all(|c| c.is_closed()));
        // Every context received the identity patch.
        assert!(contexts.iter().all(|c| c.webdriver_patched()));
    }

    #[tokio::test]
    async fn provisioning_failure_is_fatal() {
        let provider = Arc::new(MockContextProvider::failing("browser binary missing"));
        let harness = Harness::new(provider, StealthProfile::windows_chrome());

        let err = harness
            .run(
                &[entry_with("alpha", json!({}), true)],
                IsolationMode::SharedContext,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Provision(_)));
    }

    #[tokio::test]
    async fn failed_patch_application_closes_the_context() {
        let provider = Arc::new(MockContextProvider::new(
            MockBehavior::new().fail_evaluations("script rejected by page"),
        ));
        let harness = Harness::new(provider.clone(), StealthProfile::windows_chrome());

        let err = harness
            .run(
                &[entry_with("alpha", json!({}), true)],
                IsolationMode::SharedContext,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Provision(_)));
        let contexts = provider.contexts();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].is_closed());
    }
}
