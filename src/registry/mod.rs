//! Detection Test Registry
//!
//! Catalog of detection targets the harness can run against. Each entry
//! couples a page URL with an async extractor (live page to raw JSON) and a
//! pure validator (raw JSON to verdict). The registry is an explicitly
//! constructed object; nothing registers itself at load time, the host
//! decides which targets exist by calling [`DetectionRegistry::register`]
//! or starting from [`DetectionRegistry::with_builtin_targets`].

pub mod targets;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::context::BrowsingContext;

/// Raw extraction payload, always JSON-shaped.
pub type RawData = serde_json::Value;

/// Registration errors.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A target with this name is already registered. The first entry is
    /// retained; silent replacement would hide a wiring mistake.
    #[error("detection target {0:?} is already registered")]
    DuplicateName(String),
}

/// A defect in a validator implementation, as opposed to a page that
/// failed validation. Aborts the whole harness run.
#[derive(Debug, Clone, Error)]
#[error("validator fault: {0}")]
pub struct ValidatorFault(pub String);

/// Pulls the raw detection payload out of a live, navigated page.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, ctx: &dyn BrowsingContext) -> Result<RawData>;
}

/// Judges a raw payload. Pure; must not touch the page.
///
/// `Ok(verdict)` is a normal outcome either way. `Err` means the validator
/// itself is broken and the run cannot be trusted.
pub trait Validator: Send + Sync {
    fn validate(&self, data: &RawData) -> Result<Verdict, ValidatorFault>;
}

/// Validation outcome with ordered human-readable reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub reasons: Vec<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reasons: Vec::new(),
        }
    }

    pub fn pass_with(reasons: Vec<String>) -> Self {
        Self {
            passed: true,
            reasons,
        }
    }

    pub fn fail(reasons: Vec<String>) -> Self {
        Self {
            passed: false,
            reasons,
        }
    }
}

/// Adapter turning a callable into an [`Extractor`]. The callable must be
/// higher-ranked over the context lifetime; plain `fn` items qualify,
/// closures returning boxed futures generally do not.
pub struct FnExtractor<F>(pub F);

#[async_trait]
impl<F> Extractor for FnExtractor<F>
where
    F: for<'a> Fn(&'a dyn BrowsingContext) -> BoxFuture<'a, Result<RawData>> + Send + Sync,
{
    async fn extract(&self, ctx: &dyn BrowsingContext) -> Result<RawData> {
        (self.0)(ctx).await
    }
}

/// Adapter turning a plain closure into a [`Validator`].
pub struct FnValidator<F>(pub F);

impl<F> Validator for FnValidator<F>
where
    F: Fn(&RawData) -> Result<Verdict, ValidatorFault> + Send + Sync,
{
    fn validate(&self, data: &RawData) -> Result<Verdict, ValidatorFault> {
        (self.0)(data)
    }
}

/// What the harness waits for after navigation before extracting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// An element matching this selector is attached.
    Selector(String),
    /// This JS expression evaluates truthy.
    Predicate(String),
}

/// One runnable detection target.
#[derive(Clone)]
pub struct DetectionTestEntry {
    name: String,
    url: String,
    description: String,
    wait: Option<WaitCondition>,
    expected_keys: Vec<String>,
    timeout: Duration,
    extractor: Arc<dyn Extractor>,
    validator: Arc<dyn Validator>,
}

impl DetectionTestEntry {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        extractor: Arc<dyn Extractor>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: String::new(),
            wait: None,
            expected_keys: Vec::new(),
            timeout: Duration::from_secs(30),
            extractor,
            validator,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_wait_for_selector(mut self, selector: impl Into<String>) -> Self {
        self.wait = Some(WaitCondition::Selector(selector.into()));
        self
    }

    pub fn with_wait_for_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.wait = Some(WaitCondition::Predicate(predicate.into()));
        self
    }

    /// Top-level keys the extracted payload must carry. Missing keys are a
    /// schema drift error, reported before the validator ever runs.
    pub fn with_expected_keys(mut self, keys: Vec<String>) -> Self {
        self.expected_keys = keys;
        self
    }

    /// Per-entry budget. Navigation gets one full budget; wait plus
    /// extraction share a second, independent one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn wait(&self) -> Option<&WaitCondition> {
        self.wait.as_ref()
    }

    pub fn expected_keys(&self) -> &[String] {
        &self.expected_keys
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }
}

impl fmt::Debug for DetectionTestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionTestEntry")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("wait", &self.wait)
            .field("expected_keys", &self.expected_keys)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Ordered catalog of detection targets, unique by name.
#[derive(Default)]
pub struct DetectionRegistry {
    entries: Vec<DetectionTestEntry>,
    index: HashMap<String, usize>,
}

impl DetectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in detection targets.
    pub fn with_builtin_targets() -> Self {
        let mut registry = Self::new();
        for entry in targets::builtin_targets() {
            // Built-in names are statically unique.
            let _ = registry.register(entry);
        }
        registry
    }

    pub fn register(&mut self, entry: DetectionTestEntry) -> Result<(), RegistryError> {
        if self.index.contains_key(entry.name()) {
            return Err(RegistryError::DuplicateName(entry.name().to_string()));
        }
        self.index
            .insert(entry.name().to_string(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&DetectionTestEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// All entries in registration order.
    pub fn entries(&self) -> &[DetectionTestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
