//! Browsing-context provider boundary.
//!
//! The patch engine and harness never talk to a browser directly. They only
//! require a [`BrowsingContext`] capability (navigate, evaluate a script,
//! wait for a selector or predicate, take a screenshot, close) and a
//! [`ContextProvider`] that hands out fresh contexts on demand. A real
//! implementation wraps an external browser engine; [`MockContextProvider`]
//! simulates one for tests and dry runs.
//!
//! Patches are context-scoped, never process-scoped: every context created
//! by a provider starts unpatched, and the harness re-runs the full phased
//! patch sequence on each one before any other script executes in it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use crate::patch::NoiseGenerator;

/// One isolated page plus its runtime globals.
///
/// The unit to which patches are applied, and the owner of the associated
/// browser process resources. Implementations must release those resources
/// in [`close`](BrowsingContext::close) and fail subsequent operations.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    /// Stable identity of this context for logging and leak accounting.
    fn id(&self) -> Uuid;

    /// Navigates the context to `url`, resolving when the load commits.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluates a script in the page and returns its JSON-shaped result.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Resolves once an element matching `selector` is attached.
    async fn wait_for_selector(&self, selector: &str) -> Result<()>;

    /// Resolves once the JS expression `predicate` evaluates truthy.
    async fn wait_for_predicate(&self, predicate: &str) -> Result<()>;

    /// Captures the current viewport as encoded image bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Releases the context and its process resources. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Supplies fresh, unpatched browsing contexts on demand.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn create_context(&self) -> Result<Box<dyn BrowsingContext>>;
}

/// Scripted behavior for [`MockBrowsingContext`] instances.
///
/// Defaults model a cooperative page: navigation and waits resolve
/// immediately, all common globals are present, and unknown evaluations
/// return `null`.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    eval_results: HashMap<String, Value>,
    navigation_delay: Option<Duration>,
    navigation_error: Option<String>,
    evaluation_error: Option<String>,
    evaluation_failure_limit: Option<u32>,
    hang_waits: bool,
    wait_delay: Option<Duration>,
    missing_globals: HashSet<String>,
    canvas_source: Vec<u8>,
    noise_amplitude: u8,
    screenshot_bytes: Vec<u8>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            eval_results: HashMap::new(),
            navigation_delay: None,
            navigation_error: None,
            evaluation_error: None,
            evaluation_failure_limit: None,
            hang_waits: false,
            wait_delay: None,
            missing_globals: HashSet::new(),
            // Small RGBA gradient standing in for a rendered canvas.
            canvas_source: (0..64u8).map(|i| i.wrapping_mul(4)).collect(),
            noise_amplitude: 2,
            screenshot_bytes: b"\x89PNG\r\n\x1a\nmock".to_vec(),
        }
    }
}

impl MockBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `value` for an exact `script` evaluation.
    pub fn eval_result(mut self, script: impl Into<String>, value: Value) -> Self {
        self.eval_results.insert(script.into(), value);
        self
    }

    /// Delays every navigation, for exercising navigation timeouts.
    pub fn navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = Some(delay);
        self
    }

    /// Fails every navigation with the given message.
    pub fn fail_navigation(mut self, message: impl Into<String>) -> Self {
        self.navigation_error = Some(message.into());
        self
    }

    /// Fails every script evaluation with the given message.
    pub fn fail_evaluations(mut self, message: impl Into<String>) -> Self {
        self.evaluation_error = Some(message.into());
        self.evaluation_failure_limit = None;
        self
    }

    /// Fails only the first `count` evaluations; later ones succeed.
    pub fn fail_next_evaluations(mut self, message: impl Into<String>, count: u32) -> Self {
        self.evaluation_error = Some(message.into());
        self.evaluation_failure_limit = Some(count);
        self
    }

    /// Makes every wait-for-selector/predicate hang forever.
    pub fn hang_waits(mut self) -> Self {
        self.hang_waits = true;
        self
    }

    /// Delays every wait before resolving.
    pub fn wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = Some(delay);
        self
    }

    /// Removes a global from the simulated runtime, so directives that
    /// require it are skipped by the patch engine.
    pub fn without_global(mut self, name: impl Into<String>) -> Self {
        self.missing_globals.insert(name.into());
        self
    }

    /// Replaces the simulated canvas pixel source.
    pub fn canvas_source(mut self, pixels: Vec<u8>) -> Self {
        self.canvas_source = pixels;
        self
    }

    pub fn noise_amplitude(mut self, amplitude: u8) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    pub fn screenshot_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot_bytes = bytes;
        self
    }
}

#[derive(Debug)]
struct MockState {
    id: Uuid,
    behavior: MockBehavior,
    closed: RwLock<bool>,
    eval_failures_left: Mutex<Option<u32>>,
    visited: RwLock<Vec<String>>,
    applied_scripts: RwLock<Vec<String>>,
    webdriver_patched: RwLock<bool>,
    canvas_patched: RwLock<bool>,
    noise: Mutex<NoiseGenerator>,
}

/// In-memory browsing context used by tests and simulated runs.
///
/// Simulates just enough page runtime for the harness and patch engine:
/// `typeof X !== 'undefined'` probes answer from a configurable global set,
/// `navigator.webdriver` reads reflect whether the identity patch was
/// applied, and canvas read-back evaluations return noise-perturbed pixels
/// once the canvas wrapper is installed.
#[derive(Clone)]
pub struct MockBrowsingContext {
    state: Arc<MockState>,
}

impl MockBrowsingContext {
    pub fn new(behavior: MockBehavior) -> Self {
        let amplitude = behavior.noise_amplitude;
        let eval_failures_left = behavior.evaluation_failure_limit;
        Self {
            state: Arc::new(MockState {
                id: Uuid::new_v4(),
                behavior,
                closed: RwLock::new(false),
                eval_failures_left: Mutex::new(eval_failures_left),
                visited: RwLock::new(Vec::new()),
                applied_scripts: RwLock::new(Vec::new()),
                webdriver_patched: RwLock::new(false),
                canvas_patched: RwLock::new(false),
                noise: Mutex::new(NoiseGenerator::new(amplitude)),
            }),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.state.closed.read() {
            bail!("browsing context {} is closed", self.state.id);
        }
        Ok(())
    }

    fn handle(&self) -> MockContextHandle {
        MockContextHandle {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl BrowsingContext for MockBrowsingContext {
    fn id(&self) -> Uuid {
        self.state.id
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.ensure_open()?;
        if let Some(delay) = self.state.behavior.navigation_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref message) = self.state.behavior.navigation_error {
            bail!("navigation to {url} failed: {message}");
        }
        self.state.visited.write().push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.ensure_open()?;

        if let Some(ref message) = self.state.behavior.evaluation_error {
            let failing = {
                let mut left = self.state.eval_failures_left.lock();
                match left.as_mut() {
                    None => true,
                    Some(0) => false,
                    Some(remaining) => {
                        *remaining -= 1;
                        true
                    }
                }
            };
            if failing {
                bail!("evaluation failed: {message}");
            }
        }

        // Global-presence probes emitted by the patch engine.
        if let Some(name) = script
            .strip_prefix("typeof ")
            .and_then(|rest| rest.strip_suffix(" !== 'undefined'"))
        {
            return Ok(Value::Bool(
                !self.state.behavior.missing_globals.contains(name),
            ));
        }

        if script == "navigator.webdriver" {
            return Ok(if *self.state.webdriver_patched.read() {
                Value::Null
            } else {
                Value::Bool(true)
            });
        }

        // Canvas read-back: perturbed once the canvas wrapper is installed.
        if script.contains("toDataURL") && !script.contains("prototype") {
            use base64::Engine as _;
            let mut pixels = self.state.behavior.canvas_source.clone();
            if *self.state.canvas_patched.read() {
                self.state.noise.lock().perturb_pixels(&mut pixels);
            }
            return Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(pixels),
            ));
        }

        if let Some(value) = self.state.behavior.eval_results.get(script) {
            return Ok(value.clone());
        }

        // Anything else is treated as an installed override script.
        if script.contains("webdriver") {
            *self.state.webdriver_patched.write() = true;
        }
        if script.contains("getImageData") {
            *self.state.canvas_patched.write() = true;
        }
        self.state.applied_scripts.write().push(script.to_string());
        Ok(Value::Null)
    }

    async fn wait_for_selector(&self, _selector: &str) -> Result<()> {
        self.ensure_open()?;
        if self.state.behavior.hang_waits {
            futures::future::pending::<()>().await;
        }
        if let Some(delay) = self.state.behavior.wait_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn wait_for_predicate(&self, _predicate: &str) -> Result<()> {
        self.ensure_open()?;
        if self.state.behavior.hang_waits {
            futures::future::pending::<()>().await;
        }
        if let Some(delay) = self.state.behavior.wait_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        Ok(self.state.behavior.screenshot_bytes.clone())
    }

    async fn close(&self) -> Result<()> {
        *self.state.closed.write() = true;
        Ok(())
    }
}

/// Inspection handle over a mock context created by a provider.
#[derive(Clone)]
pub struct MockContextHandle {
    state: Arc<MockState>,
}

impl MockContextHandle {
    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn is_closed(&self) -> bool {
        *self.state.closed.read()
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.visited.read().clone()
    }

    pub fn applied_scripts(&self) -> Vec<String> {
        self.state.applied_scripts.read().clone()
    }

    pub fn webdriver_patched(&self) -> bool {
        *self.state.webdriver_patched.read()
    }
}

/// Provider of [`MockBrowsingContext`] instances sharing one behavior.
///
/// Keeps a handle to every context it created so tests can assert that the
/// harness released them all on every exit path.
pub struct MockContextProvider {
    behavior: MockBehavior,
    created: Mutex<Vec<MockContextHandle>>,
    create_error: Option<String>,
}

impl MockContextProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            created: Mutex::new(Vec::new()),
            create_error: None,
        }
    }

    /// Provider whose `create_context` always fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::default(),
            created: Mutex::new(Vec::new()),
            create_error: Some(message.into()),
        }
    }

    /// Handles of every context created so far, in creation order.
    pub fn contexts(&self) -> Vec<MockContextHandle> {
        self.created.lock().clone()
    }
}

impl Default for MockContextProvider {
    fn default() -> Self {
        Self::new(MockBehavior::default())
    }
}

#[async_trait]
impl ContextProvider for MockContextProvider {
    async fn create_context(&self) -> Result<Box<dyn BrowsingContext>> {
        if let Some(ref message) = self.create_error {
            bail!("context provisioning failed: {message}");
        }
        let ctx = MockBrowsingContext::new(self.behavior.clone());
        self.created.lock().push(ctx.handle());
        Ok(Box::new(ctx))
    }
}
