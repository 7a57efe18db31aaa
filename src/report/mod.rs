//! Run reports and screenshot artifact sinks.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::RawData;

/// Outcome classification of one detection entry.
///
/// `Failed` is the page's judgement of the identity; `Errored` means the
/// harness never obtained a judgement (timeout, extractor fault, schema
/// drift). The two are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Errored,
}

/// Result of running one detection entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunResult {
    pub page_name: String,
    pub outcome: Outcome,
    /// Ordered reasons; empty for a clean pass.
    pub reasons: Vec<String>,
    /// Extracted payload; absent when the entry errored before extraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<RawData>,
    pub elapsed_ms: u64,
    /// Sink-assigned reference to the captured screenshot, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
}

/// Aggregated outcome of a full harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub errored: u32,
    pub results: Vec<TestRunResult>,
}

impl AggregateReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            total: 0,
            passed: 0,
            failed: 0,
            errored: 0,
            results: Vec::new(),
        }
    }

    /// Appends a result and updates the counters.
    pub fn record(&mut self, result: TestRunResult) {
        self.total += 1;
        match result.outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Errored => self.errored += 1,
        }
        self.results.push(result);
    }

    /// Fraction of entries that passed, in 0.0..=1.0. Zero for an empty run.
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.passed) / f64::from(self.total)
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing aggregate report")
    }
}

impl Default for AggregateReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination for captured screenshots.
///
/// Returns an opaque reference the report embeds. Sink failures are the
/// caller's to log; they never change an entry outcome.
pub trait ArtifactSink: Send + Sync {
    fn store_screenshot(&self, entry_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Discards every artifact.
pub struct NullArtifactSink;

impl ArtifactSink for NullArtifactSink {
    fn store_screenshot(&self, _entry_name: &str, _bytes: &[u8]) -> Result<String> {
        Ok(String::new())
    }
}

/// Writes timestamped PNGs into a directory, creating it on first use.
pub struct FsArtifactSink {
    directory: PathBuf,
}

impl FsArtifactSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl ArtifactSink for FsArtifactSink {
    fn store_screenshot(&self, entry_name: &str, bytes: &[u8]) -> Result<String> {
        std::fs::create_dir_all(&self.directory).with_context(|| {
            format!("creating screenshot directory {}", self.directory.display())
        })?;
        let filename = format!(
            "{}_{}.png",
            entry_name,
            Utc::now().format("%Y%m%d_%H%M%S%.3f")
        );
        let path = self.directory.join(&filename);
        std::fs::write(&path, bytes)
            .with_context(|| format!("writing screenshot {}", path.display()))?;
        Ok(path.display().to_string())
    }
}

/// Keeps artifacts in memory, base64-encoded. Intended for tests.
#[derive(Default)]
pub struct MemoryArtifactSink {
    stored: Mutex<Vec<(String, String)>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored (entry name, base64 payload) pairs in capture order.
    pub fn stored(&self) -> Vec<(String, String)> {
        self.stored.lock().clone()
    }
}

impl ArtifactSink for MemoryArtifactSink {
    fn store_screenshot(&self, entry_name: &str, bytes: &[u8]) -> Result<String> {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let mut stored = self.stored.lock();
        let reference = format!("memory:{}:{}", entry_name, stored.len());
        stored.push((entry_name.to_string(), encoded));
        Ok(reference)
    }
}
