//! FingerprintJS BotD.
//!
//! The page renders its verdict as JSON inside a `pre`/`code` block, either
//! the compact `{"bot": false}` shape or the full result object with
//! `detectionResult` and per-detector breakdowns. Both shapes validate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::BrowsingContext;
use crate::registry::{
    DetectionTestEntry, Extractor, RawData, ValidatorFault, Validator, Verdict,
};

pub const BOTD_URL: &str = "https://fingerprintjs.github.io/BotD/main/";

/// Scrapes the first JSON block that looks like a BotD result, falling back
/// to the globals some page revisions publish.
pub const BOTD_EXTRACT_SCRIPT: &str = r#"(() => {
    const blocks = Array.from(document.querySelectorAll('pre, code'));
    for (const el of blocks) {
        try {
            const parsed = JSON.parse(el.textContent);
            if (parsed && (parsed.bot !== undefined || parsed.detectionResult)) {
                return parsed;
            }
        } catch (e) {
            continue;
        }
    }
    if (window.botdResult) return window.botdResult;
    if (window.detectionResult) return window.detectionResult;
    return null;
})()"#;

pub struct BotdExtractor;

#[async_trait]
impl Extractor for BotdExtractor {
    async fn extract(&self, ctx: &dyn BrowsingContext) -> Result<RawData> {
        let data = ctx.evaluate(BOTD_EXTRACT_SCRIPT).await?;
        if data.is_null() {
            return Ok(json!({ "error": "no BotD results found on page" }));
        }
        Ok(data)
    }
}

pub struct BotdValidator;

impl Validator for BotdValidator {
    fn validate(&self, data: &RawData) -> Result<Verdict, ValidatorFault> {
        if let Some(error) = data.get("error").and_then(Value::as_str) {
            return Ok(Verdict::fail(vec![format!("extraction error: {error}")]));
        }

        // Compact shape: {"bot": bool, "botKind": "..."}.
        if data.get("detectionResult").is_none() {
            if let Some(bot) = data.get("bot").and_then(Value::as_bool) {
                if bot {
                    let kind = data
                        .get("botKind")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    return Ok(Verdict::fail(vec![format!(
                        "bot detected, kind: {kind}"
                    )]));
                }
                return Ok(Verdict::pass());
            }
            return Ok(Verdict::fail(vec![
                "payload carries neither bot flag nor detectionResult".to_string(),
            ]));
        }

        if data.get("isError").and_then(Value::as_bool).unwrap_or(true) {
            return Ok(Verdict::fail(vec![
                "BotD reported an error during detection".to_string(),
            ]));
        }

        let bot = data
            .get("detectionResult")
            .and_then(|r| r.get("bot"))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if bot {
            return Ok(Verdict::fail(vec!["bot detected".to_string()]));
        }

        let mut reasons = Vec::new();
        if let Some(detectors) = data.get("detectorsResults").and_then(Value::as_object) {
            let failed: Vec<&String> = detectors
                .iter()
                .filter(|(_, result)| {
                    result.get("bot").and_then(Value::as_bool).unwrap_or(false)
                })
                .map(|(name, _)| name)
                .collect();
            if !failed.is_empty() {
                reasons.push(format!(
                    "detectors flagged despite clean verdict: {}",
                    failed
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        Ok(Verdict::pass_with(reasons))
    }
}

pub fn botd_target() -> DetectionTestEntry {
    DetectionTestEntry::new(
        "botd",
        BOTD_URL,
        Arc::new(BotdExtractor),
        Arc::new(BotdValidator),
    )
    .with_description("FingerprintJS BotD bot detection")
    .with_wait_for_selector(".logs-content")
    .with_timeout(Duration::from_secs(30))
}
