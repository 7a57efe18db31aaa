//! arh.antoinevastel.com "Are You Headless".
//!
//! The page runs its checks client-side and renders labelled results. The
//! validator looks for any affirmative headless indicator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::context::BrowsingContext;
use crate::registry::{
    DetectionTestEntry, Extractor, RawData, ValidatorFault, Validator, Verdict,
};

pub const HEADLESS_URL: &str = "https://arh.antoinevastel.com/bots/areyouheadless";

pub const HEADLESS_EXTRACT_SCRIPT: &str = r#"(() => {
    const results = {};
    document.querySelectorAll('.test-result').forEach(element => {
        const label = element.querySelector('.test-label')?.innerText || 'unknown';
        const status = element.querySelector('.test-status')?.innerText || 'unknown';
        const value = element.querySelector('.test-value')?.innerText || '';
        results[label] = { status: status, value: value };
    });
    if (Object.keys(results).length === 0) {
        results['page_content'] = document.body.innerText.substring(0, 500);
    }
    return results;
})()"#;

pub struct HeadlessExtractor;

#[async_trait]
impl Extractor for HeadlessExtractor {
    async fn extract(&self, ctx: &dyn BrowsingContext) -> Result<RawData> {
        ctx.evaluate(HEADLESS_EXTRACT_SCRIPT).await
    }
}

pub struct HeadlessValidator;

impl Validator for HeadlessValidator {
    fn validate(&self, data: &RawData) -> Result<Verdict, ValidatorFault> {
        if let Some(error) = data.get("error").and_then(Value::as_str) {
            return Ok(Verdict::fail(vec![format!("extraction error: {error}")]));
        }
        let results = data.as_object().ok_or_else(|| {
            ValidatorFault("headless payload is not a JSON object".to_string())
        })?;

        let mut reasons = Vec::new();
        for (label, result) in results {
            match result {
                Value::Object(fields) => {
                    let status = fields
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_lowercase();
                    let value = fields
                        .get("value")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_lowercase();
                    let affirms_headless = |s: &str| s.contains("headless") && !s.contains("not");
                    if affirms_headless(&status) || affirms_headless(&value) {
                        reasons.push(format!("{label}: reported headless"));
                    }
                }
                Value::String(text) => {
                    if text.to_lowercase().contains("headless")
                        && !text.to_lowercase().contains("not headless")
                    {
                        reasons.push(format!("{label}: mentions headless"));
                    }
                }
                _ => {}
            }
        }

        if reasons.is_empty() {
            Ok(Verdict::pass())
        } else {
            Ok(Verdict::fail(reasons))
        }
    }
}

pub fn headless_target() -> DetectionTestEntry {
    DetectionTestEntry::new(
        "headless",
        HEADLESS_URL,
        Arc::new(HeadlessExtractor),
        Arc::new(HeadlessValidator),
    )
    .with_description("Are You Headless browser detection")
    .with_wait_for_selector("body")
    .with_timeout(Duration::from_secs(15))
}
