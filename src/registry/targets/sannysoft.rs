//! bot.sannysoft.com.
//!
//! The page is a table of individual checks colored red (bot), green
//! (human) or yellow (suspicious). Extraction classifies each row by cell
//! background; validation requires at least 70 percent green with no more
//! than two reds.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::context::BrowsingContext;
use crate::registry::{
    DetectionTestEntry, Extractor, RawData, ValidatorFault, Validator, Verdict,
};

pub const SANNYSOFT_URL: &str = "https://bot.sannysoft.com/";

pub const SANNYSOFT_EXTRACT_SCRIPT: &str = r#"(() => {
    const results = {};
    document.querySelectorAll('tr').forEach(row => {
        const cells = row.querySelectorAll('td');
        if (cells.length >= 2) {
            const label = cells[0].innerText.trim();
            const value = cells[1].innerText.trim();
            const style = cells[1].style.backgroundColor;
            let status = 'unknown';
            if (style.includes('rgb(255, 0, 0)') || style.includes('red')) {
                status = 'failed';
            } else if (style.includes('rgb(0, 128, 0)') || style.includes('green')) {
                status = 'passed';
            } else if (style.includes('rgb(255, 255, 0)') || style.includes('yellow')) {
                status = 'warning';
            }
            results[label] = { value: value, status: status };
        }
    });
    return results;
})()"#;

pub struct SannysoftExtractor;

#[async_trait]
impl Extractor for SannysoftExtractor {
    async fn extract(&self, ctx: &dyn BrowsingContext) -> Result<RawData> {
        ctx.evaluate(SANNYSOFT_EXTRACT_SCRIPT).await
    }
}

pub struct SannysoftValidator;

impl Validator for SannysoftValidator {
    fn validate(&self, data: &RawData) -> Result<Verdict, ValidatorFault> {
        if let Some(error) = data.get("error").and_then(Value::as_str) {
            return Ok(Verdict::fail(vec![format!("extraction error: {error}")]));
        }
        let checks = data.as_object().ok_or_else(|| {
            ValidatorFault("sannysoft payload is not a JSON object".to_string())
        })?;

        let mut total = 0u32;
        let mut passed = 0u32;
        let mut failed = 0u32;
        let mut reasons = Vec::new();

        for (label, result) in checks {
            let Some(status) = result.get("status").and_then(Value::as_str) else {
                continue;
            };
            total += 1;
            match status {
                "passed" => passed += 1,
                "failed" => {
                    failed += 1;
                    let value = result.get("value").and_then(Value::as_str).unwrap_or("");
                    reasons.push(format!("check failed: {label} = {value}"));
                }
                _ => {}
            }
        }

        if total == 0 {
            return Ok(Verdict::fail(vec![
                "no detection checks found on page".to_string(),
            ]));
        }

        let pass_rate = f64::from(passed) / f64::from(total) * 100.0;
        if pass_rate >= 70.0 && failed <= 2 {
            Ok(Verdict::pass_with(reasons))
        } else {
            reasons.push(format!(
                "pass rate {pass_rate:.1}% with {failed} hard failures"
            ));
            Ok(Verdict::fail(reasons))
        }
    }
}

pub fn sannysoft_target() -> DetectionTestEntry {
    DetectionTestEntry::new(
        "sannysoft",
        SANNYSOFT_URL,
        Arc::new(SannysoftExtractor),
        Arc::new(SannysoftValidator),
    )
    .with_description("Sannysoft browser fingerprint checks")
    .with_wait_for_selector("table")
    .with_timeout(Duration::from_secs(20))
}
