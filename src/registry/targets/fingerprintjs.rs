//! FingerprintJS open-source probe page.
//!
//! The page computes a visitor identifier locally and publishes it with a
//! status line and the full component result. A usable fingerprint with a
//! completed status means the identity survived component collection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::context::BrowsingContext;
use crate::registry::{
    DetectionTestEntry, Extractor, RawData, ValidatorFault, Validator, Verdict,
};

pub const FINGERPRINTJS_URL: &str = "https://fingerprintjs.github.io/fingerprintjs/";

pub const FINGERPRINTJS_EXTRACT_SCRIPT: &str = r#"(() => {
    const result = {};
    const visitorIdEl = document.getElementById('visitor-id');
    if (visitorIdEl) {
        result.visitorId = visitorIdEl.textContent.trim();
    }
    const statusEl = document.getElementById('status');
    if (statusEl) {
        result.status = statusEl.textContent.trim();
    }
    const fullResultEl = document.getElementById('full-result');
    if (fullResultEl) {
        try {
            result.fullResult = JSON.parse(fullResultEl.textContent);
        } catch (e) {
            result.fullResultError = 'failed to parse full result JSON';
        }
    }
    return result;
})()"#;

pub struct FingerprintJsExtractor;

#[async_trait]
impl Extractor for FingerprintJsExtractor {
    async fn extract(&self, ctx: &dyn BrowsingContext) -> Result<RawData> {
        ctx.evaluate(FINGERPRINTJS_EXTRACT_SCRIPT).await
    }
}

pub struct FingerprintJsValidator;

impl Validator for FingerprintJsValidator {
    fn validate(&self, data: &RawData) -> Result<Verdict, ValidatorFault> {
        if let Some(error) = data.get("error").and_then(Value::as_str) {
            return Ok(Verdict::fail(vec![format!("extraction error: {error}")]));
        }

        let visitor_id = data.get("visitorId").and_then(Value::as_str).unwrap_or("");
        if visitor_id.is_empty() {
            return Ok(Verdict::fail(vec!["no visitor id computed".to_string()]));
        }

        let status = data.get("status").and_then(Value::as_str).unwrap_or("");
        if status.contains("Error") {
            return Ok(Verdict::fail(vec![format!(
                "fingerprint status reported an error: {status}"
            )]));
        }
        if !status.contains("Complete") {
            return Ok(Verdict::fail(vec![format!(
                "fingerprint collection incomplete: {status}"
            )]));
        }

        // Empty component values weaken the identity without failing it.
        let mut reasons = Vec::new();
        if let Some(components) = data
            .get("fullResult")
            .and_then(|r| r.get("components"))
            .and_then(Value::as_object)
        {
            for key in ["timezone", "language", "platform", "screenResolution"] {
                let value = components.get(key).and_then(|c| c.get("value"));
                if value.map_or(true, Value::is_null) {
                    reasons.push(format!("component {key} has no value"));
                }
            }
        }
        Ok(Verdict::pass_with(reasons))
    }
}

pub fn fingerprintjs_target() -> DetectionTestEntry {
    DetectionTestEntry::new(
        "fingerprintjs",
        FINGERPRINTJS_URL,
        Arc::new(FingerprintJsExtractor),
        Arc::new(FingerprintJsValidator),
    )
    .with_description("FingerprintJS visitor identification probe")
    .with_wait_for_selector("#visitor-id")
    .with_expected_keys(vec!["visitorId".to_string(), "status".to_string()])
    .with_timeout(Duration::from_secs(20))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_fingerprint_passes() {
        let data = json!({
            "visitorId": "a1b2c3d4e5f6",
            "status": "Complete",
            "fullResult": {
                "components": {
                    "timezone": { "value": "America/Chicago" },
                    "language": { "value": "en-US" },
                    "platform": { "value": "Win32" },
                    "screenResolution": { "value": [1920, 1080] }
                }
            }
        });
        let verdict = FingerprintJsValidator.validate(&data).unwrap();
        assert!(verdict.passed);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn missing_visitor_id_fails() {
        let verdict = FingerprintJsValidator
            .validate(&json!({ "status": "Complete" }))
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.reasons, vec!["no visitor id computed"]);
    }

    #[test]
    fn error_status_fails() {
        let verdict = FingerprintJsValidator
            .validate(&json!({ "visitorId": "abc", "status": "Error: blocked" }))
            .unwrap();
        assert!(!verdict.passed);
    }

    #[test]
    fn hollow_components_pass_with_reasons() {
        let data = json!({
            "visitorId": "abc",
            "status": "Complete",
            "fullResult": { "components": { "timezone": {} } }
        });
        let verdict = FingerprintJsValidator.validate(&data).unwrap();
        assert!(verdict.passed);
        assert!(verdict.reasons.iter().any(|r| r.contains("timezone")));
    }
}
