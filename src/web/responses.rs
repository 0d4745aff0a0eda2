use serde::{Deserialize, Serialize};

use crate::models::{MatchResult, RawOffer};
use crate::orchestrator::JobOutcome;

/// JSON body of a single-provider ingestion trigger.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub matched: usize,
    pub unmatched: usize,
    #[serde(rename = "matchResults")]
    pub match_results: Vec<MatchResult>,
    #[serde(rename = "unmatchedGPUs")]
    pub unmatched_gpus: Vec<RawOffer>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestResponse {
    pub fn from_report(report: crate::models::RunReport) -> Self {
        Self {
            success: !report.is_fatal(),
            matched: report.matched_count(),
            unmatched: report.unmatched_count(),
            match_results: report.matched,
            unmatched_gpus: report.unmatched,
            errors: report.errors,
            error: None,
        }
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            success: false,
            matched: 0,
            unmatched: 0,
            match_results: Vec::new(),
            unmatched_gpus: Vec::new(),
            errors: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// JSON body of the fan-out trigger.
#[derive(Debug, Serialize, Deserialize)]
pub struct FanoutResponse {
    pub message: String,
    pub results: Vec<JobOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunReport;

    #[test]
    fn test_fatal_report_maps_to_failure_body() {
        let mut report = RunReport::started("lambda");
        report.record_error("session acquisition failed");
        let body = IngestResponse::from_report(report.finish());
        assert!(!body.success);
        assert_eq!(body.errors.len(), 1);
    }

    #[test]
    fn test_response_uses_camel_case_keys() {
        let body = IngestResponse::fatal("boom");
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("matchResults").is_some());
        assert!(json.get("unmatchedGPUs").is_some());
        assert_eq!(json["error"], "boom");
    }
}
