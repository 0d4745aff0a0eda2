use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MatchResult, RawOffer};

/// Structured outcome of one provider ingestion job. Created by the
/// orchestrator, consumed by the HTTP boundary and by alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub provider_slug: String,
    pub matched: Vec<MatchResult>,
    pub unmatched: Vec<RawOffer>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn started(provider_slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            provider_slug: provider_slug.into(),
            matched: Vec::new(),
            unmatched: Vec::new(),
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }

    /// A run is fatal when it produced no results at all and recorded at
    /// least one error. Partial-success runs are not fatal.
    pub fn is_fatal(&self) -> bool {
        self.matched.is_empty() && self.unmatched.is_empty() && !self.errors.is_empty()
    }
}
