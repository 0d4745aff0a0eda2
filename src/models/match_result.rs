use serde::{Deserialize, Serialize};

use super::{CanonicalGpuModel, RawOffer};

/// How a raw label was resolved to a catalog entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Containment,
    Fuzzy,
    Unmatched,
}

/// Outcome of matching one raw offer against the catalog. Exactly one
/// per RawOffer; `matched_model = None` is a normal terminal state, not
/// an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub raw_offer: RawOffer,
    pub matched_model: Option<CanonicalGpuModel>,
    pub method: MatchMethod,
    pub confidence: f32,
}

impl MatchResult {
    pub fn unmatched(raw_offer: RawOffer) -> Self {
        Self {
            raw_offer,
            matched_model: None,
            method: MatchMethod::Unmatched,
            confidence: 0.0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched_model.is_some()
    }
}
