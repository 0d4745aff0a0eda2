use serde::{Deserialize, Serialize};

pub mod gpu_model;
pub mod match_result;
pub mod offer;
pub mod price_record;
pub mod provider;
pub mod run_report;

// Re-exports for convenience
pub use gpu_model::*;
pub use match_result::*;
pub use offer::*;
pub use price_record::*;
pub use provider::*;
pub use run_report::*;

/// Generate a new unique ID for database records
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Pricing convention a source reports its numbers in. Declared per
/// extractor; the ledger writer never guesses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceConvention {
    /// The source already quotes an hourly price per single GPU.
    PerGpu,
    /// The source quotes an aggregate hourly price for the whole instance;
    /// divide by the GPU count.
    Aggregate,
}
