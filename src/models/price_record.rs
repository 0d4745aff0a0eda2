use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A validated price observation ready for insertion into the ledger.
/// `created_at` is assigned by the store at insert time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPriceRecord {
    pub provider_id: String,
    pub gpu_model_id: String,
    pub price_per_hour: f64,
    pub gpu_count: u32,
    pub source_name: String,
    pub source_url: String,
}

/// A persisted ledger row. The ledger is append-only; rows for the same
/// (provider, model) pair form a time series.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PriceRecord {
    pub id: String,
    pub provider_id: String,
    pub gpu_model_id: String,
    pub price_per_hour: f64,
    pub gpu_count: i64,
    pub source_name: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}
