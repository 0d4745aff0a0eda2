//! Price computation and the append-only ledger writer.
//!
//! The ledger is a time series of price observations; nothing here ever
//! updates or deletes a row. Inserts are fire-and-forget per record: one
//! failing insert is reported and the rest of the batch continues.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;

use crate::models::{generate_id, NewPriceRecord, PriceConvention};
use crate::utils::error::AppError;
use crate::Result;

/// Trend windows are clamped to this range regardless of what a caller
/// requests.
pub const TREND_DAYS_MIN: u32 = 1;
pub const TREND_DAYS_MAX: u32 = 90;

/// Derive the hourly price of a single GPU from what the source quoted.
/// Aggregate quotes divide by the GPU count; per-GPU quotes pass through.
/// Non-finite, zero, or negative results are extraction defects and
/// yield `None` so they never reach the ledger.
pub fn compute_per_gpu_price(
    price: f64,
    convention: PriceConvention,
    gpu_count: u32,
) -> Option<f64> {
    let per_gpu = match convention {
        PriceConvention::PerGpu => price,
        PriceConvention::Aggregate => price / f64::from(gpu_count.max(1)),
    };
    if per_gpu.is_finite() && per_gpu > 0.0 {
        Some(per_gpu)
    } else {
        None
    }
}

/// Append a single validated record to the ledger. `created_at` is set
/// here, at insert time.
pub async fn append(pool: &SqlitePool, record: &NewPriceRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO price_records
            (id, provider_id, gpu_model_id, price_per_hour, gpu_count,
             source_name, source_url, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(generate_id())
    .bind(&record.provider_id)
    .bind(&record.gpu_model_id)
    .bind(record.price_per_hour)
    .bind(record.gpu_count as i64)
    .bind(&record.source_name)
    .bind(&record.source_url)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Append a batch, one insert attempt per record. Failures are collected
/// as persistence errors; they never abort the remaining inserts.
pub async fn append_all(pool: &SqlitePool, records: &[NewPriceRecord]) -> (usize, Vec<AppError>) {
    let mut inserted = 0;
    let mut errors = Vec::new();
    for record in records {
        match append(pool, record).await {
            Ok(()) => inserted += 1,
            Err(e) => {
                warn!(
                    gpu_model_id = %record.gpu_model_id,
                    error = %e,
                    "price record insert failed"
                );
                errors.push(AppError::Persistence(format!(
                    "insert failed for gpu_model {}: {}",
                    record.gpu_model_id, e
                )));
            }
        }
    }
    (inserted, errors)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrendPoint {
    pub day: String,
    pub avg_price: f64,
    pub samples: i64,
}

pub fn clamp_trend_days(days: u32) -> u32 {
    days.clamp(TREND_DAYS_MIN, TREND_DAYS_MAX)
}

/// Daily average price over the last `days` days, optionally filtered by
/// provider and/or GPU model. The window is clamped to [1, 90].
pub async fn price_trend(
    pool: &SqlitePool,
    provider_id: Option<&str>,
    gpu_model_id: Option<&str>,
    days: u32,
) -> Result<Vec<TrendPoint>> {
    let days = clamp_trend_days(days);

    let mut sql = String::from(
        "SELECT date(created_at) AS day,
                avg(price_per_hour) AS avg_price,
                count(*) AS samples
         FROM price_records
         WHERE date(created_at) >= date('now', '-' || ? || ' days')",
    );
    if provider_id.is_some() {
        sql.push_str(" AND provider_id = ?");
    }
    if gpu_model_id.is_some() {
        sql.push_str(" AND gpu_model_id = ?");
    }
    sql.push_str(" GROUP BY day ORDER BY day");

    let mut query = sqlx::query_as::<_, TrendPoint>(&sql).bind(days as i64);
    if let Some(provider_id) = provider_id {
        query = query.bind(provider_id);
    }
    if let Some(gpu_model_id) = gpu_model_id {
        query = query.bind(gpu_model_id);
    }

    Ok(query.fetch_all(pool).await?)
}
