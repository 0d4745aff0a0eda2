//! Read-only access to the canonical GPU model catalog and the provider
//! table. Each job loads its own fresh snapshot; nothing here caches
//! across runs since the catalog can change between them.

use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{CanonicalGpuModel, GpuModelRow, Provider};
use crate::Result;

pub async fn load_catalog(pool: &SqlitePool) -> Result<Vec<CanonicalGpuModel>> {
    let rows: Vec<GpuModelRow> = sqlx::query_as(
        "SELECT id, name, manufacturer, vram_gb, aliases FROM gpu_models ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut models = Vec::with_capacity(rows.len());
    for row in rows {
        models.push(row.into_model()?);
    }
    debug!(models = models.len(), "loaded GPU catalog");
    Ok(models)
}

pub async fn provider_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Provider>> {
    let provider: Option<Provider> =
        sqlx::query_as("SELECT id, name, slug FROM providers WHERE slug = ?")
            .bind(slug)
            .fetch_optional(pool)
            .await?;
    Ok(provider)
}

pub async fn list_providers(pool: &SqlitePool) -> Result<Vec<Provider>> {
    let providers: Vec<Provider> =
        sqlx::query_as("SELECT id, name, slug FROM providers ORDER BY slug")
            .fetch_all(pool)
            .await?;
    Ok(providers)
}

#[cfg(test)]
pub async fn seed_gpu_model(
    pool: &SqlitePool,
    name: &str,
    manufacturer: &str,
    vram_gb: u32,
    aliases: &[&str],
) -> String {
    let id = crate::models::generate_id();
    let aliases_json = serde_json::to_string(aliases).unwrap();
    sqlx::query("INSERT INTO gpu_models (id, name, manufacturer, vram_gb, aliases) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(manufacturer)
        .bind(vram_gb as i64)
        .bind(aliases_json)
        .execute(pool)
        .await
        .unwrap();
    id
}

#[cfg(test)]
pub async fn seed_provider(pool: &SqlitePool, name: &str, slug: &str) -> String {
    let id = crate::models::generate_id();
    sqlx::query("INSERT INTO providers (id, name, slug) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(slug)
        .execute(pool)
        .await
        .unwrap();
    id
}
