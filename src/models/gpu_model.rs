use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A canonical GPU model from the catalog table. Immutable during a
/// pipeline run; each job loads its own fresh snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalGpuModel {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub vram_gb: u32,
    pub aliases: Vec<String>,
}

/// Raw catalog row; `aliases` is a JSON array stored in a TEXT column.
#[derive(Debug, Clone, FromRow)]
pub struct GpuModelRow {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub vram_gb: i64,
    pub aliases: String,
}

impl GpuModelRow {
    pub fn into_model(self) -> Result<CanonicalGpuModel, serde_json::Error> {
        let aliases: Vec<String> = if self.aliases.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.aliases)?
        };
        Ok(CanonicalGpuModel {
            id: self.id,
            name: self.name,
            manufacturer: self.manufacturer,
            vram_gb: self.vram_gb.max(0) as u32,
            aliases,
        })
    }
}
