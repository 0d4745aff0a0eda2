use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A cloud provider whose GPU pricing we ingest.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub slug: String,
}
