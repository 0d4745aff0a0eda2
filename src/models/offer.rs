use serde::{Deserialize, Serialize};

use super::PriceConvention;

/// An unvalidated GPU/price record as extracted from a provider page or
/// API payload. Produced by one extractor invocation and owned by that
/// invocation until the matching engine consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawOffer {
    pub source_name: String,
    pub provider_slug: String,
    pub raw_gpu_label: String,
    /// Either an aggregate instance price or a per-GPU price, depending
    /// on `price_convention`.
    pub price: f64,
    pub price_convention: PriceConvention,
    pub gpu_count: u32,
    pub vram_gb: Option<u32>,
    pub instance_label: Option<String>,
}

impl RawOffer {
    pub fn new(
        source_name: impl Into<String>,
        provider_slug: impl Into<String>,
        raw_gpu_label: impl Into<String>,
        price: f64,
        price_convention: PriceConvention,
        gpu_count: u32,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            provider_slug: provider_slug.into(),
            raw_gpu_label: raw_gpu_label.into(),
            price,
            price_convention,
            gpu_count,
            vram_gb: None,
            instance_label: None,
        }
    }

    pub fn with_vram(mut self, vram_gb: u32) -> Self {
        self.vram_gb = Some(vram_gb);
        self
    }

    pub fn with_instance_label(mut self, label: impl Into<String>) -> Self {
        self.instance_label = Some(label.into());
        self
    }
}
