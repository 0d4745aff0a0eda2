//! RunPod: JSON pricing API, per-GPU hourly prices, bearer credential.

use serde::Deserialize;

use crate::models::{PriceConvention, RawOffer};
use crate::utils::error::AppError;
use crate::Result;

use super::Extractor;

const SOURCE_NAME: &str = "runpod-api";
const SOURCE_URL: &str = "https://api.runpod.io/graphql/gpu-types";

#[derive(Debug, Default)]
pub struct RunpodExtractor;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    gpus: Vec<GpuType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GpuType {
    display_name: String,
    memory_in_gb: Option<u32>,
    secure_price: Option<f64>,
    community_price: Option<f64>,
}

impl Extractor for RunpodExtractor {
    fn provider_slug(&self) -> &str {
        "runpod"
    }

    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn source_url(&self) -> &str {
        SOURCE_URL
    }

    fn price_convention(&self) -> PriceConvention {
        PriceConvention::PerGpu
    }

    fn needs_browser(&self) -> bool {
        false
    }

    fn required_credential(&self) -> Option<&str> {
        Some("runpod")
    }

    fn extract(&self, payload: &str) -> Result<Vec<RawOffer>> {
        let response: ApiResponse = serde_json::from_str(payload)
            .map_err(|e| AppError::Extraction(format!("unexpected RunPod API shape: {}", e)))?;

        let mut offers = Vec::new();
        for gpu in response.gpus {
            // Secure cloud price preferred, community as fallback.
            let price = match gpu.secure_price.or(gpu.community_price) {
                Some(p) => p,
                None => continue,
            };
            let mut offer = RawOffer::new(
                SOURCE_NAME,
                self.provider_slug(),
                &gpu.display_name,
                price,
                PriceConvention::PerGpu,
                1,
            );
            if let Some(vram) = gpu.memory_in_gb {
                offer = offer.with_vram(vram);
            }
            offers.push(offer);
        }

        if offers.is_empty() {
            return Err(AppError::Extraction(
                "RunPod API returned no priced GPU types".to_string(),
            ));
        }
        Ok(offers)
    }
}
