//! Lambda: JavaScript-rendered pricing table, aggregate instance prices.

use scraper::{Html, Selector};

use crate::models::{PriceConvention, RawOffer};
use crate::utils::error::AppError;
use crate::Result;

use super::{parse_money, Extractor};

const SOURCE_NAME: &str = "lambda-pricing-page";
const SOURCE_URL: &str = "https://lambdalabs.com/service/gpu-cloud";

#[derive(Debug, Default)]
pub struct LambdaExtractor;

impl Extractor for LambdaExtractor {
    fn provider_slug(&self) -> &str {
        "lambda"
    }

    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn source_url(&self) -> &str {
        SOURCE_URL
    }

    fn price_convention(&self) -> PriceConvention {
        PriceConvention::Aggregate
    }

    fn wait_selector(&self) -> Option<&str> {
        Some("table.pricing tbody tr")
    }

    fn extract(&self, payload: &str) -> Result<Vec<RawOffer>> {
        let document = Html::parse_document(payload);
        let row_selector = Selector::parse("table.pricing tbody tr")
            .map_err(|e| AppError::Extraction(format!("invalid row selector: {}", e)))?;
        let cell_selector = Selector::parse("td")
            .map_err(|e| AppError::Extraction(format!("invalid cell selector: {}", e)))?;

        let mut offers = Vec::new();
        for row in document.select(&row_selector) {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|c| c.text().collect::<Vec<_>>().join(" ").trim().to_string())
                .collect();
            // instance | GPU model | GPU count | price
            if cells.len() < 4 {
                continue;
            }

            let gpu_count: u32 = cells[2].trim().parse().unwrap_or(1);
            let price = match parse_money(&cells[3]) {
                Some(p) => p,
                None => continue, // "contact us" rows
            };

            offers.push(
                RawOffer::new(
                    SOURCE_NAME,
                    self.provider_slug(),
                    &cells[1],
                    price,
                    PriceConvention::Aggregate,
                    gpu_count,
                )
                .with_instance_label(&cells[0]),
            );
        }

        if offers.is_empty() {
            return Err(AppError::Extraction(
                "no pricing rows found in Lambda table".to_string(),
            ));
        }
        Ok(offers)
    }
}
