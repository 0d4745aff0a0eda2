//! Per-provider source extractors.
//!
//! Each extractor turns a fetched payload (rendered HTML or an API JSON
//! body) into raw offers. The trait keeps the matching/pricing core
//! decoupled from markup specifics: provider quirks live here as data
//! (source name, URL, price convention), not as schema differences.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::models::{PriceConvention, RawOffer};
use crate::Result;

pub mod lambda;
pub mod runpod;

pub use lambda::LambdaExtractor;
pub use runpod::RunpodExtractor;

pub trait Extractor: Send + Sync {
    fn provider_slug(&self) -> &str;
    fn source_name(&self) -> &str;
    /// Page or API endpoint the payload is fetched from.
    fn source_url(&self) -> &str;
    /// Which pricing convention this source reports in. The ledger
    /// writer never guesses.
    fn price_convention(&self) -> PriceConvention;
    /// Whether the source needs a rendered page (browser session) or a
    /// plain HTTP fetch.
    fn needs_browser(&self) -> bool {
        true
    }
    /// Selector to await before capturing a rendered page.
    fn wait_selector(&self) -> Option<&str> {
        None
    }
    /// Name of an API credential this source hard-requires, looked up in
    /// `api_keys`. Absence is a fatal configuration error for this job.
    fn required_credential(&self) -> Option<&str> {
        None
    }
    fn extract(&self, payload: &str) -> Result<Vec<RawOffer>>;
}

/// The pluggable strategy set: every registered provider extractor.
pub fn registry() -> Vec<Arc<dyn Extractor>> {
    vec![
        Arc::new(RunpodExtractor::default()),
        Arc::new(LambdaExtractor::default()),
    ]
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\$£€]?\s*(\d{1,3}(?:,\d{3})*(?:\.\d+)?|\d+(?:\.\d+)?)").unwrap()
    })
}

/// Parse the first money amount out of a scraped string like
/// "$23.92 / hr". Returns `None` when no amount is present.
pub fn parse_money(text: &str) -> Option<f64> {
    let caps = money_re().captures(text)?;
    let amount = caps.get(1)?.as_str().replace(',', "");
    Decimal::from_str(&amount).ok()?.to_f64()
}
