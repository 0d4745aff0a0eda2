//! GPU name normalization and catalog matching.
//!
//! The whole module is pure: identical inputs always produce identical
//! output, so every tier is directly unit-testable. Unmatched is a
//! normal outcome, never an error.
//!
//! Matching tiers, first satisfied wins:
//!   1. exact    — normalized label equals a canonical name or alias
//!   2. contains — whole-token containment in either direction
//!   3. fuzzy    — Jaro-Winkler above `FUZZY_THRESHOLD`
//!
//! Fuzzy ties within `FUZZY_TIE_EPSILON` are resolved by a VRAM hint
//! when one is available; otherwise the label is rejected as ambiguous
//! rather than guessed.

use std::sync::OnceLock;

use regex::Regex;
use strsim::jaro_winkler;

use crate::models::{CanonicalGpuModel, MatchMethod, MatchResult, RawOffer};

/// Acceptance threshold for the fuzzy tier. Tunable, test-driven.
pub const FUZZY_THRESHOLD: f64 = 0.88;
/// Two fuzzy candidates closer than this are considered tied.
pub const FUZZY_TIE_EPSILON: f64 = 0.015;

/// Vendor/packaging tokens that carry no model identity: interconnect
/// and bus qualifiers, memory marketing, generic filler.
const NOISE_TOKENS: &[&str] = &[
    "NVIDIA",
    "AMD",
    "INTEL",
    "GPU",
    "GPUS",
    "GRAPHICS",
    "CLOUD",
    "INSTANCE",
    "SERVER",
    "DEDICATED",
    "TENSOR",
    "CORE",
    "ACCELERATOR",
    "SXM",
    "SXM2",
    "SXM3",
    "SXM4",
    "SXM5",
    "PCIE",
    "PCI",
    "E",
    "NVLINK",
    "NVL",
    "OAM",
    "HBM2",
    "HBM2E",
    "HBM3",
    "VRAM",
];

/// A raw label after normalization: the surviving model tokens plus any
/// multiplier and VRAM hint that were peeled off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLabel {
    pub tokens: Vec<String>,
    pub multiplier: Option<u32>,
    pub vram_hint: Option<u32>,
}

impl NormalizedLabel {
    pub fn joined(&self) -> String {
        self.tokens.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn vram_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,4})GB$").unwrap())
}

fn multiplier_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,3})X$").unwrap())
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// Normalize a raw vendor label. Uppercases, collapses punctuation and
/// whitespace, strips noise tokens, and peels a multiplier ("2x", "(4)",
/// "4 x") and a VRAM hint ("80GB", "24 GB") out of the token stream.
///
/// Idempotent over the normalized text: `normalize(n.joined())` yields
/// the same tokens as `n`.
pub fn normalize(label: &str) -> NormalizedLabel {
    let upper = label.to_uppercase();
    // Punctuation separates tokens; "PCI-E" and "H100-80GB" both split.
    let cleaned: String = upper
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    let raw_tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let mut tokens: Vec<String> = Vec::with_capacity(raw_tokens.len());
    let mut multiplier: Option<u32> = None;
    let mut vram_hint: Option<u32> = None;

    let mut i = 0;
    while i < raw_tokens.len() {
        let token = raw_tokens[i];

        // "80GB" in one token
        if let Some(caps) = vram_token_re().captures(token) {
            if vram_hint.is_none() {
                vram_hint = caps[1].parse().ok();
            }
            i += 1;
            continue;
        }

        // "80 GB" split across two tokens
        if token == "GB" {
            if let Some(last) = tokens.last() {
                if is_numeric(last) {
                    if vram_hint.is_none() {
                        vram_hint = last.parse().ok();
                    }
                    tokens.pop();
                }
            }
            i += 1;
            continue;
        }

        // "2X" as one token
        if let Some(caps) = multiplier_token_re().captures(token) {
            if multiplier.is_none() {
                multiplier = caps[1].parse().ok();
            }
            i += 1;
            continue;
        }

        // "2 X" split across two tokens
        if token == "X" {
            if let Some(last) = tokens.last() {
                if is_numeric(last) {
                    if multiplier.is_none() {
                        multiplier = last.parse().ok();
                    }
                    tokens.pop();
                }
            }
            i += 1;
            continue;
        }

        if NOISE_TOKENS.contains(&token) {
            i += 1;
            continue;
        }

        tokens.push(token.to_string());
        i += 1;
    }

    // A leading small bare number is a count, not a model token:
    // "(4) H100" tokenizes to ["4", "H100"].
    if tokens.len() > 1 && is_numeric(&tokens[0]) {
        if let Ok(n) = tokens[0].parse::<u32>() {
            if n <= 16 {
                if multiplier.is_none() {
                    multiplier = Some(n);
                }
                tokens.remove(0);
            }
        }
    }

    NormalizedLabel {
        tokens,
        multiplier,
        vram_hint,
    }
}

/// The normalized text form of a label. `normalize_text` is idempotent:
/// applying it twice equals applying it once.
pub fn normalize_text(label: &str) -> String {
    normalize(label).joined()
}

struct Candidate<'a> {
    model: &'a CanonicalGpuModel,
    /// Normalized canonical name plus normalized aliases.
    keys: Vec<Vec<String>>,
}

fn candidates(catalog: &[CanonicalGpuModel]) -> Vec<Candidate<'_>> {
    catalog
        .iter()
        .map(|model| {
            let mut keys = vec![normalize(&model.name).tokens];
            for alias in &model.aliases {
                let tokens = normalize(alias).tokens;
                if !tokens.is_empty() {
                    keys.push(tokens);
                }
            }
            keys.retain(|k| !k.is_empty());
            Candidate { model, keys }
        })
        .collect()
}

/// Whole-token contiguous containment: does `haystack` contain `needle`
/// as a subsequence of adjacent tokens?
fn contains_token_seq(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Resolve a set of tied models through a VRAM hint. Returns the single
/// model whose declared VRAM matches the hint, if exactly one does.
fn resolve_by_vram<'a>(
    tied: &[&'a CanonicalGpuModel],
    vram_hint: Option<u32>,
) -> Option<&'a CanonicalGpuModel> {
    let hint = vram_hint?;
    let mut matching = tied.iter().filter(|m| m.vram_gb == hint);
    let first = matching.next()?;
    if matching.next().is_some() {
        return None;
    }
    Some(first)
}

/// Match one raw offer against the catalog. Pure: the result depends
/// only on the offer and the catalog snapshot.
///
/// A multiplier peeled from the label ("2x H100") overrides a
/// placeholder GPU count of zero or one on the offer; an explicit count
/// from the extractor wins otherwise.
pub fn match_offer(offer: &RawOffer, catalog: &[CanonicalGpuModel]) -> MatchResult {
    let normalized = normalize(&offer.raw_gpu_label);

    let mut offer = offer.clone();
    if let Some(multiplier) = normalized.multiplier {
        if offer.gpu_count <= 1 {
            offer.gpu_count = multiplier;
        }
    }
    if offer.vram_gb.is_none() {
        offer.vram_gb = normalized.vram_hint;
    }

    if normalized.is_empty() {
        return MatchResult::unmatched(offer);
    }

    // Prefer the context VRAM over the label hint for tiebreaks.
    let vram_hint = offer.vram_gb;
    let candidates = candidates(catalog);

    // Tier 1: exact
    let exact: Vec<&CanonicalGpuModel> = candidates
        .iter()
        .filter(|c| c.keys.iter().any(|k| *k == normalized.tokens))
        .map(|c| c.model)
        .collect();
    match exact.len() {
        1 => {
            return MatchResult {
                raw_offer: offer,
                matched_model: Some(exact[0].clone()),
                method: MatchMethod::Exact,
                confidence: 1.0,
            }
        }
        n if n > 1 => {
            // Duplicate alias across entries; only a VRAM hint can save it.
            if let Some(model) = resolve_by_vram(&exact, vram_hint) {
                return MatchResult {
                    raw_offer: offer,
                    matched_model: Some(model.clone()),
                    method: MatchMethod::Exact,
                    confidence: 1.0,
                };
            }
            return MatchResult::unmatched(offer);
        }
        _ => {}
    }

    // Tier 2: containment, longest key wins
    let mut containment: Vec<(&CanonicalGpuModel, usize)> = Vec::new();
    for candidate in &candidates {
        for key in &candidate.keys {
            if contains_token_seq(&normalized.tokens, key)
                || contains_token_seq(key, &normalized.tokens)
            {
                containment.push((candidate.model, key.len()));
                break;
            }
        }
    }
    if !containment.is_empty() {
        let longest = containment.iter().map(|(_, len)| *len).max().unwrap_or(0);
        let tied: Vec<&CanonicalGpuModel> = containment
            .iter()
            .filter(|(_, len)| *len == longest)
            .map(|(m, _)| *m)
            .collect();
        let chosen = if tied.len() == 1 {
            Some(tied[0])
        } else {
            resolve_by_vram(&tied, vram_hint)
        };
        if let Some(model) = chosen {
            return MatchResult {
                raw_offer: offer,
                matched_model: Some(model.clone()),
                method: MatchMethod::Containment,
                confidence: 0.9,
            };
        }
        return MatchResult::unmatched(offer);
    }

    // Tier 3: fuzzy
    let label_text = normalized.joined();
    let mut scored: Vec<(&CanonicalGpuModel, f64)> = candidates
        .iter()
        .map(|c| {
            let best = c
                .keys
                .iter()
                .map(|k| jaro_winkler(&label_text, &k.join(" ")))
                .fold(0.0_f64, f64::max);
            (c.model, best)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(&(best_model, best_score)) = scored.first() {
        if best_score >= FUZZY_THRESHOLD {
            let tied: Vec<&CanonicalGpuModel> = scored
                .iter()
                .filter(|(_, s)| best_score - s <= FUZZY_TIE_EPSILON)
                .map(|(m, _)| *m)
                .collect();
            let chosen = if tied.len() == 1 {
                Some(best_model)
            } else {
                resolve_by_vram(&tied, vram_hint)
            };
            if let Some(model) = chosen {
                return MatchResult {
                    raw_offer: offer,
                    matched_model: Some(model.clone()),
                    method: MatchMethod::Fuzzy,
                    confidence: best_score as f32,
                };
            }
        }
    }

    MatchResult::unmatched(offer)
}
