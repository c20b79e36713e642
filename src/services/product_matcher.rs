//! Matching of scanned product codes against the items of one order.
//!
//! Exact matches always win. Normalized and fuzzy tiers only produce ranked
//! candidates, and anything under the auto-accept threshold has to be
//! confirmed by the operator.

use std::cmp::Ordering;

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::models::order::OrderItem;
use crate::models::scan::{MatchCandidate, MatchKind, MatchOutcome, MatchReport};

pub const MAX_CANDIDATES: usize = 5;
/// Candidates closer than this to the best one are treated as a tie.
pub const TIE_MARGIN: f64 = 0.02;
pub const SIMILARITY_FLOOR: f64 = 0.75;
pub const MIN_FUZZY_LEN: usize = 6;

const SEPARATORS: [char; 4] = ['-', '_', '.', '/'];

/// Trim, drop a scanner symbology identifier (`]C1`, `]E0`, ...), uppercase and
/// remove whitespace and separators.
pub fn normalize_code(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_symbology = strip_symbology(trimmed);
    without_symbology
        .chars()
        .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
        .flat_map(|c| c.to_uppercase())
        .collect()
}

fn strip_symbology(code: &str) -> &str {
    let bytes = code.as_bytes();
    if bytes.len() > 3
        && bytes[0] == b']'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2].is_ascii_digit()
    {
        &code[3..]
    } else {
        code
    }
}

/// Digit-only code with a GTIN length (EAN-8, UPC-A, EAN-13, GTIN-14).
pub fn is_gtin(code: &str) -> bool {
    matches!(code.len(), 8 | 12 | 13 | 14) && code.bytes().all(|b| b.is_ascii_digit())
}

/// Mod-10 check digit over the GTIN family.
pub fn gtin_check_digit_valid(code: &str) -> bool {
    if !is_gtin(code) {
        return false;
    }
    let digits: Vec<u32> = code.bytes().map(|b| (b - b'0') as u32).collect();
    let (body, check) = digits.split_at(digits.len() - 1);
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    (10 - sum % 10) % 10 == check[0]
}

/// Zero-padded 14-digit form, so UPC-A, EAN-13 and GTIN-14 compare equal.
pub fn gtin14(code: &str) -> Option<String> {
    is_gtin(code).then(|| format!("{:0>14}", code))
}

/// Forms of a scanned code worth looking up with exact equality:
/// the normalized code and, for GTINs, its 14/13/12-digit renderings.
pub fn code_variants(raw: &str) -> Vec<String> {
    let normalized = normalize_code(raw);
    if normalized.is_empty() {
        return Vec::new();
    }
    let mut variants = vec![normalized.clone()];
    if let Some(padded) = gtin14(&normalized) {
        for len in [14usize, 13, 12, 8] {
            let start = padded.len() - len;
            if padded[..start].bytes().all(|b| b == b'0') {
                variants.push(padded[start..].to_string());
            }
        }
    }
    variants.sort();
    variants.dedup();
    variants
}

/// Matcher tiers in priority order; the first tier with a hit wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    ExactEan,
    ExactSku,
    Normalized,
    Containment,
    Similarity,
}

impl Tier {
    fn kind(self) -> MatchKind {
        match self {
            Tier::ExactEan => MatchKind::ExactEan,
            Tier::ExactSku => MatchKind::ExactSku,
            Tier::Normalized => MatchKind::Normalized,
            Tier::Containment => MatchKind::Containment,
            Tier::Similarity => MatchKind::Similarity,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TierHit {
    tier: Tier,
    confidence: f64,
}

#[derive(Debug, Clone)]
pub struct ProductMatcher {
    auto_accept_confidence: f64,
}

impl ProductMatcher {
    pub fn new(auto_accept_confidence: f64) -> Self {
        Self {
            auto_accept_confidence: auto_accept_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn match_code(&self, scanned: &str, items: &[OrderItem]) -> MatchReport {
        let normalized = normalize_code(scanned);
        let mut warnings = Vec::new();

        if normalized.is_empty() {
            warnings.push("Scanned code is empty".to_string());
            return MatchReport {
                normalized_code: normalized,
                outcome: MatchOutcome::NoMatch,
                warnings,
            };
        }
        if is_gtin(&normalized) && !gtin_check_digit_valid(&normalized) {
            warnings.push(format!(
                "{} looks like a GTIN but its check digit is invalid",
                normalized
            ));
        }

        let hits: Vec<(&OrderItem, TierHit)> = items
            .iter()
            .filter_map(|item| best_hit(scanned, &normalized, item).map(|hit| (item, hit)))
            .collect();

        let Some(best_tier) = hits.iter().map(|(_, hit)| hit.tier).min() else {
            return MatchReport {
                normalized_code: normalized,
                outcome: MatchOutcome::NoMatch,
                warnings,
            };
        };

        let mut candidates: Vec<(MatchCandidate, f64)> = hits
            .into_iter()
            .filter(|(_, hit)| hit.tier == best_tier)
            .map(|(item, hit)| {
                let name_score = jaro_winkler(
                    &normalized,
                    &normalize_code(&item.product_name),
                );
                (
                    MatchCandidate {
                        item_id: item.id,
                        sku: item.sku.clone(),
                        ean: item.ean.clone(),
                        product_name: item.product_name.clone(),
                        kind: hit.tier.kind(),
                        confidence: round_confidence(hit.confidence),
                        fully_scanned: item.is_fully_scanned(),
                    },
                    name_score,
                )
            })
            .collect();

        candidates.sort_by(|(a, a_name), (b, b_name)| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b_name.partial_cmp(a_name).unwrap_or(Ordering::Equal))
        });
        let mut candidates: Vec<MatchCandidate> =
            candidates.into_iter().map(|(c, _)| c).collect();
        candidates.truncate(MAX_CANDIDATES);

        let outcome = self.decide(candidates);
        MatchReport {
            normalized_code: normalized,
            outcome,
            warnings,
        }
    }

    fn decide(&self, candidates: Vec<MatchCandidate>) -> MatchOutcome {
        let Some(best) = candidates.first() else {
            return MatchOutcome::NoMatch;
        };

        if best.confidence < self.auto_accept_confidence {
            return MatchOutcome::Suggested { candidates };
        }

        let tied: Vec<&MatchCandidate> = candidates
            .iter()
            .filter(|c| best.confidence - c.confidence <= TIE_MARGIN)
            .collect();

        if tied.len() == 1 {
            return matched(tied[0]);
        }

        // Same code on several lines: take the one that still needs units.
        let open: Vec<&&MatchCandidate> = tied.iter().filter(|c| !c.fully_scanned).collect();
        if open.len() == 1 {
            return matched(open[0]);
        }

        MatchOutcome::Ambiguous { candidates }
    }
}

fn matched(candidate: &MatchCandidate) -> MatchOutcome {
    MatchOutcome::Matched {
        item_id: candidate.item_id,
        kind: candidate.kind,
        confidence: candidate.confidence,
    }
}

fn round_confidence(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn item_codes(item: &OrderItem) -> impl Iterator<Item = &str> {
    item.ean
        .as_deref()
        .into_iter()
        .chain(item.sku.as_deref())
        .chain(item.alternate_codes.iter().map(String::as_str))
        .filter(|c| !c.trim().is_empty())
}

/// Strongest tier at which `item` matches the scanned code.
fn best_hit(raw: &str, normalized: &str, item: &OrderItem) -> Option<TierHit> {
    let raw = strip_symbology(raw.trim());

    if item.ean.as_deref().map(str::trim) == Some(raw) {
        return Some(TierHit { tier: Tier::ExactEan, confidence: 1.0 });
    }

    let sku_hit = item
        .sku
        .iter()
        .chain(item.alternate_codes.iter())
        .any(|code| code.trim().eq_ignore_ascii_case(raw));
    if sku_hit {
        return Some(TierHit { tier: Tier::ExactSku, confidence: 1.0 });
    }

    let scanned_gtin = gtin14(normalized);
    let normalized_codes: Vec<String> = item_codes(item).map(normalize_code).collect();

    let equivalent = normalized_codes.iter().any(|code| {
        code == normalized
            || matches!((&scanned_gtin, gtin14(code)), (Some(a), Some(b)) if *a == b)
    });
    if equivalent {
        return Some(TierHit { tier: Tier::Normalized, confidence: 0.95 });
    }

    let containment = normalized_codes
        .iter()
        .filter_map(|code| containment_score(normalized, code))
        .fold(None, max_score);
    if let Some(confidence) = containment {
        return Some(TierHit { tier: Tier::Containment, confidence });
    }

    normalized_codes
        .iter()
        .filter_map(|code| similarity_score(normalized, code))
        .fold(None, max_score)
        .map(|confidence| TierHit { tier: Tier::Similarity, confidence })
}

fn max_score(acc: Option<f64>, score: f64) -> Option<f64> {
    Some(acc.map_or(score, |best| best.max(score)))
}

fn containment_score(a: &str, b: &str) -> Option<f64> {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.len() < MIN_FUZZY_LEN || short.len() == long.len() || !long.contains(short) {
        return None;
    }
    Some(0.60 + 0.30 * short.len() as f64 / long.len() as f64)
}

fn similarity_score(a: &str, b: &str) -> Option<f64> {
    if a.len() < MIN_FUZZY_LEN || b.len() < MIN_FUZZY_LEN {
        return None;
    }
    let similarity = normalized_levenshtein(a, b);
    (similarity >= SIMILARITY_FLOOR).then_some(0.8 * similarity)
}
