//! Region name canonicalization and tiered matching
//!
//! Weather and harvest sources identify the same administrative area
//! inconsistently ("Kab. Bandung", "Kabupaten Bandung ", "Bandung"). This
//! service strips known administrative prefixes to form a canonical key
//! and resolves a requested region against candidate rows through an
//! ordered cascade of match tiers.

use crate::constants::REGION_PREFIXES;
use tracing::debug;

/// Which tier of the matching cascade produced a match.
///
/// Tiers are strictly ordered; the first tier that yields at least one
/// candidate wins and later tiers are never consulted. The substring
/// tiers are a documented precision risk for short names contained in
/// unrelated longer names; no administrative-hierarchy disambiguation is
/// applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    /// Raw strings are identical
    Exact,
    /// Canonicalized names are identical
    Normalized,
    /// Canonicalized query is contained in the canonicalized candidate
    QueryInCandidate,
    /// Canonicalized candidate is contained in the canonicalized query
    CandidateInQuery,
}

/// Canonicalize a raw administrative region name.
///
/// Trims whitespace and strips at most one known prefix ("Kabupaten",
/// "Kotamadya", "Kab.", "Kota"), preferring the form with a trailing
/// space. Deterministic and total: empty or blank input yields `""`.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // Prefix followed by a space is unambiguous; try those first.
    for prefix in REGION_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(&format!("{prefix} ")) {
            return rest.trim().to_string();
        }
    }

    // Bare prefix with the name glued on ("Kab.Bandung"). Longest prefixes
    // are listed first so "Kotamadya" never loses to "Kota".
    for prefix in REGION_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            if !rest.is_empty() {
                return rest.trim().to_string();
            }
        }
    }

    trimmed.to_string()
}

/// Resolve whether a candidate raw name refers to the queried region,
/// reporting the strongest tier that matches
pub fn match_tier(query: &str, candidate: &str) -> Option<MatchTier> {
    if candidate == query {
        return Some(MatchTier::Exact);
    }

    let query_norm = normalize(query);
    let candidate_norm = normalize(candidate);
    if !query_norm.is_empty() && query_norm == candidate_norm {
        return Some(MatchTier::Normalized);
    }

    let query_lower = query_norm.to_lowercase();
    let candidate_lower = candidate_norm.to_lowercase();
    if query_lower.is_empty() || candidate_lower.is_empty() {
        return None;
    }
    if candidate_lower.contains(&query_lower) {
        return Some(MatchTier::QueryInCandidate);
    }
    if query_lower.contains(&candidate_lower) {
        return Some(MatchTier::CandidateInQuery);
    }

    None
}

/// Select every item whose region matches the query at the strongest
/// tier any item achieves.
///
/// Returns the matching items plus the winning tier. Mirrors the cascade
/// used when joining request rows to source rows: all rows of the winning
/// tier are kept so a region's full history survives the filter.
pub fn select_matching<'a, T>(
    items: &'a [T],
    region_of: impl Fn(&T) -> &str,
    query: &str,
) -> (Vec<&'a T>, Option<MatchTier>) {
    let mut best: Option<MatchTier> = None;
    let mut tiers = Vec::with_capacity(items.len());

    for item in items {
        let tier = match_tier(query, region_of(item));
        if let Some(tier) = tier {
            best = Some(match best {
                Some(current) if current <= tier => current,
                _ => tier,
            });
        }
        tiers.push(tier);
    }

    let Some(winning) = best else {
        return (Vec::new(), None);
    };

    if winning > MatchTier::Normalized {
        debug!(
            "Region '{}' resolved through substring tier {:?}; match may be imprecise",
            query, winning
        );
    }

    let matched = items
        .iter()
        .zip(tiers)
        .filter(|(_, tier)| *tier == Some(winning))
        .map(|(item, _)| item)
        .collect();

    (matched, Some(winning))
}

/// Resolve the single best candidate name for a query.
///
/// Ties within the winning tier break to the lexicographically smallest
/// raw name, making resolution deterministic where the matching policy
/// alone would leave the order undefined.
pub fn resolve_best<'a>(query: &str, candidates: &'a [String]) -> Option<(&'a str, MatchTier)> {
    let (matched, tier) = select_matching(candidates, |name| name.as_str(), query);
    let tier = tier?;
    matched
        .into_iter()
        .map(String::as_str)
        .min()
        .map(|name| (name, tier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_and_whitespace_variants_normalize_identically() {
        assert_eq!(normalize("Kab. Bandung"), "Bandung");
        assert_eq!(normalize("Kabupaten Bandung "), "Bandung");
        assert_eq!(normalize("  Kota Bogor"), "Bogor");
        assert_eq!(normalize("Kotamadya Bogor"), "Bogor");
        assert_eq!(normalize("Bandung"), "Bandung");
    }

    #[test]
    fn normalization_is_total_on_blank_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn strips_at_most_one_prefix() {
        // Only the leading prefix is removed even when the remainder
        // starts with another known prefix.
        assert_eq!(normalize("Kab. Kota Banjar"), "Kota Banjar");
    }

    #[test]
    fn glued_prefix_is_stripped_without_consuming_longer_names() {
        assert_eq!(normalize("Kab.Bandung"), "Bandung");
        // "Kotamadya" must not be reduced to "madya" by the "Kota" prefix
        assert_eq!(normalize("KotamadyaSurakarta"), "Surakarta");
    }

    #[test]
    fn exact_match_outranks_normalized() {
        assert_eq!(match_tier("Bandung", "Bandung"), Some(MatchTier::Exact));
        assert_eq!(
            match_tier("Bandung", "Kab. Bandung"),
            Some(MatchTier::Normalized)
        );
    }

    #[test]
    fn substring_tiers_fire_in_both_directions() {
        assert_eq!(
            match_tier("Bandung", "Kab. Bandung Barat"),
            Some(MatchTier::QueryInCandidate)
        );
        assert_eq!(
            match_tier("Bandung Barat", "Kab. Bandung"),
            Some(MatchTier::CandidateInQuery)
        );
        assert_eq!(match_tier("Bogor", "Kab. Bandung"), None);
    }

    #[test]
    fn selection_keeps_only_the_winning_tier() {
        let names = vec![
            "Kab. Bandung".to_string(),
            "Kab. Bandung Barat".to_string(),
            "Bandung".to_string(),
        ];
        let (matched, tier) = select_matching(&names, |name| name.as_str(), "Bandung");
        assert_eq!(tier, Some(MatchTier::Exact));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0], "Bandung");
    }

    #[test]
    fn tie_break_is_lexicographic_within_a_tier() {
        let names = vec![
            "Kab. Bandung Barat".to_string(),
            "Kab. Bandung Timur".to_string(),
        ];
        let (name, tier) = resolve_best("Bandung", &names).unwrap();
        assert_eq!(tier, MatchTier::QueryInCandidate);
        assert_eq!(name, "Kab. Bandung Barat");
    }
}
