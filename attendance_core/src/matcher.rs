use log::debug;

use crate::config::*;
use crate::registry::Registry;

/// Looks up a typed name in the registry, ignoring case and surrounding
/// whitespace. Empty input never matches.
pub fn exact_match<'a>(typed: &str, registry: &'a Registry) -> Option<&'a Student> {
    let t = typed.trim();
    if t.is_empty() {
        return None;
    }
    registry.get(t)
}

/// Similarity between two names in [0, 1], ignoring case.
///
/// Uses the normalized Levenshtein distance: one minus the edit distance
/// divided by the length of the longer name.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&fold_key(a), &fold_key(b))
}

/// Proposes registry names close to `typed`, best first.
///
/// At most `limit` names with a similarity of at least `threshold` are
/// returned. Names with the same score keep the order of `names`.
pub fn suggest(typed: &str, names: &[&str], limit: usize, threshold: f64) -> Vec<String> {
    let t = typed.trim();
    if t.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(f64, &str)> = names
        .iter()
        .map(|n| (similarity(t, n), *n))
        .filter(|(score, _)| *score >= threshold)
        .collect();
    // Stable sort: ties stay in registry order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    debug!("suggest: {:?} -> {:?}", t, scored);
    scored
        .into_iter()
        .take(limit)
        .map(|(_, n)| n.to_string())
        .collect()
}

/// Resolves a typed name: exact match first, then suggestions.
pub fn resolve(typed: &str, registry: &Registry, rules: &KioskRules) -> MatchResult {
    if let Some(s) = exact_match(typed, registry) {
        return MatchResult::Matched(s.clone());
    }
    let suggestions = suggest(
        typed,
        &registry.names(),
        rules.suggestion_limit,
        rules.suggestion_threshold,
    );
    if suggestions.is_empty() {
        MatchResult::Unknown
    } else {
        MatchResult::Suggestions(suggestions)
    }
}
