//! Title canonicalisation and token-overlap similarity.

use std::collections::HashSet;

/// Lower-case, keep only `[a-z0-9]` and whitespace, collapse whitespace runs.
pub fn normalize_title(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Jaccard similarity of the whitespace token sets of two normalised titles.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let wa: HashSet<&str> = a.split_whitespace().collect();
    let wb: HashSet<&str> = b.split_whitespace().collect();
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    intersection as f64 / union as f64
}
