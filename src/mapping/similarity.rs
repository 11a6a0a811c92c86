use strsim::levenshtein;

/// Normalized edit-distance similarity between two already-canonicalized
/// SKUs: `1 − levenshtein / max(len)`. Two empty strings are identical.
///
/// Deterministic and symmetric; the marketplace-match bonus lives in the
/// resolver because it depends on the candidate's stored marketplace, not
/// on the strings themselves.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}
