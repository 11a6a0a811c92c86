use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Canonicalize a marketplace SKU for comparison.
///
/// Uppercases ASCII and drops whitespace plus the separator characters
/// `-`, `_` and `.` so that "abc-123" and "ABC 123" collapse to "ABC123".
/// Idempotent by construction.
pub fn normalize_sku(sku: &str) -> String {
    sku.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '_' | '.'))
        .flat_map(|c| c.to_uppercase())
        .collect()
}

fn format_rules() -> &'static HashMap<&'static str, Regex> {
    static RULES: OnceLock<HashMap<&'static str, Regex>> = OnceLock::new();
    RULES.get_or_init(|| {
        let mut rules = HashMap::new();
        rules.insert("amazon", Regex::new(r"(?i)^[A-Z0-9\-]{8,15}$").unwrap());
        rules.insert("ebay", Regex::new(r"(?i)^[A-Z0-9\-_]{3,80}$").unwrap());
        rules.insert("shopify", Regex::new(r"(?i)^[A-Z0-9\-_\.]{1,100}$").unwrap());
        rules.insert("default", Regex::new(r"(?i)^[A-Z0-9\-_\.]{1,50}$").unwrap());
        rules
    })
}

/// Whether a raw SKU respects the marketplace's code conventions.
/// Unknown marketplaces fall back to a permissive default rule.
pub fn validate_sku_format(sku: &str, marketplace: &str) -> bool {
    let rules = format_rules();
    let rule = rules
        .get(marketplace.to_ascii_lowercase().as_str())
        .unwrap_or_else(|| &rules["default"]);
    rule.is_match(sku)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators_and_uppercases() {
        assert_eq!(normalize_sku("abc-123"), "ABC123");
        assert_eq!(normalize_sku("ABC 123"), "ABC123");
        assert_eq!(normalize_sku(" a_b.c "), "ABC");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize_sku("Ab-9 x_z.3");
        assert_eq!(normalize_sku(&once), once);
    }

    #[test]
    fn amazon_rule_requires_eight_chars() {
        assert!(validate_sku_format("B08N5WRWNW", "amazon"));
        assert!(!validate_sku_format("B08", "amazon"));
    }

    #[test]
    fn unknown_marketplace_uses_default_rule() {
        assert!(validate_sku_format("sku_1.A-b", "etsy"));
        assert!(!validate_sku_format("has space", "etsy"));
    }
}
