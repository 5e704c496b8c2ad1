//! Tag and entity-slug normalization (§3, §4.B.6).
//!
//! Tags from the classifier, the series detector, and users must collapse to
//! the same row whenever they mean the same thing, so normalization has to be
//! a pure, idempotent function: `normalize(normalize(s)) == normalize(s)`
//! (§8 property 6).

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE_OR_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());
static SLUG_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercases, Unicode-normalizes (NFKC, so visually-equivalent codepoint
/// sequences compare equal), and collapses any run of punctuation/whitespace
/// to a single space, trimming the ends. `"PG&E"` and `"pg & e"` both
/// normalize to `"pg e"`.
pub fn normalize(raw: &str) -> String {
    let folded: String = raw.nfc().collect();
    let lowered = folded.to_lowercase();
    let collapsed = WHITESPACE_OR_PUNCT.replace_all(&lowered, " ");
    collapsed.trim().to_string()
}

/// Builds the `series:<slug>` system tag and the standalone slug (§4.B.6):
/// lowercase, `&` → `and`, any remaining non-alphanumeric run → `-`,
/// collapsed and trimmed of leading/trailing dashes.
pub fn entity_slug(entity: &str) -> String {
    let lowered = entity.to_lowercase();
    let with_and = lowered.replace('&', "and");
    let collapsed = SLUG_NON_ALNUM.replace_all(&with_and, "-");
    collapsed.trim_matches('-').to_string()
}

pub fn series_tag(entity: &str) -> String {
    format!("series:{}", entity_slug(entity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("PG&E Energy Statement!!");
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_collapses_punctuation_and_case() {
        assert_eq!(normalize("Utility"), "utility");
        assert_eq!(normalize("  multiple   spaces  "), "multiple spaces");
    }

    #[test]
    fn entity_slug_handles_ampersand_and_case() {
        assert_eq!(entity_slug("Pacific Gas & Electric"), "pacific-gas-and-electric");
        assert_eq!(series_tag("Pacific Gas & Electric"), "series:pacific-gas-and-electric");
    }

    #[test]
    fn entity_slug_collapses_runs_and_trims_dashes() {
        assert_eq!(entity_slug("  Acme, Inc.  "), "acme-inc");
    }

    proptest::proptest! {
        #[test]
        fn normalize_is_idempotent_for_any_input(s in ".*") {
            let once = normalize(&s);
            let twice = normalize(&once);
            proptest::prop_assert_eq!(once, twice);
        }

        #[test]
        fn entity_slug_only_contains_lowercase_alnum_and_dashes(s in ".*") {
            let slug = entity_slug(&s);
            proptest::prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            proptest::prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
        }
    }
}
