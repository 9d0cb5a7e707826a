// src/utils/slug.rs

//! Slug generation.

use unicode_normalization::UnicodeNormalization;

/// Convert a display label into a lowercase, hyphen-separated slug.
///
/// Accents are folded to ASCII, punctuation is removed, and runs of
/// whitespace or hyphens become a single hyphen. Pure and deterministic.
///
/// # Examples
/// ```
/// use portfolio_crawler::utils::slugify;
///
/// assert_eq!(slugify("DoorDash, Inc."), "doordash-inc");
/// assert_eq!(slugify("Café"), "cafe");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().nfkd().filter(char::is_ascii) {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_ascii_whitespace() || c == '-' {
            pending_hyphen = true;
        }
    }

    slug
}

/// Whether `slug` is already in canonical form: `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.split('-').all(|part| {
            !part.is_empty()
                && part
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        assert_eq!(slugify("Acme Inc"), "acme-inc");
        assert_eq!(slugify("  Beta   Co  "), "beta-co");
    }

    #[test]
    fn test_punctuation_removed() {
        assert_eq!(slugify("DoorDash, Inc."), "doordash-inc");
        assert_eq!(slugify("Data & Analytics"), "data-analytics");
        assert_eq!(slugify("AI/ML"), "aiml");
        assert_eq!(slugify("under_score"), "underscore");
    }

    #[test]
    fn test_hyphen_runs_collapse() {
        assert_eq!(slugify("a - - b"), "a-b");
        assert_eq!(slugify("--lead and trail--"), "lead-and-trail");
    }

    #[test]
    fn test_accents_fold() {
        assert_eq!(slugify("café"), "cafe");
        assert_eq!(slugify("Zürich Straße"), "zurich-strae");
    }

    #[test]
    fn test_nothing_left() {
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify("株式会社"), "");
    }

    #[test]
    fn test_output_is_valid() {
        for input in ["Acme Inc", "a - - b", "Pre-Seed/Seed", "X.AI  Corp."] {
            let slug = slugify(input);
            assert!(is_valid_slug(&slug), "{input:?} -> {slug:?}");
        }
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("acme-inc"));
        assert!(is_valid_slug("a1"));
        assert!(!is_valid_slug("Acme"));
        assert!(!is_valid_slug("-acme"));
        assert!(!is_valid_slug("acme--inc"));
        assert!(!is_valid_slug(""));
    }
}
