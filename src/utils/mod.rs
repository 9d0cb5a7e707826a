//! Utility functions and helpers.

pub mod robots;
pub mod slug;
pub mod url;

pub use robots::RobotsTxt;
pub use slug::{is_valid_slug, slugify};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Collapse internal whitespace runs to single spaces and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(b"<html>same</html>");
        let b = content_hash(b"<html>same</html>");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash(b"<html>changed</html>"));
    }

    #[test]
    fn test_content_hash_known_value() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Acme \n\t Inc  "), "Acme Inc");
    }
}
