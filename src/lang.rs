/// Language tag normalization
///
/// Model lookups and cache keys use a primary subtag only: `"en-US"`,
/// `"en_GB"` and `"EN"` all normalize to `"en"`.

use serde::Deserialize;
use std::fmt;

/// Normalized language tag (primary subtag, lower-cased)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Normalize a full tag down to its primary subtag
    pub fn new(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or(tag)
            .trim()
            .to_lowercase();
        Self(primary)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LanguageTag {
    fn default() -> Self {
        Self::new("en-us")
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LanguageTag {
    fn from(tag: String) -> Self {
        Self::new(&tag)
    }
}

impl From<&str> for LanguageTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(LanguageTag::new("en-US").as_str(), "en");
        assert_eq!(LanguageTag::new("en_GB").as_str(), "en");
        assert_eq!(LanguageTag::new("PT-br").as_str(), "pt");
        assert_eq!(LanguageTag::new("de").as_str(), "de");
    }

    #[test]
    fn test_regional_variants_share_a_tag() {
        assert_eq!(LanguageTag::new("en-US"), LanguageTag::new("en-AU"));
    }

    #[test]
    fn test_default_is_english() {
        assert_eq!(LanguageTag::default().as_str(), "en");
    }

    #[test]
    fn test_deserialize_normalizes() {
        let tag: LanguageTag = serde_json::from_str("\"fr-CA\"").unwrap();
        assert_eq!(tag.as_str(), "fr");
    }
}
