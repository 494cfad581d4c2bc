//! Typed scholarly-work identifiers accepted by the pipeline.

use std::fmt;

/// A single work identifier. Exactly one variant per retrieval run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// A DOI, bare (`10.1038/nphys1170`) or as a `doi.org` URL.
    Doi(String),
    /// A free-text title to resolve via relevance search.
    Title(String),
    /// An arbitrary URL (doi.org link, arXiv page, or publisher page).
    Url(String),
}

impl Identifier {
    /// Creates a DOI identifier.
    #[must_use]
    pub fn doi(value: impl Into<String>) -> Self {
        Self::Doi(value.into())
    }

    /// Creates a title identifier.
    #[must_use]
    pub fn title(value: impl Into<String>) -> Self {
        Self::Title(value.into())
    }

    /// Creates a URL identifier.
    #[must_use]
    pub fn url(value: impl Into<String>) -> Self {
        Self::Url(value.into())
    }

    /// The raw input text, regardless of variant.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Doi(value) | Self::Title(value) | Self::Url(value) => value,
        }
    }

    /// Short label for the variant kind, used in log messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Doi(_) => "DOI",
            Self::Title(_) => "Title",
            Self::Url(_) => "URL",
        }
    }

    /// True when the inner text is empty or whitespace-only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.raw().trim().is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_raw_input() {
        assert_eq!(Identifier::doi("10.1000/xyz").to_string(), "10.1000/xyz");
        assert_eq!(
            Identifier::title("Attention Is All You Need").to_string(),
            "Attention Is All You Need"
        );
        assert_eq!(
            Identifier::url("https://arxiv.org/abs/1706.03762").to_string(),
            "https://arxiv.org/abs/1706.03762"
        );
    }

    #[test]
    fn kind_labels_match_variant() {
        assert_eq!(Identifier::doi("10.1/x").kind(), "DOI");
        assert_eq!(Identifier::title("t").kind(), "Title");
        assert_eq!(Identifier::url("https://x").kind(), "URL");
    }

    #[test]
    fn blank_detection_trims_whitespace() {
        assert!(Identifier::doi("   ").is_blank());
        assert!(Identifier::title("").is_blank());
        assert!(!Identifier::doi("10.1/x").is_blank());
    }
}
