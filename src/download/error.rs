//! Error types for document fetching.

use thiserror::Error;

/// Errors that can occur while fetching and validating a document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connection, TLS, timeout) or an HTTP
    /// error status. Timeouts are folded in here; the caller treats every
    /// network-shaped failure the same way.
    #[error("network error fetching {url}: {reason}")]
    Network {
        /// The URL that failed.
        url: String,
        /// Human-readable cause.
        reason: String,
        /// HTTP status when the server answered; `None` for transport failures.
        status: Option<u16>,
    },

    /// The response completed but the body is not a usable document.
    #[error("invalid document content from {url}: {reason}")]
    ContentInvalid {
        /// The URL that was fetched.
        url: String,
        /// Human-readable cause.
        reason: String,
        /// Declared `Content-Type` header, when present.
        content_type: Option<String>,
    },
}

impl FetchError {
    /// Creates a network error from a transport failure.
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
            status: None,
        }
    }

    /// Creates a network error for a non-success HTTP status.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::Network {
            url: url.into(),
            reason: format!("server returned HTTP {status}"),
            status: Some(status),
        }
    }

    /// Creates an invalid-content error.
    pub fn content_invalid(
        url: impl Into<String>,
        reason: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        Self::ContentInvalid {
            url: url.into(),
            reason: reason.into(),
            content_type,
        }
    }

    /// The HTTP status carried by a network error, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            Self::ContentInvalid { .. } => None,
        }
    }
}

// Note on From trait implementations:
// No `From<reqwest::Error>` on purpose. Both variants require the request URL
// for context, which the source error does not reliably carry; the helper
// constructors keep that context mandatory at every call site.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_network_display_includes_url_and_reason() {
        let error = FetchError::network("https://example.com/file.pdf", "connection refused");
        let msg = error.to_string();
        assert!(msg.contains("https://example.com/file.pdf"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_http_status_carries_code() {
        let error = FetchError::http_status("https://example.com/x", 404);
        assert_eq!(error.status(), Some(404));
        assert!(error.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_content_invalid_display() {
        let error = FetchError::content_invalid(
            "https://example.com/x",
            "body does not start with a PDF signature",
            Some("text/html".to_string()),
        );
        assert_eq!(error.status(), None);
        assert!(error.to_string().contains("invalid document content"));
        assert!(error.to_string().contains("PDF signature"));
    }
}
