//! Rendered-page link extraction for the fallback document source.
//!
//! The fallback source serves documents embedded in a rendered page rather
//! than behind a plain URL. This module turns a DOI into the embedded
//! document link plus the browser session cookies needed to fetch it.
//!
//! [`PageExtractor`] is the seam the orchestrator depends on;
//! [`WebDriverExtractor`] is the real implementation, driving a browser over
//! the WebDriver wire protocol.

mod webdriver;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::download::SessionCookie;

pub use webdriver::WebDriverExtractor;

/// Default WebDriver endpoint (chromedriver's standard port).
pub const DEFAULT_WEBDRIVER_ENDPOINT: &str = "http://localhost:9515";

/// Page markers the fallback source renders when it has no copy of the
/// requested document.
pub(crate) const UNAVAILABLE_MARKERS: [&str; 2] = [
    "Unfortunately, Sci-Hub doesn't have the requested document:",
    "You can request this article",
];

/// An embedded document link extracted from a rendered page, together with
/// the session cookies that were live when it was found.
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    /// Absolute URL of the embedded document.
    pub url: String,
    /// Cookies captured from the browser session; may be empty.
    pub cookies: Vec<SessionCookie>,
}

/// Errors from rendered-page extraction.
///
/// The three variants carry distinct meaning for the orchestrator:
/// [`Unavailable`](ExtractError::Unavailable) is the source explicitly saying
/// it has no copy; the other two are extraction or automation failures.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page explicitly states the document is not available.
    #[error("fallback source has no copy of '{doi}'")]
    Unavailable {
        /// The DOI that was requested.
        doi: String,
    },

    /// The page rendered but no embedded document link could be found.
    #[error("no embedded document link found on {page_url}")]
    LinkNotFound {
        /// The fallback page that was scanned.
        page_url: String,
    },

    /// Browser automation failed (endpoint unreachable, session rejected,
    /// navigation error).
    #[error("browser automation failed: {reason}")]
    Automation {
        /// Human-readable cause.
        reason: String,
    },
}

impl ExtractError {
    /// Creates an explicit-unavailability error.
    pub fn unavailable(doi: impl Into<String>) -> Self {
        Self::Unavailable { doi: doi.into() }
    }

    /// Creates a link-not-found error.
    pub fn link_not_found(page_url: impl Into<String>) -> Self {
        Self::LinkNotFound {
            page_url: page_url.into(),
        }
    }

    /// Creates an automation error.
    pub fn automation(reason: impl Into<String>) -> Self {
        Self::Automation {
            reason: reason.into(),
        }
    }

    /// True when the source explicitly reported the document unavailable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

// Note on From trait implementations:
// No `From<reqwest::Error>` on purpose. Wire-protocol failures all collapse
// into `Automation` with a reason string assembled where the failing call
// knows which protocol step broke; a blanket conversion would lose that.

/// Wait and poll durations for the extraction state machine.
///
/// Injectable so tests can run the full machine in milliseconds. Defaults
/// match production behavior against the real fallback source.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorTiming {
    /// How long to watch for an explicit-unavailability marker before
    /// assuming the document page is rendering.
    pub unavailable_wait: Duration,
    /// How long to wait for the document container element to appear.
    pub container_wait: Duration,
    /// Pause between polls of the rendered page.
    pub poll_interval: Duration,
}

impl Default for ExtractorTiming {
    fn default() -> Self {
        Self {
            unavailable_wait: Duration::from_secs(6),
            container_wait: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Extracts an embedded document link for a DOI from the fallback source.
///
/// Object-safe so the orchestrator can hold `Box<dyn PageExtractor>` and test
/// suites can substitute scripted implementations.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Renders the fallback page for `doi` and extracts the embedded
    /// document link.
    ///
    /// # Errors
    ///
    /// [`ExtractError::Unavailable`] when the source explicitly has no copy,
    /// [`ExtractError::LinkNotFound`] when the page yields no link, and
    /// [`ExtractError::Automation`] for browser or protocol failures.
    async fn extract(&self, doi: &str) -> Result<ExtractedLink, ExtractError>;
}
