//! Shared User-Agent strings for metadata and document HTTP clients.
//!
//! Single source for the project URL and UA formats so API traffic identifies
//! the tool (good citizenship; RFC 9308) while document fetches present a
//! browser UA, matching what the rendering session advertises.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/paperfetch";

/// Browser User-Agent for document fetches.
///
/// Document hosts behind the fallback source reject obvious tool UAs, so
/// direct and fallback downloads present the same browser identity the
/// automation session uses.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/98.0.4758.102 Safari/537.36";

/// Default User-Agent for metadata API requests (identifies the tool).
#[must_use]
pub(crate) fn api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("paperfetch/{version} (scholarly-retrieval-tool; +{PROJECT_UA_URL})")
}
