//! HTTP client for fetching and validating documents.
//!
//! The [`DocumentFetcher`] downloads candidate URLs with a browser-like
//! identity and refuses to hand back anything that is not a real document:
//! when the server's declared content-type is not a document type, the first
//! kilobyte of the body must carry the PDF signature.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, REFERER};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DOCUMENT_TIMEOUT_SECS, PDF_SIGNATURE, SIGNATURE_PROBE_BYTES,
};
use super::error::FetchError;
use crate::user_agent::BROWSER_USER_AGENT;

/// Accept header sent with document requests.
const DOCUMENT_ACCEPT: &str = "application/pdf,application/octet-stream;q=0.9,*/*;q=0.8";

/// A cookie captured from a rendering session.
///
/// Attached to fallback document fetches so the document host sees the same
/// session the browser established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain, possibly with a leading dot (`.example.org`).
    pub domain: String,
    /// Cookie path; empty is treated as `/`.
    pub path: String,
}

impl SessionCookie {
    /// Creates a cookie.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: path.into(),
        }
    }
}

/// A fetched document.
///
/// Values only exist for bodies that passed validation, so holding a
/// `Document` means holding verified document bytes.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
}

impl Document {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw document bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Document size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; empty bodies never validate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the document, returning the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// HTTP client for fetching candidate document URLs.
///
/// Designed to be created once and reused; connection pooling is shared
/// across direct and fallback fetches.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
}

impl Default for DocumentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFetcher {
    /// Creates a fetcher with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(DOCUMENT_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .expect("failed to build document HTTP client with static configuration");
        Self { client }
    }

    /// Fetches and validates a document with no session state.
    ///
    /// # Errors
    ///
    /// [`FetchError::Network`] for transport failures and non-success HTTP
    /// statuses; [`FetchError::ContentInvalid`] when the body is empty or
    /// fails the document signature check.
    pub async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.fetch_with_session(url, &[], None).await
    }

    /// Fetches and validates a document, attaching matching session cookies
    /// and an optional referer.
    ///
    /// Cookies are only sent when their domain matches the request host and
    /// their path covers the request path; cookies scoped to other domains
    /// never leak into the request.
    ///
    /// # Errors
    ///
    /// [`FetchError::Network`] for transport failures and non-success HTTP
    /// statuses; [`FetchError::ContentInvalid`] when the body is empty or
    /// fails the document signature check.
    #[instrument(skip(self, cookies), fields(cookie_count = cookies.len()))]
    pub async fn fetch_with_session(
        &self,
        url: &str,
        cookies: &[SessionCookie],
        referer: Option<&str>,
    ) -> Result<Document, FetchError> {
        // Fragments are client-side only; some hosts reject them outright.
        let request_url = strip_fragment(url);

        let mut request = self.client.get(request_url).header(ACCEPT, DOCUMENT_ACCEPT);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        if let Some(header) = cookie_header_for(request_url, cookies) {
            debug!(url = %request_url, "Attaching session cookies to document fetch");
            request = request.header(COOKIE, header);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(url = %request_url, "Document fetch timed out");
                FetchError::network(request_url, "request timed out")
            } else {
                warn!(url = %request_url, error = %e, "Document fetch failed");
                FetchError::network(request_url, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                url = %request_url,
                status = status.as_u16(),
                "Document fetch returned error status"
            );
            return Err(FetchError::http_status(request_url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let declared_document = content_type
            .as_deref()
            .is_some_and(is_document_content_type);

        // Stream the body. When the declared type is ambiguous, the first
        // probe window decides validity before the rest is pulled.
        let mut stream = response.bytes_stream();
        let mut body: Vec<u8> = Vec::new();
        let mut signature_checked = declared_document;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                FetchError::network(request_url, format!("body read failed: {e}"))
            })?;
            body.extend_from_slice(&chunk);
            if !signature_checked && body.len() >= SIGNATURE_PROBE_BYTES {
                if body.starts_with(PDF_SIGNATURE) {
                    signature_checked = true;
                } else {
                    return Err(self.reject_missing_signature(request_url, content_type));
                }
            }
        }

        if body.is_empty() {
            warn!(url = %request_url, "Document fetch returned an empty body");
            return Err(FetchError::content_invalid(
                request_url,
                "empty response body",
                content_type,
            ));
        }

        // Body shorter than the probe window: check what arrived.
        if !signature_checked && !body.starts_with(PDF_SIGNATURE) {
            return Err(self.reject_missing_signature(request_url, content_type));
        }

        debug!(
            url = %request_url,
            bytes = body.len(),
            content_type = content_type.as_deref().unwrap_or("-"),
            "Document fetched and validated"
        );
        Ok(Document::new(body))
    }

    fn reject_missing_signature(&self, url: &str, content_type: Option<String>) -> FetchError {
        let declared = content_type.as_deref().unwrap_or("unknown").to_string();
        warn!(
            url = %url,
            content_type = %declared,
            "Response is not a document (no PDF signature in probe window)"
        );
        FetchError::content_invalid(
            url,
            format!("content-type '{declared}' and no PDF signature in the body"),
            content_type,
        )
    }
}

// ==================== Request Shaping Helpers ====================

/// Drops everything from the first `#` on.
fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}

/// True for content-types the server may declare for a real document.
fn is_document_content_type(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.contains("application/pdf") || ct.contains("octet-stream")
}

/// Builds a `Cookie` header value from the cookies that are in scope for the
/// request URL, or `None` when none match.
fn cookie_header_for(url: &str, cookies: &[SessionCookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let request_path = if parsed.path().is_empty() {
        "/"
    } else {
        parsed.path()
    };

    let matching: Vec<String> = cookies
        .iter()
        .filter(|c| domain_matches(host, &c.domain) && path_matches(request_path, &c.path))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect();

    if matching.is_empty() {
        None
    } else {
        Some(matching.join("; "))
    }
}

/// RFC 6265 §5.1.3 domain matching: exact match, or the cookie domain is a
/// dot-separated suffix of the request host.
fn domain_matches(host: &str, cookie_domain: &str) -> bool {
    let cookie_domain = cookie_domain.strip_prefix('.').unwrap_or(cookie_domain);
    if cookie_domain.is_empty() {
        return false;
    }
    let host = host.to_ascii_lowercase();
    let cookie_domain = cookie_domain.to_ascii_lowercase();
    if host == cookie_domain {
        return true;
    }
    host.len() > cookie_domain.len()
        && host.ends_with(&cookie_domain)
        && host.as_bytes()[host.len() - cookie_domain.len() - 1] == b'.'
}

/// RFC 6265 §5.1.4 path matching: exact match, or the cookie path is a
/// prefix that ends at a `/` boundary.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    let cookie_path = if cookie_path.is_empty() { "/" } else { cookie_path };
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ==================== Request Shaping Tests ====================

    #[test]
    fn test_strip_fragment_removes_fragment() {
        assert_eq!(
            strip_fragment("https://example.com/a.pdf#page=2"),
            "https://example.com/a.pdf"
        );
    }

    #[test]
    fn test_strip_fragment_no_fragment_unchanged() {
        assert_eq!(
            strip_fragment("https://example.com/a.pdf"),
            "https://example.com/a.pdf"
        );
    }

    #[test]
    fn test_is_document_content_type() {
        assert!(is_document_content_type("application/pdf"));
        assert!(is_document_content_type("Application/PDF; charset=binary"));
        assert!(is_document_content_type("application/octet-stream"));
        assert!(is_document_content_type("binary/octet-stream"));
        assert!(!is_document_content_type("text/html"));
        assert!(!is_document_content_type("application/json"));
    }

    // ==================== Cookie Scoping Tests ====================

    fn cookie(name: &str, domain: &str, path: &str) -> SessionCookie {
        SessionCookie::new(name, "v", domain, path)
    }

    #[test]
    fn test_domain_matches_exact_and_parent() {
        assert!(domain_matches("example.org", "example.org"));
        assert!(domain_matches("cdn.example.org", ".example.org"));
        assert!(domain_matches("cdn.example.org", "example.org"));
        assert!(domain_matches("EXAMPLE.org", "example.ORG"));
    }

    #[test]
    fn test_domain_matches_rejects_other_domains() {
        assert!(!domain_matches("example.org", "other.org"));
        assert!(!domain_matches("notexample.org", "example.org"));
        assert!(!domain_matches("example.org", "cdn.example.org"));
        assert!(!domain_matches("example.org", ""));
    }

    #[test]
    fn test_path_matches_prefix_boundaries() {
        assert!(path_matches("/", "/"));
        assert!(path_matches("/a/b", "/"));
        assert!(path_matches("/a/b", "/a"));
        assert!(path_matches("/a/b", "/a/"));
        assert!(path_matches("/a", "/a"));
        assert!(!path_matches("/ab", "/a"));
        assert!(!path_matches("/b", "/a"));
    }

    #[test]
    fn test_cookie_header_scopes_to_request_host() {
        let cookies = vec![
            cookie("session", "docs.example.org", "/"),
            cookie("tracker", "elsewhere.net", "/"),
        ];
        let header = cookie_header_for("https://docs.example.org/file.pdf", &cookies);
        assert_eq!(header, Some("session=v".to_string()));
    }

    #[test]
    fn test_cookie_header_none_when_nothing_matches() {
        let cookies = vec![cookie("tracker", "elsewhere.net", "/")];
        assert_eq!(
            cookie_header_for("https://docs.example.org/file.pdf", &cookies),
            None
        );
    }

    #[test]
    fn test_cookie_header_joins_multiple_matches() {
        let cookies = vec![
            cookie("a", "example.org", "/"),
            cookie("b", ".example.org", "/"),
        ];
        let header = cookie_header_for("https://example.org/x", &cookies).unwrap();
        assert_eq!(header, "a=v; b=v");
    }

    #[test]
    fn test_cookie_header_empty_path_treated_as_root() {
        let cookies = vec![cookie("a", "example.org", "")];
        assert!(cookie_header_for("https://example.org/deep/path", &cookies).is_some());
    }

    // ==================== Fetch and Validation Tests (wiremock) ====================

    fn pdf_body(extra_len: usize) -> Vec<u8> {
        let mut body = b"%PDF-1.4\n".to_vec();
        body.extend(std::iter::repeat_n(b'x', extra_len));
        body
    }

    #[tokio::test]
    async fn test_fetch_pdf_content_type_succeeds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(64), "application/pdf"))
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let doc = fetcher
            .fetch(&format!("{}/paper.pdf", mock_server.uri()))
            .await
            .unwrap();
        assert!(doc.bytes().starts_with(b"%PDF-"));
        assert!(!doc.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_html_content_type_with_pdf_signature_succeeds() {
        // Misdeclared content-type with a real document body is accepted.
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(4096), "text/html"))
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let doc = fetcher
            .fetch(&format!("{}/paper", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(doc.len(), 9 + 4096);
    }

    #[tokio::test]
    async fn test_fetch_pdf_content_type_empty_body_rejected() {
        // Declared type never rescues an empty body.
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(Vec::new(), "application/pdf"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let err = fetcher
            .fetch(&format!("{}/empty.pdf", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ContentInvalid { .. }));
        assert!(err.to_string().contains("empty response body"));
    }

    #[tokio::test]
    async fn test_fetch_html_body_rejected() {
        let mock_server = MockServer::start().await;
        let page = "<html><body>Not a document</body></html>".repeat(64);
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(page.into_bytes(), "text/html"))
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let err = fetcher
            .fetch(&format!("{}/landing", mock_server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::ContentInvalid { content_type, .. } => {
                assert_eq!(content_type.as_deref(), Some("text/html"));
            }
            other => panic!("Expected ContentInvalid, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_short_html_body_rejected() {
        // Body smaller than the probe window still gets checked.
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tiny"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"<html/>".to_vec(), "text/html"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let err = fetcher
            .fetch(&format!("{}/tiny", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ContentInvalid { .. }));
    }

    #[tokio::test]
    async fn test_fetch_octet_stream_accepted_without_signature() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0u8; 256], "application/octet-stream"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let doc = fetcher
            .fetch(&format!("{}/blob", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(doc.len(), 256);
    }

    #[tokio::test]
    async fn test_fetch_404_is_network_error_with_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let err = fetcher
            .fetch(&format!("{}/gone.pdf", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_network_error() {
        let fetcher = DocumentFetcher::new();
        let err = fetcher
            .fetch("http://127.0.0.1:1/paper.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { status: None, .. }));
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_identity_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            // wiremock's header matcher splits comma-containing values, so the
            // full UA and Accept strings must be matched as multi-value lists.
            .and(headers(
                "user-agent",
                BROWSER_USER_AGENT.split(',').map(str::trim).collect(),
            ))
            .and(headers(
                "accept",
                DOCUMENT_ACCEPT.split(',').map(str::trim).collect(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(0), "application/pdf"))
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new();
        let doc = fetcher
            .fetch(&format!("{}/paper.pdf", mock_server.uri()))
            .await;
        assert!(doc.is_ok(), "browser identity headers must be sent");
    }

    #[tokio::test]
    async fn test_fetch_with_session_sends_referer_and_matching_cookies() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download.pdf"))
            .and(header("referer", "https://fallback.example.org"))
            .and(header("cookie", "session=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(0), "application/pdf"))
            .mount(&mock_server)
            .await;

        let cookies = vec![
            SessionCookie::new("session", "abc123", "127.0.0.1", "/"),
            SessionCookie::new("other", "zzz", "unrelated.example.net", "/"),
        ];
        let fetcher = DocumentFetcher::new();
        let doc = fetcher
            .fetch_with_session(
                &format!("{}/download.pdf", mock_server.uri()),
                &cookies,
                Some("https://fallback.example.org"),
            )
            .await;
        assert!(doc.is_ok(), "scoped cookie and referer must be sent");
    }

    #[tokio::test]
    async fn test_fetch_without_cookies_sends_no_cookie_header() {
        let mock_server = MockServer::start().await;
        // Mount a catch-all that fails the test if a cookie header shows up.
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .and(header_exists("cookie"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(0), "application/pdf"))
            .mount(&mock_server)
            .await;

        let cookies = vec![SessionCookie::new("other", "zzz", "unrelated.example.net", "/")];
        let fetcher = DocumentFetcher::new();
        let doc = fetcher
            .fetch_with_session(
                &format!("{}/paper.pdf", mock_server.uri()),
                &cookies,
                None,
            )
            .await;
        assert!(doc.is_ok(), "out-of-scope cookies must not be attached");
    }
}
