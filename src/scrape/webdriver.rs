//! Browser-backed page extraction over the WebDriver wire protocol.
//!
//! Talks plain HTTP + JSON to a chromedriver-style endpoint; no browser
//! automation crate sits in between. The extraction itself is a fixed walk:
//! load the fallback page, watch for an explicit unavailability notice,
//! locate the document container, fall back to scanning every iframe, then
//! capture the session cookies that make the extracted link fetchable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{ExtractError, ExtractedLink, ExtractorTiming, PageExtractor, UNAVAILABLE_MARKERS};
use crate::download::SessionCookie;

/// CSS selector for the document container the fallback source renders.
const DOCUMENT_CONTAINER_SELECTOR: &str = "iframe#pdf, embed#pdf";

/// W3C WebDriver element identifier key.
const ELEMENT_ID_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Budget for a single wire call, which caps page-load time on navigation.
const NAVIGATION_TIMEOUT_SECS: u64 = 20;

/// How much response body to quote in automation error reasons.
const LOG_BODY_LIMIT: usize = 200;

/// Outcome of waiting for the document container element.
enum ContainerScan {
    /// Container present with a usable `src`.
    Found(String),
    /// Container present but its `src` is missing or empty.
    FoundWithoutSrc,
    /// Container never appeared within the wait budget.
    TimedOut,
}

/// Extracts embedded document links by driving a real browser.
///
/// Each [`extract`](PageExtractor::extract) call opens a fresh browser
/// session and tears it down before returning, whatever the outcome.
#[derive(Clone)]
pub struct WebDriverExtractor {
    client: Client,
    endpoint: String,
    fallback_base_url: String,
    headless: bool,
    timing: ExtractorTiming,
}

impl WebDriverExtractor {
    /// Creates an extractor talking to `endpoint` and loading pages from
    /// `fallback_base_url`. The browser runs headful by default; the fallback
    /// source detects headless browsers more readily.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(endpoint: impl Into<String>, fallback_base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(NAVIGATION_TIMEOUT_SECS))
            .build()
            .expect("failed to build WebDriver HTTP client with static configuration");
        Self {
            client,
            endpoint: endpoint.into(),
            fallback_base_url: fallback_base_url.into(),
            headless: false,
            timing: ExtractorTiming::default(),
        }
    }

    /// Switches the browser to headless mode.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Overrides wait and poll durations.
    #[must_use]
    pub fn with_timing(mut self, timing: ExtractorTiming) -> Self {
        self.timing = timing;
        self
    }

    /// The fallback page URL for a DOI.
    fn page_url(&self, doi: &str) -> String {
        let base = self
            .fallback_base_url
            .strip_suffix('/')
            .unwrap_or(&self.fallback_base_url);
        format!("{base}/{doi}")
    }

    /// Walks the page states against an open session. Teardown is the
    /// caller's job so every return here stays a plain early exit.
    async fn run_states(
        &self,
        session: &BrowserSession,
        doi: &str,
        page_url: &str,
    ) -> Result<ExtractedLink, ExtractError> {
        session.navigate(page_url).await?;

        if self.watch_for_unavailable(session).await {
            warn!(doi = %doi, "Fallback page explicitly reports the document unavailable");
            return Err(ExtractError::unavailable(doi));
        }
        debug!("No unavailability notice; waiting for the document container");

        let link = match self.locate_container(session).await? {
            ContainerScan::Found(src) => Some(src),
            ContainerScan::FoundWithoutSrc => {
                warn!("Document container present but carries no src");
                None
            }
            ContainerScan::TimedOut => {
                warn!("Document container did not appear; scanning all iframes");
                self.scan_iframes(session).await?
            }
        };
        let Some(link) = link else {
            warn!(page_url = %page_url, "No embedded document link found on the fallback page");
            return Err(ExtractError::link_not_found(page_url));
        };

        let url = self.resolve_link(&link)?;
        debug!(url = %url, "Resolved embedded document link");

        // Cookie capture is best-effort; the link may still be fetchable
        // without the session.
        let cookies = match session.cookie_list().await {
            Ok(cookies) => {
                debug!(count = cookies.len(), "Captured session cookies");
                cookies
            }
            Err(err) => {
                warn!(error = %err, "Could not capture session cookies; continuing without them");
                Vec::new()
            }
        };

        Ok(ExtractedLink { url, cookies })
    }

    /// Polls the page source for an explicit unavailability notice. Timing
    /// out is the healthy path. Source read failures here must not kill an
    /// otherwise working extraction, so they only log.
    async fn watch_for_unavailable(&self, session: &BrowserSession) -> bool {
        let deadline = Instant::now() + self.timing.unavailable_wait;
        loop {
            match session.page_source().await {
                Ok(source) => {
                    if UNAVAILABLE_MARKERS.iter().any(|m| source.contains(m)) {
                        return true;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "Page source read failed during unavailability check");
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.timing.poll_interval).await;
        }
    }

    /// Waits for the document container element and reads its `src`.
    async fn locate_container(
        &self,
        session: &BrowserSession,
    ) -> Result<ContainerScan, ExtractError> {
        let deadline = Instant::now() + self.timing.container_wait;
        loop {
            let elements = session.find_elements(DOCUMENT_CONTAINER_SELECTOR).await?;
            if let Some(element_id) = elements.first() {
                return match session.element_attribute(element_id, "src").await? {
                    Some(src) => {
                        debug!(src = %src, "Document container found");
                        Ok(ContainerScan::Found(src))
                    }
                    None => Ok(ContainerScan::FoundWithoutSrc),
                };
            }
            if Instant::now() >= deadline {
                return Ok(ContainerScan::TimedOut);
            }
            sleep(self.timing.poll_interval).await;
        }
    }

    /// Scans every iframe for a `src` that looks like a document link.
    async fn scan_iframes(&self, session: &BrowserSession) -> Result<Option<String>, ExtractError> {
        let iframes = session.find_elements("iframe").await?;
        if iframes.is_empty() {
            debug!("No iframe elements on the page");
        }
        for element_id in &iframes {
            if let Some(src) = session.element_attribute(element_id, "src").await? {
                if src.to_lowercase().contains(".pdf") {
                    debug!(src = %src, "Accepting iframe with document-like src");
                    return Ok(Some(src));
                }
                debug!(src = %src, "Skipping iframe without document-like src");
            }
        }
        Ok(None)
    }

    /// Makes an extracted link absolute. Relative links resolve against the
    /// configured fallback base, not the browser's current URL, which may
    /// have been redirected elsewhere.
    fn resolve_link(&self, link: &str) -> Result<String, ExtractError> {
        if let Some(rest) = link.strip_prefix("//") {
            return Ok(format!("https://{rest}"));
        }
        if link.starts_with("http") {
            return Ok(link.to_string());
        }
        let base = Url::parse(&self.fallback_base_url).map_err(|e| {
            ExtractError::automation(format!(
                "fallback base URL '{}' is not a valid URL: {e}",
                self.fallback_base_url
            ))
        })?;
        let resolved = base.join(link).map_err(|e| {
            ExtractError::automation(format!("could not resolve relative link '{link}': {e}"))
        })?;
        Ok(resolved.to_string())
    }
}

impl std::fmt::Debug for WebDriverExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDriverExtractor")
            .field("endpoint", &self.endpoint)
            .field("fallback_base_url", &self.fallback_base_url)
            .field("headless", &self.headless)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PageExtractor for WebDriverExtractor {
    #[instrument(skip(self))]
    async fn extract(&self, doi: &str) -> Result<ExtractedLink, ExtractError> {
        let page_url = self.page_url(doi);
        debug!(page_url = %page_url, "Opening browser session for the fallback page");

        let mut session =
            BrowserSession::open(self.client.clone(), &self.endpoint, self.headless).await?;
        let outcome = self.run_states(&session, doi, &page_url).await;
        session.close().await;
        outcome
    }
}

// ==================== Browser Session ====================

/// One live WebDriver session.
///
/// The session must be closed with [`close`](BrowserSession::close); dropping
/// an open session only logs, because teardown needs the async runtime.
struct BrowserSession {
    client: Client,
    base: String,
    session_id: String,
    closed: bool,
}

impl BrowserSession {
    /// Creates a browser session against the endpoint.
    async fn open(client: Client, endpoint: &str, headless: bool) -> Result<Self, ExtractError> {
        let base = endpoint.trim_end_matches('/').to_string();
        let value = checked_command(
            "session create",
            client
                .post(format!("{base}/session"))
                .json(&capabilities(headless)),
        )
        .await?;

        let session_id = value
            .pointer("/value/sessionId")
            .and_then(Value::as_str)
            .or_else(|| value.pointer("/sessionId").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                ExtractError::automation("session create response carried no session id")
            })?;
        debug!(session_id = %session_id, "Browser session created");

        Ok(Self {
            client,
            base,
            session_id,
            closed: false,
        })
    }

    fn command_url(&self, tail: &str) -> String {
        format!("{}/session/{}/{}", self.base, self.session_id, tail)
    }

    async fn navigate(&self, url: &str) -> Result<(), ExtractError> {
        checked_command(
            "navigate",
            self.client
                .post(self.command_url("url"))
                .json(&json!({ "url": url })),
        )
        .await?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String, ExtractError> {
        let value =
            checked_command("page source", self.client.get(self.command_url("source"))).await?;
        Ok(value
            .pointer("/value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Finds elements by CSS selector, returning their wire ids.
    async fn find_elements(&self, selector: &str) -> Result<Vec<String>, ExtractError> {
        let value = checked_command(
            "find elements",
            self.client
                .post(self.command_url("elements"))
                .json(&json!({ "using": "css selector", "value": selector })),
        )
        .await?;
        Ok(value
            .pointer("/value")
            .and_then(Value::as_array)
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_ID_KEY).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Reads an element attribute; missing and empty collapse to `None`.
    async fn element_attribute(
        &self,
        element_id: &str,
        attribute: &str,
    ) -> Result<Option<String>, ExtractError> {
        let value = checked_command(
            "element attribute",
            self.client.get(
                self.command_url(&format!("element/{element_id}/attribute/{attribute}")),
            ),
        )
        .await?;
        Ok(value
            .pointer("/value")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn cookie_list(&self) -> Result<Vec<SessionCookie>, ExtractError> {
        let value =
            checked_command("cookie read", self.client.get(self.command_url("cookie"))).await?;
        Ok(value
            .pointer("/value")
            .and_then(Value::as_array)
            .map(|cookies| cookies.iter().filter_map(cookie_from_json).collect())
            .unwrap_or_default())
    }

    /// Deletes the remote session. Safe to call more than once; a failed
    /// delete is logged and never retried.
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let url = format!("{}/session/{}", self.base, self.session_id);
        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(session_id = %self.session_id, "Browser session closed");
            }
            Ok(response) => {
                warn!(
                    session_id = %self.session_id,
                    status = response.status().as_u16(),
                    "Browser session delete returned error status"
                );
            }
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "Browser session delete failed"
                );
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            // Teardown needs the async runtime, so drop can only report.
            warn!(
                session_id = %self.session_id,
                "Browser session dropped without close; the remote session may leak"
            );
        }
    }
}

// ==================== Wire Protocol Helpers ====================

/// Session capabilities for a chromedriver-style endpoint.
fn capabilities(headless: bool) -> Value {
    let mut args = vec![
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

/// Sends one wire command and surfaces HTTP, parse, and in-band protocol
/// errors as automation failures named after the step.
async fn checked_command(
    step: &str,
    request: reqwest::RequestBuilder,
) -> Result<Value, ExtractError> {
    let response = request
        .send()
        .await
        .map_err(|e| ExtractError::automation(format!("{step} request failed: {e}")))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ExtractError::automation(format!("{step} response read failed: {e}")))?;
    if !status.is_success() {
        return Err(ExtractError::automation(format!(
            "{step} returned HTTP {}: {}",
            status.as_u16(),
            truncate_body(&body)
        )));
    }

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| ExtractError::automation(format!("{step} response parse failed: {e}")))?;
    if let Some(error) = value.pointer("/value/error").and_then(Value::as_str) {
        let message = value
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown cause");
        return Err(ExtractError::automation(format!(
            "{step} failed: {error}: {message}"
        )));
    }
    Ok(value)
}

fn cookie_from_json(value: &Value) -> Option<SessionCookie> {
    let name = value.get("name")?.as_str()?;
    let cookie_value = value.get("value")?.as_str()?;
    let domain = value.get("domain").and_then(Value::as_str).unwrap_or_default();
    let path = value.get("path").and_then(Value::as_str).unwrap_or("/");
    Some(SessionCookie::new(name, cookie_value, domain, path))
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= LOG_BODY_LIMIT {
        return body.to_string();
    }
    body.chars().take(LOG_BODY_LIMIT).collect::<String>() + "..."
}
