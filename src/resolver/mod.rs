//! Metadata resolution against the `OpenAlex` works API.
//!
//! The [`MetadataResolver`] turns a typed [`Identifier`] into a
//! [`MetadataRecord`]: the canonical DOI, a display title, and (when the work
//! is open access) a candidate direct-download URL. DOI inputs are normalized
//! before querying, title inputs go through a relevance-ranked search, and URL
//! inputs are classified (DOI link, `arXiv` page, or raw URL last resort).
//!
//! # Example
//!
//! ```no_run
//! use paperfetch_core::{Identifier, MetadataResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = MetadataResolver::new();
//! let record = resolver.resolve(&Identifier::doi("10.1038/nphys1170")).await?;
//! println!("{} -> {:?}", record.title, record.candidate_url);
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::ResolveError;

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::identifier::Identifier;
use crate::user_agent;

/// Default `OpenAlex` API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

/// Budget for a single metadata query.
const METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// Title shown when the record carries no display name.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

static ARXIV_ABS_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // Static pattern, safe to panic
    Regex::new(r"arxiv\.org/abs/([^/]+)").expect("arXiv abs pattern is valid")
});

static ARXIV_PDF_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // Static pattern, safe to panic
    Regex::new(r"^https?://arxiv\.org/pdf/").expect("arXiv pdf pattern is valid")
});

// ==================== OpenAlex API Response Types ====================

/// A single work from the `OpenAlex` API (`snake_case` JSON, no renames needed).
#[derive(Debug, Deserialize)]
pub(crate) struct WorkRecord {
    /// Full DOI URL form, e.g. `https://doi.org/10.1038/nphys1170`.
    pub doi: Option<String>,
    pub display_name: Option<String>,
    pub open_access: Option<OpenAccessInfo>,
    pub best_oa_location: Option<OaLocation>,
}

/// The `open_access` block of a work.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAccessInfo {
    pub oa_url: Option<String>,
}

/// An open-access location entry.
///
/// Only the direct document URL is modeled. Landing-page URL fields exist in
/// the API response but routinely point at HTML abstract pages, so they are
/// not deserialized and must not be reintroduced as candidates.
#[derive(Debug, Deserialize)]
pub(crate) struct OaLocation {
    pub pdf_url: Option<String>,
}

/// Response shape of a `/works?filter=...` search.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub meta: Option<SearchMeta>,
    #[serde(default)]
    pub results: Vec<WorkRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchMeta {
    pub count: Option<u64>,
}

// ==================== MetadataRecord ====================

/// Canonical metadata resolved for one identifier.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    /// Bare canonical DOI (no `doi.org` prefix), when the record has one.
    pub canonical_doi: Option<String>,
    /// Display title; `"Unknown Title"` when the record has none.
    pub title: String,
    /// Direct open-access document URL, when the record advertises one.
    pub candidate_url: Option<String>,
    /// The exact API URL queried (diagnostic).
    pub query_url: String,
}

// ==================== MetadataResolver ====================

/// Resolves identifiers to canonical metadata via the `OpenAlex` works API.
pub struct MetadataResolver {
    client: Client,
    base_url: String,
}

impl Default for MetadataResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataResolver {
    /// Creates a resolver against the public `OpenAlex` endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::build(DEFAULT_BASE_URL.to_string())
    }

    /// Creates a resolver with a custom base URL (for testing with wiremock).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::build(base_url.into())
    }

    #[allow(clippy::expect_used)]
    fn build(base_url: String) -> Self {
        let client = Client::builder()
            .user_agent(user_agent::api_user_agent())
            .timeout(METADATA_TIMEOUT)
            .gzip(true)
            .build()
            .expect("failed to build metadata HTTP client with static configuration");
        Self { client, base_url }
    }

    /// Resolves one identifier to a [`MetadataRecord`].
    ///
    /// # Errors
    ///
    /// [`ResolveError::Input`] when the identifier is blank;
    /// [`ResolveError::NotFound`] when the service has no usable record
    /// (including zero search results, API errors, and transport failures).
    #[tracing::instrument(skip(self), fields(kind = identifier.kind(), input = %identifier))]
    pub async fn resolve(&self, identifier: &Identifier) -> Result<MetadataRecord, ResolveError> {
        if identifier.is_blank() {
            return Err(ResolveError::input("no identifier value provided"));
        }

        match identifier {
            Identifier::Doi(raw) => {
                let doi = normalize_doi(raw);
                let query_url = self.doi_query_url(&doi);
                self.lookup_work(&query_url, raw).await
            }
            Identifier::Title(text) => self.search_by_title(text.trim()).await,
            Identifier::Url(raw) => self.resolve_from_url(raw.trim()).await,
        }
    }

    /// Classifies a URL input and dispatches the matching query shape.
    async fn resolve_from_url(&self, url: &str) -> Result<MetadataRecord, ResolveError> {
        if let Some(doi) = doi_from_url(url) {
            debug!(doi = %doi, "URL carries a DOI, resolving as DOI");
            let query_url = self.doi_query_url(&doi);
            return self.lookup_work(&query_url, url).await;
        }

        if is_arxiv_url(url) {
            if let Some(arxiv_id) = arxiv_id_from_url(url) {
                debug!(arxiv_id = %arxiv_id, "URL is an arXiv page, resolving by arXiv id");
                let query_url = format!("{}/works/arxiv:{arxiv_id}", self.base_url);
                return self.lookup_work(&query_url, url).await;
            }
        }

        // Last resort: the raw URL as the work key. The service only knows
        // registered ids, so this mostly fails, but it is kept for parity.
        warn!(%url, "Querying raw URL against the metadata service (unreliable)");
        let query_url = format!("{}/works/{url}", self.base_url);
        self.lookup_work(&query_url, url).await
    }

    /// Relevance-ranked title search; only the top result is considered.
    async fn search_by_title(&self, title: &str) -> Result<MetadataRecord, ResolveError> {
        let query_url = format!(
            "{}/works?filter=title.search:{}&sort=relevance_score:desc&per-page=1",
            self.base_url,
            urlencoding::encode(title)
        );
        debug!(api_url = %query_url, "Searching metadata service by title");

        let response = self.get_checked(&query_url, title).await?;
        let body = response.json::<SearchResponse>().await.map_err(|e| {
            warn!(error = %e, "Failed to parse title search response JSON");
            ResolveError::not_found(title, "unexpected metadata API response format")
        })?;

        let count = body.meta.and_then(|m| m.count).unwrap_or(0);
        if count == 0 || body.results.is_empty() {
            return Err(ResolveError::not_found(
                title,
                "no work found matching this title",
            ));
        }

        Ok(build_record(&body.results[0], query_url))
    }

    /// Fetches a single work by key and builds the record.
    async fn lookup_work(
        &self,
        query_url: &str,
        identifier: &str,
    ) -> Result<MetadataRecord, ResolveError> {
        debug!(api_url = %query_url, "Querying metadata service");
        let response = self.get_checked(query_url, identifier).await?;
        let work = response.json::<WorkRecord>().await.map_err(|e| {
            warn!(error = %e, "Failed to parse work response JSON");
            ResolveError::not_found(identifier, "unexpected metadata API response format")
        })?;
        Ok(build_record(&work, query_url.to_string()))
    }

    /// Sends the GET and maps transport and HTTP-status failures.
    async fn get_checked(
        &self,
        query_url: &str,
        identifier: &str,
    ) -> Result<reqwest::Response, ResolveError> {
        let response = self.client.get(query_url).send().await.map_err(|e| {
            warn!(error = %e, "Metadata API request failed");
            ResolveError::not_found(
                identifier,
                "cannot reach the metadata API. Check your network connection.",
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let reason = match status.as_u16() {
                404 => "no record found in the metadata service".to_string(),
                429 => "metadata service rate limit exceeded. Try again in a few seconds."
                    .to_string(),
                s if s >= 500 => "metadata service unavailable. Try again later.".to_string(),
                s => format!("metadata service returned HTTP {s}"),
            };
            debug!(status = status.as_u16(), %reason, "Metadata API error");
            return Err(ResolveError::not_found(identifier, reason));
        }

        Ok(response)
    }

    fn doi_query_url(&self, doi: &str) -> String {
        // The service accepts the full doi.org URL form as a work key.
        format!("{}/works/https://doi.org/{doi}", self.base_url)
    }
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// ==================== Normalization and Extraction Helpers ====================

/// Strips a leading `doi.org` URL prefix, leaving a bare DOI.
#[must_use]
pub fn normalize_doi(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("https://doi.org/")
        .or_else(|| trimmed.strip_prefix("http://doi.org/"))
        .unwrap_or(trimmed)
        .to_string()
}

/// Extracts the DOI suffix from a URL containing a `doi.org/` segment.
fn doi_from_url(url: &str) -> Option<String> {
    let idx = url.rfind("doi.org/")?;
    let doi = &url[idx + "doi.org/".len()..];
    if doi.is_empty() {
        None
    } else {
        Some(doi.to_string())
    }
}

fn is_arxiv_url(url: &str) -> bool {
    url.contains("arxiv.org/abs/") || ARXIV_PDF_URL_RE.is_match(url)
}

/// Extracts an `arXiv` id from an abs/pdf page URL.
///
/// Drops the `abs/` or `pdf/` path segment and a trailing `.pdf` suffix, so
/// both page forms yield the same id.
fn arxiv_id_from_url(url: &str) -> Option<String> {
    let (_, tail) = url.rsplit_once("arxiv.org/")?;
    let tail = tail
        .strip_prefix("abs/")
        .or_else(|| tail.strip_prefix("pdf/"))
        .unwrap_or(tail);
    let tail = tail.strip_suffix(".pdf").unwrap_or(tail);
    let id = tail.trim_matches('/');
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Builds the public record from a raw work.
fn build_record(work: &WorkRecord, query_url: String) -> MetadataRecord {
    let canonical_doi = work
        .doi
        .as_deref()
        .map(normalize_doi)
        .filter(|doi| !doi.is_empty());
    let title = work
        .display_name
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let candidate_url = extract_candidate_url(work).map(|url| correct_arxiv_candidate(&url));

    MetadataRecord {
        canonical_doi,
        title,
        candidate_url,
        query_url,
    }
}

/// Extracts the best direct-download candidate from a work.
///
/// Priority:
/// 1. `open_access.oa_url` (explicit open-access URL)
/// 2. `best_oa_location.pdf_url` (direct document URL)
///
/// Landing-page fields are deliberately not consulted; they trade recall for
/// precision by only ever pointing at fetchable documents.
fn extract_candidate_url(work: &WorkRecord) -> Option<String> {
    if let Some(open_access) = &work.open_access {
        if let Some(oa_url) = &open_access.oa_url {
            if !oa_url.is_empty() {
                return Some(oa_url.clone());
            }
        }
    }

    if let Some(best) = &work.best_oa_location {
        if let Some(pdf_url) = &best.pdf_url {
            if !pdf_url.is_empty() {
                return Some(pdf_url.clone());
            }
        }
    }

    None
}

/// Rewrites an `arXiv` abstract-page candidate to the canonical PDF URL.
///
/// `https://arxiv.org/abs/{id}` pages are HTML; the matching document lives
/// at `https://arxiv.org/pdf/{id}.pdf`. URLs without an extractable id pass
/// through unchanged.
#[must_use]
pub fn correct_arxiv_candidate(url: &str) -> String {
    if !url.contains("arxiv.org/abs/") {
        return url.to_string();
    }
    match ARXIV_ABS_RE.captures(url).and_then(|c| c.get(1)) {
        Some(id) => format!("https://arxiv.org/pdf/{}.pdf", id.as_str()),
        None => url.to_string(),
    }
}
