//! Retrieval orchestration: the fallback policy and the batch runner.
//!
//! [`Pipeline::run`] takes one identifier through metadata resolution, a
//! direct open-access attempt, and the rendered fallback source, and always
//! produces a classified [`RunResult`]. [`Pipeline::run_all`] wraps that in a
//! sequential batch where one item's panic cannot take down the rest.

mod outcome;

pub use outcome::{AttemptOutcome, RetrievalAttempt, RunResult, RunStatus, SourceKind};

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, info, instrument, warn};

use crate::download::{Document, DocumentFetcher, FetchError, title_filename};
use crate::identifier::Identifier;
use crate::report::{RunReporter, Severity};
use crate::resolver::{MetadataResolver, ResolveError, UNKNOWN_TITLE};
use crate::scrape::{ExtractError, PageExtractor};
use outcome::RunState;

/// Synthetic identifier for batch lifecycle events in the run log.
const BATCH_IDENTIFIER: &str = "BATCH_MODE";

/// Fallback source used when no base URL is configured.
pub const DEFAULT_FALLBACK_BASE_URL: &str = "https://sci-hub.mksa.top/";

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory documents are written to.
    pub output_dir: PathBuf,
    /// Base URL of the rendered fallback source.
    pub fallback_base_url: String,
    /// Pause between batch items; zero disables it.
    pub delay_between_items: Duration,
}

/// What metadata resolution hands the retrieval stages.
struct Resolution {
    doi: Option<String>,
    title: String,
    candidate_url: Option<String>,
}

/// What a retrieval stage decided about the rest of the run.
enum StageFlow {
    /// Stop now; status and causes are already recorded.
    Stop(Option<PathBuf>),
    /// Move on to the next stage.
    Continue,
}

/// Runs the full retrieval policy for identifiers.
pub struct Pipeline {
    config: PipelineConfig,
    resolver: MetadataResolver,
    fetcher: DocumentFetcher,
    extractor: Box<dyn PageExtractor>,
    reporter: RunReporter,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        resolver: MetadataResolver,
        fetcher: DocumentFetcher,
        extractor: Box<dyn PageExtractor>,
        reporter: RunReporter,
    ) -> Self {
        Self {
            config,
            resolver,
            fetcher,
            extractor,
            reporter,
        }
    }

    /// The reporter writing this pipeline's telemetry files.
    #[must_use]
    pub fn reporter(&self) -> &RunReporter {
        &self.reporter
    }

    /// Processes one identifier through the full policy.
    ///
    /// Infallible at the type level: every error is converted into a
    /// classified result, and at most one document is stored.
    #[instrument(skip(self), fields(kind = identifier.kind(), input = %identifier))]
    pub async fn run(&self, identifier: &Identifier) -> RunResult {
        let input = identifier.raw();
        let mut state = RunState::new();
        self.reporter.record(
            input,
            Severity::Info,
            &format!("Starting retrieval ({} input)", identifier.kind()),
        );

        let Some(resolution) = self.resolve_stage(identifier, &mut state).await else {
            return self.finish(identifier, state, None, UNKNOWN_TITLE.to_string(), None);
        };
        let Resolution {
            doi,
            title,
            candidate_url,
        } = resolution;

        let mut stored_path = None;
        let mut fallback_wanted = true;
        if let Some(candidate) = candidate_url.as_deref() {
            match self.direct_stage(input, candidate, &title, &mut state).await {
                StageFlow::Stop(path) => {
                    stored_path = path;
                    fallback_wanted = false;
                }
                StageFlow::Continue => {}
            }
        }
        if fallback_wanted {
            stored_path = self
                .fallback_stage(input, doi.as_deref(), &title, &mut state)
                .await;
        }

        self.finish(identifier, state, doi, title, stored_path)
    }

    /// Processes identifiers strictly in order, isolating each item behind a
    /// panic guard so one failure cannot take down the batch.
    pub async fn run_all(&self, identifiers: &[Identifier]) -> Vec<RunResult> {
        let total = identifiers.len();
        self.reporter.record(
            BATCH_IDENTIFIER,
            Severity::Info,
            &format!("Found {total} identifiers to process"),
        );

        let mut results = Vec::with_capacity(total);
        for (index, identifier) in identifiers.iter().enumerate() {
            self.reporter.record(
                identifier.raw(),
                Severity::Info,
                &format!("Starting processing for item {}/{total}", index + 1),
            );

            let result = match AssertUnwindSafe(self.run(identifier)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = format!(
                        "unexpected panic while processing: {}",
                        panic_message(panic.as_ref())
                    );
                    self.reporter
                        .record(identifier.raw(), Severity::Critical, &message);
                    self.reporter.summarize(
                        identifier.raw(),
                        RunStatus::FailureUnexpected,
                        &message,
                    );
                    synthetic_failure(identifier, message)
                }
            };
            results.push(result);

            if index + 1 < total && !self.config.delay_between_items.is_zero() {
                debug!(
                    delay_secs = self.config.delay_between_items.as_secs(),
                    "Pausing before the next item"
                );
                tokio::time::sleep(self.config.delay_between_items).await;
            }
        }

        self.reporter
            .record(BATCH_IDENTIFIER, Severity::Info, "Batch processing complete");
        results
    }

    // ==================== Stages ====================

    /// Stage 1: metadata. `None` means the run stops here with the status
    /// already recorded.
    async fn resolve_stage(
        &self,
        identifier: &Identifier,
        state: &mut RunState,
    ) -> Option<Resolution> {
        let input = identifier.raw();
        match self.resolver.resolve(identifier).await {
            Ok(record) => {
                self.reporter.record(
                    input,
                    Severity::Info,
                    &format!("Resolved metadata: '{}'", record.title),
                );
                if record.candidate_url.is_none() {
                    self.reporter.record(
                        input,
                        Severity::Info,
                        "No direct open-access URL in the metadata record",
                    );
                }
                Some(Resolution {
                    doi: record.canonical_doi,
                    title: record.title,
                    candidate_url: record.candidate_url,
                })
            }
            Err(err @ ResolveError::Input { .. }) => {
                state.set_status(RunStatus::FailureInputError);
                state.push_cause(err.to_string());
                self.reporter
                    .record(input, Severity::Error, &format!("Input error: {err}"));
                None
            }
            Err(err @ ResolveError::NotFound { .. }) => {
                state.set_status(RunStatus::FailureMetadataLookup);
                state.push_cause(format!("metadata lookup failed: {err}"));
                if let Identifier::Doi(doi) = identifier {
                    // The fallback source only needs the DOI itself, so keep
                    // going with what the caller gave us.
                    self.reporter.record(
                        input,
                        Severity::Warning,
                        &format!(
                            "Metadata lookup failed ({err}); continuing with the literal DOI"
                        ),
                    );
                    Some(Resolution {
                        doi: Some(doi.clone()),
                        title: doi.replace(['/', '.'], "_"),
                        candidate_url: None,
                    })
                } else {
                    self.reporter.record(
                        input,
                        Severity::Error,
                        &format!("Metadata lookup failed: {err}"),
                    );
                    None
                }
            }
        }
    }

    /// Stage 2: the direct open-access URL from metadata.
    async fn direct_stage(
        &self,
        input: &str,
        candidate: &str,
        title: &str,
        state: &mut RunState,
    ) -> StageFlow {
        self.reporter.record(
            input,
            Severity::Info,
            &format!("Attempting direct open-access download: {candidate}"),
        );
        match self.fetcher.fetch(candidate).await {
            Ok(document) => {
                state.record_attempt(SourceKind::DirectOa, candidate, AttemptOutcome::Success);
                self.reporter.record(
                    input,
                    Severity::Success,
                    "Downloaded document from the direct open-access source",
                );
                StageFlow::Stop(self.store_document(input, title, &document, state).await)
            }
            Err(err) => {
                state.record_attempt(SourceKind::DirectOa, candidate, outcome_for(&err));
                state.push_cause(format!("direct download failed: {err}"));
                self.reporter.record(
                    input,
                    Severity::Warning,
                    &format!("Direct download failed: {err}. Trying the fallback source next"),
                );
                StageFlow::Continue
            }
        }
    }

    /// Stage 3: the rendered fallback source. Always terminal.
    async fn fallback_stage(
        &self,
        input: &str,
        doi: Option<&str>,
        title: &str,
        state: &mut RunState,
    ) -> Option<PathBuf> {
        let Some(doi) = doi else {
            state.set_status(RunStatus::FailureNoIdentifierForFallback);
            state.push_cause("no DOI available for the fallback source");
            self.reporter.record(
                input,
                Severity::Warning,
                "No document so far and no DOI available for the fallback source",
            );
            return None;
        };

        let page_url = self.fallback_page_url(doi);
        self.reporter.record(
            input,
            Severity::Info,
            &format!("Attempting fallback retrieval for DOI {doi} via {page_url}"),
        );

        let link = match self.extractor.extract(doi).await {
            Ok(link) => link,
            Err(err) => {
                match &err {
                    ExtractError::Unavailable { .. } => {
                        state.record_attempt(
                            SourceKind::Fallback,
                            &page_url,
                            AttemptOutcome::NotFound,
                        );
                        state.set_status(RunStatus::FailureFallbackNotFound);
                        self.reporter.record(
                            input,
                            Severity::Warning,
                            &format!("Fallback source has no copy: {err}"),
                        );
                    }
                    ExtractError::LinkNotFound { .. } => {
                        state.record_attempt(
                            SourceKind::Fallback,
                            &page_url,
                            AttemptOutcome::NotFound,
                        );
                        state.set_status(RunStatus::FailureFallbackError);
                        self.reporter.record(
                            input,
                            Severity::Error,
                            &format!("Fallback extraction failed: {err}"),
                        );
                    }
                    ExtractError::Automation { .. } => {
                        state.record_attempt(
                            SourceKind::Fallback,
                            &page_url,
                            AttemptOutcome::NetworkError,
                        );
                        state.set_status(RunStatus::FailureFallbackError);
                        self.reporter.record(
                            input,
                            Severity::Error,
                            &format!("Fallback automation failed: {err}"),
                        );
                    }
                }
                state.push_cause(err.to_string());
                return None;
            }
        };

        self.reporter.record(
            input,
            Severity::Info,
            &format!("Extracted embedded document link: {}", link.url),
        );
        match self
            .fetcher
            .fetch_with_session(&link.url, &link.cookies, Some(&self.config.fallback_base_url))
            .await
        {
            Ok(document) => {
                state.record_attempt(SourceKind::Fallback, &link.url, AttemptOutcome::Success);
                self.reporter.record(
                    input,
                    Severity::Success,
                    "Downloaded document from the fallback source",
                );
                self.store_document(input, title, &document, state).await
            }
            Err(err) => {
                state.record_attempt(SourceKind::Fallback, &link.url, outcome_for(&err));
                state.set_status(RunStatus::FailureFallbackError);
                state.push_cause(format!("fallback download failed: {err}"));
                self.reporter.record(
                    input,
                    Severity::Error,
                    &format!("Fallback download failed: {err}"),
                );
                None
            }
        }
    }

    /// Writes a retrieved document under a title-derived filename. `Success`
    /// is only set once the bytes are on disk.
    async fn store_document(
        &self,
        input: &str,
        title: &str,
        document: &Document,
        state: &mut RunState,
    ) -> Option<PathBuf> {
        let path = self.config.output_dir.join(title_filename(title));
        match tokio::fs::write(&path, document.bytes()).await {
            Ok(()) => {
                state.set_status(RunStatus::Success);
                let note = format!("Document successfully stored at: {}", path.display());
                state.set_message(note.clone());
                self.reporter.record(input, Severity::Success, &note);
                Some(path)
            }
            Err(err) => {
                state.set_status(RunStatus::FailureStoreDocument);
                state.push_cause(format!(
                    "could not store document at {}: {err}",
                    path.display()
                ));
                self.reporter.record(
                    input,
                    Severity::Error,
                    &format!("Could not store document at {}: {err}", path.display()),
                );
                None
            }
        }
    }

    /// Seals the run: builds the result, logs the terminal status, and
    /// appends the summary block.
    fn finish(
        &self,
        identifier: &Identifier,
        state: RunState,
        resolved_doi: Option<String>,
        title: String,
        stored_path: Option<PathBuf>,
    ) -> RunResult {
        let result = state.into_result(identifier.raw(), resolved_doi, title, stored_path);
        if result.is_success() {
            info!(status = %result.status, "Retrieval finished");
        } else {
            self.reporter.record(
                identifier.raw(),
                Severity::Error,
                &format!("Ultimately failed to retrieve a document (status {})", result.status),
            );
            warn!(status = %result.status, "Retrieval finished without a document");
        }
        self.reporter
            .summarize(&result.identifier_input, result.status, &result.message);
        result
    }

    /// The fallback page for a DOI; recorded on attempts when extraction
    /// fails before producing a document link.
    fn fallback_page_url(&self, doi: &str) -> String {
        let base = self
            .config
            .fallback_base_url
            .strip_suffix('/')
            .unwrap_or(&self.config.fallback_base_url);
        format!("{base}/{doi}")
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn outcome_for(err: &FetchError) -> AttemptOutcome {
    match err {
        FetchError::Network { .. } => AttemptOutcome::NetworkError,
        FetchError::ContentInvalid { .. } => AttemptOutcome::ContentInvalid,
    }
}

/// Result stood in for an item whose processing panicked.
fn synthetic_failure(identifier: &Identifier, message: String) -> RunResult {
    RunResult {
        identifier_input: identifier.raw().to_string(),
        resolved_doi: None,
        title: UNKNOWN_TITLE.to_string(),
        status: RunStatus::FailureUnexpected,
        attempts: Vec::new(),
        stored_path: None,
        message,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
