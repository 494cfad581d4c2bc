//! Run outcome types: attempt records, final statuses, and the per-run
//! bookkeeping that enforces the status and message rules.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};

/// Where a retrieval attempt was aimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A direct open-access URL from resolved metadata.
    DirectOa,
    /// The rendered fallback source.
    Fallback,
}

/// How a single retrieval attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// The response was not a usable document.
    ContentInvalid,
    /// Transport failure or an HTTP error status.
    NetworkError,
    /// The source explicitly had no copy.
    NotFound,
}

/// One dated try against one source.
#[derive(Debug, Clone)]
pub struct RetrievalAttempt {
    pub source: SourceKind,
    /// The URL the attempt was made against. For extraction failures this is
    /// the fallback page, not a document URL.
    pub url: String,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Local>,
}

/// Final classification of one processed identifier.
///
/// Closed set: every run ends in exactly one of these and callers can match
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// A document was stored.
    Success,
    /// The identifier input itself was unusable.
    FailureInputError,
    /// Metadata lookup failed and nothing further was possible.
    FailureMetadataLookup,
    /// The fallback source explicitly has no copy.
    FailureFallbackNotFound,
    /// The fallback stage failed for any other reason.
    FailureFallbackError,
    /// No DOI was available to drive the fallback source.
    FailureNoIdentifierForFallback,
    /// A document was retrieved but could not be written to disk.
    FailureStoreDocument,
    /// The run aborted in a way the policy does not classify, like a panic
    /// caught by the batch guard.
    FailureUnexpected,
}

impl RunStatus {
    /// Stable uppercase form used in log messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::FailureInputError => "FAILURE_INPUT_ERROR",
            Self::FailureMetadataLookup => "FAILURE_METADATA_LOOKUP",
            Self::FailureFallbackNotFound => "FAILURE_FALLBACK_NOT_FOUND",
            Self::FailureFallbackError => "FAILURE_FALLBACK_ERROR",
            Self::FailureNoIdentifierForFallback => "FAILURE_NO_IDENTIFIER_FOR_FALLBACK",
            Self::FailureStoreDocument => "FAILURE_STORE_DOCUMENT",
            Self::FailureUnexpected => "FAILURE_UNEXPECTED",
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one processed identifier.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The identifier exactly as given.
    pub identifier_input: String,
    /// Canonical DOI, when one was resolved or adopted from the input.
    pub resolved_doi: Option<String>,
    /// Display title; placeholder-derived when metadata was unavailable.
    pub title: String,
    pub status: RunStatus,
    /// Every try in order, direct open access before fallback.
    pub attempts: Vec<RetrievalAttempt>,
    /// Where the document was written, on success.
    pub stored_path: Option<PathBuf>,
    /// Cause chain joined by `" | "`; on success, the storage note.
    pub message: String,
}

impl RunResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Mutable bookkeeping for one run.
///
/// All status and message mutation funnels through here so the rules live in
/// one place: success is terminal, causes accumulate, attempts keep order.
#[derive(Debug)]
pub(crate) struct RunState {
    status: Option<RunStatus>,
    message: String,
    attempts: Vec<RetrievalAttempt>,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self {
            status: None,
            message: String::new(),
            attempts: Vec::new(),
        }
    }

    /// Applies a status. `Success` is terminal; anything else may be
    /// superseded by a later stage.
    pub(crate) fn set_status(&mut self, status: RunStatus) {
        if self.status == Some(RunStatus::Success) {
            return;
        }
        self.status = Some(status);
    }

    /// Appends one cause to the chain.
    pub(crate) fn push_cause(&mut self, cause: impl Into<String>) {
        let cause = cause.into();
        if self.message.is_empty() {
            self.message = cause;
        } else {
            self.message.push_str(" | ");
            self.message.push_str(&cause);
        }
    }

    /// Replaces the whole chain. Used when a stored document makes the
    /// earlier causes moot.
    pub(crate) fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub(crate) fn record_attempt(
        &mut self,
        source: SourceKind,
        url: impl Into<String>,
        outcome: AttemptOutcome,
    ) {
        self.attempts.push(RetrievalAttempt {
            source,
            url: url.into(),
            outcome,
            at: Local::now(),
        });
    }

    pub(crate) fn into_result(
        self,
        identifier_input: impl Into<String>,
        resolved_doi: Option<String>,
        title: impl Into<String>,
        stored_path: Option<PathBuf>,
    ) -> RunResult {
        RunResult {
            identifier_input: identifier_input.into(),
            resolved_doi,
            title: title.into(),
            // A run that recorded no status at all is unexpected by
            // definition; intermediate states never leak out.
            status: self.status.unwrap_or(RunStatus::FailureUnexpected),
            attempts: self.attempts,
            stored_path,
            message: self.message,
        }
    }
}
