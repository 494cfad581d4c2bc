//! Paperfetch Core Library
//!
//! This library resolves scholarly-work identifiers (DOIs, titles, URLs) to
//! canonical metadata and retrieves the full-text document, trying the
//! direct open-access copy first and falling back to a browser-rendered
//! source when there is none.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`identifier`] - Typed input identifiers
//! - [`resolver`] - Metadata resolution against the `OpenAlex` works API
//! - [`download`] - Document fetching and content validation
//! - [`scrape`] - Rendered-page link extraction via WebDriver
//! - [`pipeline`] - The retrieval orchestrator and batch runner
//! - [`report`] - Append-only event log and run summary

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod identifier;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod scrape;
mod user_agent;

// Re-export commonly used types
pub use download::{Document, DocumentFetcher, FetchError, SessionCookie, title_filename};
pub use identifier::Identifier;
pub use pipeline::{
    AttemptOutcome, Pipeline, PipelineConfig, RetrievalAttempt, RunResult, RunStatus, SourceKind,
};
pub use report::{RunReporter, Severity};
pub use resolver::{MetadataRecord, MetadataResolver, ResolveError};
pub use scrape::{ExtractError, ExtractedLink, PageExtractor, WebDriverExtractor};
