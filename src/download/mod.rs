//! Document fetching and validation.
//!
//! This module downloads candidate URLs and verifies the response is a real
//! document before any bytes reach disk.
//!
//! # Features
//!
//! - Browser-like request identity (user agent, accept header)
//! - Session cookie and referer support for fallback fetches
//! - Content validation: declared document types pass, everything else must
//!   show a PDF signature in the first kilobyte
//! - Streaming download with early abort on invalid content
//! - Title-derived filenames safe for common filesystems
//!
//! # Example
//!
//! ```no_run
//! use paperfetch_core::download::{DocumentFetcher, title_filename};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = DocumentFetcher::new();
//! let document = fetcher
//!     .fetch("https://example.com/paper.pdf")
//!     .await?;
//! tokio::fs::write(title_filename("My Paper"), document.bytes()).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod filename;

pub use client::{Document, DocumentFetcher, SessionCookie};
pub use error::FetchError;
pub use filename::title_filename;
