//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use paperfetch_core::pipeline::DEFAULT_FALLBACK_BASE_URL;
use paperfetch_core::scrape::DEFAULT_WEBDRIVER_ENDPOINT;

/// Resolve scholarly identifiers and retrieve full-text documents.
///
/// Paperfetch resolves a DOI, title, or landing-page URL to metadata, tries
/// the direct open-access copy first, and falls back to a browser-rendered
/// source when there is none.
#[derive(Parser, Debug)]
#[command(name = "paperfetch")]
#[command(author, version, about)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["doi", "title", "url", "input_file"]),
))]
pub struct Args {
    /// DOI to retrieve (bare or as a doi.org URL)
    #[arg(short, long)]
    pub doi: Option<String>,

    /// Article title to search for
    #[arg(short, long)]
    pub title: Option<String>,

    /// Landing-page or document URL containing a DOI
    #[arg(short, long)]
    pub url: Option<String>,

    /// File with one identifier per line for batch processing
    #[arg(short, long)]
    pub input_file: Option<PathBuf>,

    /// Directory documents and run reports are written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Seconds to pause between batch items (0 to disable)
    #[arg(long, default_value_t = 0)]
    pub delay: u64,

    /// Base URL of the rendered fallback source
    #[arg(long, env = "SCI_HUB_URL", default_value = DEFAULT_FALLBACK_BASE_URL)]
    pub fallback_url: String,

    /// WebDriver endpoint driving the fallback browser
    #[arg(long, default_value = DEFAULT_WEBDRIVER_ENDPOINT)]
    pub webdriver_url: String,

    /// Run the fallback browser without a visible window
    #[arg(long)]
    pub headless: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
