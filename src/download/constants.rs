//! Constants for the download module (timeouts, validation).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Budget for a full document download (60 seconds).
pub const DOCUMENT_TIMEOUT_SECS: u64 = 60;

/// How much of the body is inspected for the document signature when the
/// declared content-type is not a recognized document type.
pub const SIGNATURE_PROBE_BYTES: usize = 1024;

/// Leading bytes of a PDF document.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";
