//! Error types for the edgequake-insights library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InsightsError`] — **Fatal**: the run cannot start or cannot finish at
//!   all (bad input file, misconfigured thresholds, provider not configured,
//!   output not writable). Returned as `Err(InsightsError)` from the top-level
//!   `analyze*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: one image or one model call failed (OCR
//!   crashed, the model timed out or returned garbage) but every other item
//!   is fine. Handed to the aggregator, which records it as a quarantined
//!   claim so the omission stays visible in the log.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-insights library.
#[derive(Debug, Error)]
pub enum InsightsError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The file extension is neither PDF nor a convertible office format.
    #[error("Unsupported document format '{extension}' for '{path}'\nSupported: pdf, ppt, pptx, odp, doc, docx")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// LibreOffice could not convert a slide deck or document to PDF.
    #[error("Could not convert '{path}' to PDF: {detail}\nInstall LibreOffice or convert the file manually.")]
    ConversionFailed { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or config-file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The JSON configuration file could not be read or parsed.
    #[error("Failed to load configuration '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A structured log could not be read back.
    #[error("Invalid analysis log at line {line}: {detail}")]
    LogParse { line: usize, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image or model call.
///
/// Serialisable: it is the `error` of the quarantined claim that stands in
/// for the lost item in the structured log.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    /// The OCR engine could not read the image.
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    /// The model call failed after all retries.
    #[error("LLM call failed after {retries} retries: {detail}")]
    LlmFailed { retries: u32, detail: String },

    /// The model call did not answer in time.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered but the answer is not the expected structure.
    #[error("Malformed model output: {detail}")]
    MalformedOutput { detail: String },

    /// The run was cancelled before this item was dispatched.
    #[error("Cancelled before dispatch")]
    Cancelled,
}
