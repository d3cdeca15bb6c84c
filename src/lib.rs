//! # edgequake-insights
//!
//! Turn the charts in PDF reports and slide decks into classified, auditable
//! claims using OCR triage and Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Research reports carry their evidence in charts, and charts are mostly
//! pixels. Sending every image of a 60-page deck to a VLM is slow and costs
//! money on logos and photos. This crate reads each image with OCR first,
//! keeps only those that look like data, pairs charts with the numbers the
//! page prints around them, and asks the model for structured claims that
//! are then validated, numbered and rendered twice: a complete NDJSON log
//! for audit and a filtered Markdown digest for reading.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PPTX / URL
//!  │
//!  ├─ 1. Input      resolve local file, download URL, convert slides (LibreOffice)
//!  ├─ 2. Extract    images + positioned text per page via pdfium (spawn_blocking)
//!  ├─ 3. Triage     OCR → relevance filter → composite-chart detector
//!  ├─ 4. VLM        concurrent calls, one per chart (and per page text if enabled)
//!  ├─ 5. Aggregate  validate, default, number claims C001…; quarantine failures
//!  └─ 6. Render     NDJSON log (everything) + Markdown digest (filtered)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_insights::{analyze_to_files, AnalysisConfig, InsightFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = AnalysisConfig::builder()
//!         .insight_filter(InsightFilter::Findings)
//!         .relevance_threshold(0.6)
//!         .build()?;
//!     let (output, files) = analyze_to_files("survey.pdf", "out", &config).await?;
//!     eprintln!("{} claims → {}", output.report.claims.len(), files.digest.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2insights` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! * `tesseract` on `PATH` for OCR (language packs for `spa+eng` by default)
//! * `soffice` (LibreOffice) for `.pptx`/`.ppt`/`.odp`/`.docx` input
//! * a pdfium shared library (`PDFIUM_LIB_PATH`, next to the executable, or system-wide)

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_extraction, analyze_sync, analyze_to_files, inspect, render_from_log,
    resolve_provider, triage_document, write_outputs, AnalysisOutput, ImageTriage, OutputFiles,
    PageTriage, TriageResult, DEFAULT_MODEL,
};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, ConfigFile, DetectorConfig, FilterConfig,
    InsightFilter, QuarantinePolicy, RenderFilterConfig, StraddlePolicy,
};
pub use document::{
    BoundingBox, DocumentInfo, ExtractionResult, ImageElement, ImageRef, PageElement, PageLayout,
    TextBlockElement,
};
pub use error::{InsightsError, ItemError};
pub use output::{
    Claim, ClaimSource, Classification, ClassificationCounts, DataType, DocumentReport, Evidence,
    ExtractionStats, ReportMeta, ReportSummary,
};
pub use pipeline::llm::{AnalysisBackend, AnalysisKind, AnalysisRequest, CancelFlag};
pub use pipeline::ocr::{OcrEngine, TesseractCli};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
