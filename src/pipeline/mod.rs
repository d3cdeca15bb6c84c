//! Pipeline stages for chart and page-text analysis.
//!
//! Each submodule implements exactly one transformation step and is
//! independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ ocr ──▶ filter ──▶ composite ──▶ llm ──▶ aggregate ──▶ report
//! (URL/path/  (pdfium)   (tesseract) (relevance) (text pairing) (VLM)  (claims)    (log + digest)
//!  slides)
//! ```
//!
//! 1. [`input`]     — canonicalise the path or URL to a local PDF, converting
//!    slide decks with LibreOffice
//! 2. [`extract`]   — walk every page for images and positioned text; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`ocr`]       — read each image's text through the [`ocr::OcrEngine`] seam
//! 4. [`filter`]    — drop decorative images (pure)
//! 5. [`composite`] — pair charts with values printed in the text layer (pure)
//! 6. [`llm`]       — bounded-concurrency model calls with retry/backoff
//! 7. [`postprocess`] — recover the JSON object from the model's answer
//! 8. [`aggregate`] — validate, default and number the claims
//! 9. [`report`]    — NDJSON log and Markdown digest
//!
//! [`encode`] holds the PNG/base64 helpers shared by `extract` and `llm`.

pub mod aggregate;
pub mod composite;
pub mod encode;
pub mod extract;
pub mod filter;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod report;
