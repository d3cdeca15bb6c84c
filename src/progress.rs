//! Progress-callback trait for per-image and per-job analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline triages pages and dispatches model calls.
//!
//! # Example
//!
//! ```rust
//! use edgequake_insights::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, seq: usize, total: usize, response_len: usize) {
//!         let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("job {seq} ({done}/{total}): {response_len} chars");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = AnalysisConfig::builder()
//!     .progress_callback(cb as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the analysis pipeline as it works through a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_item_start`, `on_item_complete` and `on_item_error` fire from
/// concurrently running jobs. Protect shared mutable state with `Mutex` or
/// atomics.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once after extraction, before triage.
    ///
    /// # Arguments
    /// * `total_pages`  — pages in the document
    /// * `total_images` — embedded images found across all pages
    fn on_analysis_start(&self, total_pages: usize, total_images: usize) {
        let _ = (total_pages, total_images);
    }

    /// Called when a page has been through OCR, filter and detector.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number
    /// * `jobs`     — model calls this page contributes
    fn on_page_triaged(&self, page_num: usize, jobs: usize) {
        let _ = (page_num, jobs);
    }

    /// Called once triage is done and the number of model calls is known.
    fn on_dispatch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called just before a model call is sent.
    fn on_item_start(&self, seq: usize, total_jobs: usize) {
        let _ = (seq, total_jobs);
    }

    /// Called when a model call returned a response.
    ///
    /// # Arguments
    /// * `response_len` — byte length of the raw model response
    fn on_item_complete(&self, seq: usize, total_jobs: usize, response_len: usize) {
        let _ = (seq, total_jobs, response_len);
    }

    /// Called when a model call failed after all retries, or was cancelled.
    fn on_item_error(&self, seq: usize, total_jobs: usize, error: String) {
        let _ = (seq, total_jobs, error);
    }

    /// Called once after aggregation.
    ///
    /// # Arguments
    /// * `total_claims`      — claims in the report, quarantined ones included
    /// * `quarantined`       — error-marker claims
    fn on_analysis_complete(&self, total_claims: usize, quarantined: usize) {
        let _ = (total_claims, quarantined);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
