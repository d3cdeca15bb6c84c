//! Document analysis entry points.
//!
//! [`analyze`] is the primary API: resolve the input, extract page elements,
//! triage every image (OCR → relevance filter → composite detector), dispatch
//! the surviving jobs to the model and aggregate the answers into a
//! [`DocumentReport`]. [`analyze_extraction`] runs the same core over an
//! already extracted document with injected OCR and model backends; it is
//! what the tests drive.

use crate::config::{AnalysisConfig, RenderFilterConfig};
use crate::document::{ExtractionResult, ImageElement, ImageRef, PageLayout};
use crate::error::{InsightsError, ItemError};
use crate::output::{DocumentReport, ExtractionStats, ReportMeta};
use crate::pipeline::aggregate::Aggregator;
use crate::pipeline::composite::{self, ChartCandidate};
use crate::pipeline::filter::{self, FilterDecision, FilterReason};
use crate::pipeline::llm::{self, AnalysisBackend, AnalysisKind, AnalysisRequest, LlmBackend};
use crate::pipeline::ocr::{OcrEngine, TesseractCli};
use crate::pipeline::{extract, input, report};
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default vision model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// `discard_reasons` key for images that could not be decoded.
pub const UNREADABLE_REASON: &str = "unreadable";

/// What happened to one image during triage.
#[derive(Debug, Clone, Serialize)]
pub struct ImageTriage {
    pub image_ref: ImageRef,
    pub filter: FilterDecision,
    /// `None` when the detector had nothing to go on: the image was too
    /// small or its OCR failed.
    pub candidate: Option<ChartCandidate>,
    pub dispatched: bool,
    /// Dispatched although the filter rejected it, because it is composite.
    pub rescued: bool,
}

/// Triage results for one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageTriage {
    pub page_number: usize,
    pub images: Vec<ImageTriage>,
    pub text_submitted: bool,
}

/// Triage of a whole document, before any model call.
#[derive(Debug, Clone)]
pub struct TriageResult {
    pub pages: Vec<PageTriage>,
    pub requests: Vec<AnalysisRequest>,
    pub stats: ExtractionStats,
}

/// Everything [`analyze`] produces.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub report: DocumentReport,
    pub triage: Vec<PageTriage>,
}

/// Paths written by [`analyze_to_files`].
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub log: PathBuf,
    pub digest: PathBuf,
}

impl OutputFiles {
    /// `<dir>/<stem>_analysis.ndjson` and `<dir>/insights-<stem>.md`.
    pub fn for_stem(dir: &Path, stem: &str) -> Self {
        Self {
            log: dir.join(format!("{stem}_analysis.ndjson")),
            digest: dir.join(format!("insights-{stem}.md")),
        }
    }
}

/// Analyse a PDF, slide deck or URL.
///
/// # Errors
/// Returns `Err(InsightsError)` only for fatal errors (input, extraction,
/// provider resolution). Failed images and model calls end up in the
/// report as quarantined claims or meta counters.
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, InsightsError> {
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // ── Step 2: Get/create provider ──────────────────────────────────────
    let (provider, model) = resolve_provider(config)?;
    let backend = LlmBackend::new(provider, config).with_model_name(model);

    // ── Step 3: Extract page elements ────────────────────────────────────
    let extraction = extract::extract_document(
        resolved.path(),
        config.password.as_deref(),
        resolved.file_name(),
        resolved.source(),
    )
    .await?;

    // ── Step 4: Triage, dispatch, aggregate ──────────────────────────────
    let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractCli::new(config.ocr_language.clone()));
    analyze_extraction(extraction, ocr, &backend, config).await
}

/// Run triage, dispatch and aggregation over an extracted document.
pub async fn analyze_extraction(
    extraction: ExtractionResult,
    ocr: Arc<dyn OcrEngine>,
    backend: &dyn AnalysisBackend,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, InsightsError> {
    let total_start = Instant::now();
    let ocr_engine = ocr.engine_name().to_string();

    let triage = triage_document(&extraction, ocr, config).await?;
    let TriageResult {
        pages,
        requests,
        stats,
    } = triage;

    let mut meta = ReportMeta::new(extraction.document);
    meta.model = backend.model_name();
    meta.ocr_engine = Some(ocr_engine);
    meta.extraction = stats;

    let outcomes = llm::dispatch_all(
        backend,
        requests,
        config.concurrency,
        config.cancel.as_ref(),
        config.progress_callback.as_ref(),
    )
    .await;

    let mut aggregator = Aggregator::new(meta, config.quarantine);
    aggregator.ingest_all(outcomes);
    let report = aggregator.finish();

    let counts = report.summary().counts;
    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(counts.total_claims, counts.quarantined);
    }
    info!(
        "Analysis complete: {} claims ({} findings, {} hypotheses, {} methodological notes) in {}ms",
        counts.total_claims,
        counts.findings,
        counts.hypotheses,
        counts.methodological_notes,
        total_start.elapsed().as_millis()
    );

    Ok(AnalysisOutput {
        report,
        triage: pages,
    })
}

/// OCR, filter and detect every image; build the job list.
///
/// Pages are handled in order. Within a page, OCR runs concurrently on the
/// blocking pool. Job `seq` numbers follow page order, images before the
/// page's text job.
pub async fn triage_document(
    extraction: &ExtractionResult,
    ocr: Arc<dyn OcrEngine>,
    config: &AnalysisConfig,
) -> Result<TriageResult, InsightsError> {
    let mut stats = ExtractionStats {
        total_pages: extraction.pages.len(),
        images_extracted: extraction.image_count(),
        ..Default::default()
    };
    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_start(stats.total_pages, stats.images_extracted);
    }

    let mut pages = Vec::with_capacity(extraction.pages.len());
    let mut requests = Vec::new();

    for page in &extraction.pages {
        for image_ref in &page.unreadable_images {
            warn!("{}: unreadable, not analysed", image_ref);
            stats.images_unreadable += 1;
            *stats
                .discard_reasons
                .entry(UNREADABLE_REASON.to_string())
                .or_insert(0) += 1;
        }
        if page.text_layer_unreadable {
            stats.text_layers_unreadable += 1;
        }
        let jobs_before = requests.len();
        let page_triage = triage_page(page, Arc::clone(&ocr), config, &mut stats, &mut requests).await?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_triaged(page.page_number, requests.len() - jobs_before);
        }
        pages.push(page_triage);
    }

    stats.items_submitted = requests.len();
    info!(
        "Triage: {} of {} images kept, {} rescued, {} composite, {} unreadable, {} jobs",
        stats.images_kept,
        stats.images_extracted,
        stats.images_rescued,
        stats.composites_detected,
        stats.images_unreadable,
        stats.items_submitted
    );

    Ok(TriageResult {
        pages,
        requests,
        stats,
    })
}

async fn triage_page(
    page: &PageLayout,
    ocr: Arc<dyn OcrEngine>,
    config: &AnalysisConfig,
    stats: &mut ExtractionStats,
    requests: &mut Vec<AnalysisRequest>,
) -> Result<PageTriage, InsightsError> {
    let images: Vec<&ImageElement> = page.images().collect();

    // Dimension gate first; only the rest pays for OCR.
    let gated: Vec<Option<FilterDecision>> = images
        .iter()
        .map(|img| filter::check_dimensions(img, &config.filter))
        .collect();

    let ocr_jobs = images
        .iter()
        .zip(&gated)
        .filter(|(_, gate)| gate.is_none())
        .map(|(img, _)| {
            let engine = Arc::clone(&ocr);
            let image = (*img).clone();
            async move {
                let image_ref = image.image_ref;
                let result = tokio::task::spawn_blocking(move || engine.recognize(&image))
                    .await
                    .unwrap_or_else(|e| {
                        Err(ItemError::OcrFailed {
                            detail: format!("OCR task panicked: {e}"),
                        })
                    });
                (image_ref, result)
            }
        });
    let ocr_results: HashMap<ImageRef, Result<String, ItemError>> =
        futures::future::join_all(ocr_jobs).await.into_iter().collect();

    let ocr_texts: HashMap<ImageRef, String> = ocr_results
        .iter()
        .filter_map(|(r, res)| res.as_ref().ok().map(|t| (*r, t.clone())))
        .collect();
    let candidates = composite::detect_page(page, &ocr_texts, &config.detector);

    let mut triaged = Vec::with_capacity(images.len());
    for ((image, gate), candidate) in images.iter().zip(gated).zip(candidates) {
        let decision = match gate {
            Some(decision) => decision,
            None => {
                let ocr = ocr_results.get(&image.image_ref).ok_or_else(|| {
                    InsightsError::Internal(format!("no OCR result for {}", image.image_ref))
                })?;
                if let Err(e) = ocr {
                    warn!("{}: {}", image.image_ref, e);
                }
                filter::evaluate(image.image_ref, ocr.as_deref(), &config.filter)
            }
        };

        match decision.reason {
            FilterReason::Passed => stats.images_kept += 1,
            FilterReason::OcrFailed => stats.images_ocr_failed += 1,
            _ => stats.images_decorative += 1,
        }
        if !decision.kept {
            *stats
                .discard_reasons
                .entry(decision.reason.to_string())
                .or_insert(0) += 1;
        }

        // Too small or unreadable: the detector had nothing real to go on.
        let gated_out = matches!(
            decision.reason,
            FilterReason::TooSmall | FilterReason::OcrFailed
        );
        if candidate.composite && !gated_out {
            stats.composites_detected += 1;
        }
        let rescued = !decision.kept
            && config.rescue_composites
            && candidate.composite
            && decision.reason.is_content_rejection();
        if rescued {
            stats.images_rescued += 1;
        }
        let dispatched = decision.kept || rescued;

        debug!(
            "{}: {} (composite: {}, note: {:?}){}",
            image.image_ref,
            decision.reason,
            candidate.composite,
            candidate.diagnostics.note,
            if rescued { " → rescued" } else { "" }
        );

        if dispatched {
            requests.push(AnalysisRequest {
                seq: requests.len(),
                page_number: page.page_number,
                image_ref: Some(image.image_ref),
                kind: AnalysisKind::Chart {
                    png: Arc::new(image.data.clone()),
                    nearby_text: candidate.nearby_text.clone(),
                    composite: candidate.composite,
                },
            });
        }

        triaged.push(ImageTriage {
            image_ref: image.image_ref,
            filter: decision,
            candidate: (!gated_out).then_some(candidate),
            dispatched,
            rescued,
        });
    }

    let mut text_submitted = false;
    if config.analyze_page_text {
        let text = page.full_text();
        if !text.is_empty() {
            requests.push(AnalysisRequest {
                seq: requests.len(),
                page_number: page.page_number,
                image_ref: None,
                kind: AnalysisKind::PageText { text },
            });
            stats.text_pages_submitted += 1;
            text_submitted = true;
        }
    }

    Ok(PageTriage {
        page_number: page.page_number,
        images: triaged,
        text_submitted,
    })
}

/// Analyse a document and write the structured log and the digest.
///
/// Both files are written atomically (temp file + rename) into `output_dir`.
pub async fn analyze_to_files(
    input_str: impl AsRef<str>,
    output_dir: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<(AnalysisOutput, OutputFiles), InsightsError> {
    let output = analyze(input_str, config).await?;
    let files = write_outputs(&output.report, output_dir.as_ref(), config).await?;
    Ok((output, files))
}

/// Write the log and digest for an existing report.
pub async fn write_outputs(
    report: &DocumentReport,
    output_dir: &Path,
    config: &AnalysisConfig,
) -> Result<OutputFiles, InsightsError> {
    let stem = Path::new(&report.meta.document.file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    let files = OutputFiles::for_stem(output_dir, stem);

    report::write_log(report, &files.log).await?;
    report::write_digest(report, &config.render, &files.digest).await?;
    info!(
        "Wrote {} and {}",
        files.log.display(),
        files.digest.display()
    );
    Ok(files)
}

/// Re-render a digest from a log written earlier, without calling the model.
pub async fn render_from_log(
    log_path: impl AsRef<Path>,
    digest_path: impl AsRef<Path>,
    render: &RenderFilterConfig,
) -> Result<DocumentReport, InsightsError> {
    let report = report::read_log(log_path.as_ref()).await?;
    report::write_digest(&report, render, digest_path.as_ref()).await?;
    Ok(report)
}

/// Triage a document without calling the model.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<TriageResult, InsightsError> {
    let input_str = input_str.as_ref();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let extraction = extract::extract_document(
        resolved.path(),
        config.password.as_deref(),
        resolved.file_name(),
        resolved.source(),
    )
    .await?;
    let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractCli::new(config.ocr_language.clone()));
    triage_document(&extraction, ocr, config).await
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, InsightsError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InsightsError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, InsightsError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InsightsError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), built through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// Returns the provider and the model label recorded in the report.
pub fn resolve_provider(
    config: &AnalysisConfig,
) -> Result<(Arc<dyn LLMProvider>, Option<String>), InsightsError> {
    if let Some(ref provider) = config.provider {
        return Ok((Arc::clone(provider), config.model.clone()));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return Ok((create_vision_provider(name, model)?, Some(model.to_string())));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return Ok((create_vision_provider(&prov, &model)?, Some(model)));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return Ok((
                create_vision_provider("openai", model)?,
                Some(model.to_string()),
            ));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InsightsError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok((llm_provider, config.model.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_file_names() {
        let files = OutputFiles::for_stem(Path::new("out"), "study_2024");
        assert_eq!(files.log, Path::new("out/study_2024_analysis.ndjson"));
        assert_eq!(files.digest, Path::new("out/insights-study_2024.md"));
    }
}
