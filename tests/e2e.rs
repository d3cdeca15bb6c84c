//! End-to-end integration tests for edgequake-insights.
//!
//! These tests use real documents in `./test_cases/`, the system `tesseract`
//! binary, a pdfium library and live LLM API calls. They are gated behind
//! the `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 DYLD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_inspect -- --nocapture

use edgequake_insights::pipeline::report::parse_log;
use edgequake_insights::{
    analyze, analyze_to_files, inspect, AnalysisConfig, AnalysisProgressCallback,
    InsightFilter, InsightsError, NoopProgressCallback, TesseractCli,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no document at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        if !TesseractCli::new("eng").is_available() {
            println!("SKIP — tesseract is not installed");
            return;
        }
        p
    }};
}

// ── Triage tests (no LLM) ────────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_survey_report() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("survey_report.pdf"));

    let config = AnalysisConfig::default();
    let triage = inspect(path.to_str().unwrap(), &config)
        .await
        .expect("inspect() should succeed");

    let s = &triage.stats;
    assert!(s.total_pages > 0);
    assert_eq!(
        s.images_kept + s.images_decorative + s.images_ocr_failed + s.images_unreadable,
        s.images_extracted,
        "every image gets exactly one filter verdict"
    );
    assert_eq!(triage.requests.len(), s.items_submitted);

    for page in &triage.pages {
        for img in &page.images {
            println!(
                "{:<10} {:<14} composite={} dispatched={}",
                img.image_ref.to_string(),
                img.filter.reason.as_str(),
                img.candidate.as_ref().is_some_and(|c| c.composite),
                img.dispatched
            );
        }
    }
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let result = inspect("/definitely/not/a/real/file.pdf", &AnalysisConfig::default()).await;
    assert!(
        matches!(result, Err(InsightsError::FileNotFound { .. })),
        "inspect() should return FileNotFound for a missing file"
    );
}

// ── Analysis tests (need LLM API) ────────────────────────────────────────────

/// Full run on a survey report: claims are numbered, validated and rendered.
#[tokio::test]
async fn test_analyze_survey_report() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("survey_report.pdf"));

    let config = AnalysisConfig::builder()
        .max_retries(2)
        .concurrency(4)
        .build()
        .expect("valid config");

    let (output, files) = analyze_to_files(path.to_str().unwrap(), output_dir(), &config)
        .await
        .expect("analysis should succeed");

    let claims = &output.report.claims;
    for (i, claim) in claims.iter().enumerate() {
        assert_eq!(claim.id, format!("C{:03}", i + 1));
        assert!((0.0..=1.0).contains(&claim.relevance_score));
        assert!(claim.page_number >= 1);
    }

    let log = std::fs::read_to_string(&files.log).expect("log written");
    let back = parse_log(&log).expect("log parses");
    assert_eq!(back.claims.len(), claims.len(), "log holds every claim");

    let digest = std::fs::read_to_string(&files.digest).expect("digest written");
    assert!(digest.starts_with("# Insights: "));

    println!("[survey] {} claims → {}", claims.len(), files.digest.display());
    println!("--- BEGIN DIGEST ---\n{digest}\n--- END DIGEST ---");
}

/// Slide decks go through LibreOffice first.
#[tokio::test]
async fn test_analyze_slide_deck() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("results_deck.pptx"));

    let config = AnalysisConfig::builder()
        .insight_filter(InsightFilter::All)
        .build()
        .expect("valid config");

    match analyze(path.to_str().unwrap(), &config).await {
        Ok(output) => {
            assert_eq!(output.report.meta.document.file_name, "results_deck.pptx");
            println!("[deck] {} claims", output.report.claims.len());
        }
        Err(InsightsError::ConversionFailed { detail, .. }) => {
            println!("SKIP — LibreOffice not available: {detail}");
        }
        Err(e) => panic!("unexpected error: {e}"),
    }
}

// ── Structural tests (no API calls, always run) ──────────────────────────────

/// Verify that a Noop callback compiles, is Send + Sync and can move into a
/// spawned task.
#[tokio::test]
async fn test_noop_callback_in_tokio_spawn() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();

    let cb: Arc<dyn AnalysisProgressCallback> = Arc::new(NoopProgressCallback);
    tokio::spawn(async move {
        cb.on_item_error(2, 5, "timeout after 3 retries".to_string());
    })
    .await
    .expect("spawn must succeed");
}

#[test]
fn test_config_builder_accepts_provider_name() {
    let config = AnalysisConfig::builder()
        .provider_name("mistral")
        .model("pixtral-12b-2409")
        .build()
        .expect("config with provider name should build");
    assert_eq!(config.provider_name.as_deref(), Some("mistral"));
    assert_eq!(config.model.as_deref(), Some("pixtral-12b-2409"));
}
