//! Whole-pipeline tests over an in-memory document.
//!
//! No pdfium, no tesseract, no network: pages are built by hand, OCR and the
//! model are scripted. The fixture has three pages:
//!
//! | image   | size    | OCR                  | expected                        |
//! |---------|---------|----------------------|---------------------------------|
//! | p1-img0 | 300×200 | "Ventas"             | too_short, composite → rescued  |
//! | p1-img1 | 50×50   | (never called)       | too_small                       |
//! | p1-img2 | 400×300 | chart with numbers   | passed                          |
//! | p2-img0 | 300×300 | error                | ocr_failed                      |
//! | p3-img0 | 600×120 | "ACME"               | too_short                       |

use edgequake_insights::pipeline::composite::DetectorNote;
use edgequake_insights::pipeline::report::{parse_log, render_log};
use edgequake_insights::{
    analyze_extraction, render_from_log, triage_document, write_outputs, AnalysisBackend,
    AnalysisConfig, AnalysisKind, AnalysisRequest, BoundingBox, CancelFlag, Classification,
    DocumentInfo, ExtractionResult, ImageElement, ImageRef, InsightFilter, ItemError, OcrEngine,
    PageElement, PageLayout, QuarantinePolicy, RenderFilterConfig, TextBlockElement,
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fixture ──────────────────────────────────────────────────────────────

fn image(page: usize, index: usize, bbox: BoundingBox, w: u32, h: u32) -> PageElement {
    PageElement::Image(ImageElement {
        image_ref: ImageRef {
            page_number: page,
            index,
        },
        page_number: page,
        bounding_box: bbox,
        width_px: w,
        height_px: h,
        data: vec![0x89, b'P', b'N', b'G'],
    })
}

fn text(page: usize, bbox: BoundingBox, s: &str) -> PageElement {
    PageElement::Text(TextBlockElement {
        page_number: page,
        bounding_box: bbox,
        text: s.to_string(),
    })
}

fn r(page: usize, index: usize) -> ImageRef {
    ImageRef {
        page_number: page,
        index,
    }
}

fn document() -> ExtractionResult {
    let mut p1 = PageLayout::new(1, 800.0, 600.0);
    p1.elements = vec![
        image(1, 0, BoundingBox::new(100.0, 100.0, 400.0, 300.0), 300, 200),
        text(1, BoundingBox::new(410.0, 150.0, 500.0, 170.0), "26% 10% 23%"),
        image(1, 1, BoundingBox::new(700.0, 20.0, 750.0, 70.0), 50, 50),
        image(1, 2, BoundingBox::new(100.0, 350.0, 500.0, 575.0), 400, 300),
    ];

    let mut p2 = PageLayout::new(2, 800.0, 600.0);
    p2.elements = vec![
        image(2, 0, BoundingBox::new(0.0, 0.0, 300.0, 300.0), 300, 300),
        text(
            2,
            BoundingBox::new(400.0, 400.0, 700.0, 420.0),
            "Metodología: encuesta online, N=1260",
        ),
    ];

    let mut p3 = PageLayout::new(3, 800.0, 600.0);
    p3.elements = vec![image(3, 0, BoundingBox::new(100.0, 20.0, 700.0, 140.0), 600, 120)];

    ExtractionResult {
        document: DocumentInfo {
            file_name: "encuesta_2024.pdf".into(),
            source: "encuesta_2024.pdf".into(),
            page_count: 3,
            title: Some("Encuesta de satisfacción 2024".into()),
            ..Default::default()
        },
        pages: vec![p1, p2, p3],
    }
}

/// OCR answers from a table and records which images it was asked about.
struct ScriptedOcr {
    answers: HashMap<ImageRef, Result<String, ItemError>>,
    calls: Mutex<Vec<ImageRef>>,
}

impl ScriptedOcr {
    fn with_answers(answers: HashMap<ImageRef, Result<String, ItemError>>) -> Arc<Self> {
        Arc::new(Self {
            answers,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn new() -> Arc<Self> {
        Self::with_answers(HashMap::from([
                (r(1, 0), Ok("Ventas".to_string())),
                (
                    r(1, 2),
                    Ok("Satisfacción del cliente 2023 vs 2024: 78% 85%".to_string()),
                ),
                (
                    r(2, 0),
                    Err(ItemError::OcrFailed {
                        detail: "tesseract exited with status 1".into(),
                    }),
                ),
                (r(3, 0), Ok("ACME".to_string())),
            ]))
    }

    fn calls(&self) -> Vec<ImageRef> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, image: &ImageElement) -> Result<String, ItemError> {
        self.calls.lock().unwrap().push(image.image_ref);
        self.answers
            .get(&image.image_ref)
            .cloned()
            .unwrap_or_else(|| Ok(String::new()))
    }

    fn engine_name(&self) -> &str {
        "scripted"
    }
}

const RESCUED_CHART: &str = r#"```json
{
  "chart_type": "bar",
  "title": "Ventas por trimestre",
  "relevance_score": 0.7,
  "claims": [
    {"text": "Las ventas crecieron un 26% en Q1", "classification": "finding",
     "sample_size": 1260, "relevance_score": 0.85, "theme_tags": ["ventas"]},
    {"text": "El crecimiento puede deberse a la estacionalidad", "classification": "hypothesis"}
  ]
}
```"#;

const KEPT_CHART: &str = r#"{
  "chart_type": "line",
  "claims": [
    {"text": "La pregunta de satisfacción cambió de escala en 2024",
     "classification": "methodological_note", "relevance_score": 0.9},
    {"text": "Los clientes están más satisfechos", "sample_size": null}
  ]
}"#;

/// Answers per job label after a per-label delay; records every request.
struct ScriptedBackend {
    answers: HashMap<String, (u64, Result<String, ItemError>)>,
    requests: Mutex<Vec<AnalysisRequest>>,
    calls: AtomicUsize,
}

fn label(request: &AnalysisRequest) -> String {
    request
        .image_ref
        .map(|r| r.to_string())
        .unwrap_or_else(|| format!("p{}-text", request.page_number))
}

impl ScriptedBackend {
    fn new() -> Self {
        Self {
            answers: HashMap::from([
                // The first job finishes last.
                ("p1-img0".to_string(), (80, Ok(RESCUED_CHART.to_string()))),
                ("p1-img2".to_string(), (0, Ok(KEPT_CHART.to_string()))),
                (
                    "p2-text".to_string(),
                    (10, Ok("Sorry, I cannot read this page.".to_string())),
                ),
            ]),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl AnalysisBackend for ScriptedBackend {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<String, ItemError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = label(&request);
            self.requests.lock().unwrap().push(request);
            let (delay, answer) = self
                .answers
                .get(&key)
                .cloned()
                .unwrap_or((0, Ok("{\"claims\": []}".to_string())));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            answer
        })
    }

    fn model_name(&self) -> Option<String> {
        Some("scripted-vlm".to_string())
    }
}

fn config() -> AnalysisConfig {
    AnalysisConfig::builder().concurrency(4).build().unwrap()
}

// ── Triage ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn triage_counts_and_rescues() {
    let ocr = ScriptedOcr::new();
    let triage = triage_document(&document(), ocr.clone(), &config())
        .await
        .unwrap();

    // The 50×50 icon never reaches OCR.
    assert_eq!(ocr.calls(), vec![r(1, 0), r(1, 2), r(2, 0), r(3, 0)]);

    let s = &triage.stats;
    assert_eq!(s.total_pages, 3);
    assert_eq!(s.images_extracted, 5);
    assert_eq!(s.images_kept, 1);
    assert_eq!(s.images_rescued, 1);
    assert_eq!(s.images_decorative, 3);
    assert_eq!(s.images_ocr_failed, 1);
    assert_eq!(s.composites_detected, 1);
    assert_eq!(s.discard_reasons.get("too_short"), Some(&2));
    assert_eq!(s.discard_reasons.get("too_small"), Some(&1));
    assert_eq!(s.discard_reasons.get("ocr_failed"), Some(&1));
    assert_eq!(s.items_submitted, 2);
    assert_eq!(s.text_pages_submitted, 0);

    let seqs: Vec<(usize, Option<ImageRef>)> = triage
        .requests
        .iter()
        .map(|r| (r.seq, r.image_ref))
        .collect();
    assert_eq!(seqs, vec![(0, Some(r(1, 0))), (1, Some(r(1, 2)))]);

    match &triage.requests[0].kind {
        AnalysisKind::Chart {
            nearby_text,
            composite,
            ..
        } => {
            assert!(*composite);
            assert_eq!(nearby_text.as_deref(), Some("26% 10% 23%"));
        }
        other => panic!("expected a chart job, got {other:?}"),
    }
    match &triage.requests[1].kind {
        AnalysisKind::Chart {
            nearby_text,
            composite,
            ..
        } => {
            assert!(!*composite);
            assert!(nearby_text.is_none());
        }
        other => panic!("expected a chart job, got {other:?}"),
    }

    let p1 = &triage.pages[0];
    assert!(p1.images[0].rescued);
    assert!(p1.images[0].dispatched);
    assert!(p1.images[1].candidate.is_none());
    assert!(!p1.images[1].dispatched);
}

#[tokio::test]
async fn rescue_can_be_disabled() {
    let config = AnalysisConfig::builder()
        .rescue_composites(false)
        .build()
        .unwrap();
    let triage = triage_document(&document(), ScriptedOcr::new(), &config)
        .await
        .unwrap();
    assert_eq!(triage.stats.images_rescued, 0);
    assert_eq!(triage.stats.composites_detected, 1);
    assert_eq!(triage.requests.len(), 1);
    assert_eq!(triage.requests[0].image_ref, Some(r(1, 2)));
}

#[tokio::test]
async fn unreadable_content_is_counted_not_fatal() {
    // Page 1: one image pdfium could not decode, an unreadable text layer.
    let mut p1 = PageLayout::new(1, 800.0, 600.0);
    p1.unreadable_images = vec![r(1, 0)];
    p1.text_layer_unreadable = true;
    p1.elements = vec![image(1, 1, BoundingBox::new(100.0, 100.0, 500.0, 400.0), 400, 300)];

    // Page 2: numbers printed next to an image whose OCR fails.
    let mut p2 = PageLayout::new(2, 800.0, 600.0);
    p2.elements = vec![
        image(2, 0, BoundingBox::new(100.0, 100.0, 400.0, 300.0), 300, 200),
        text(2, BoundingBox::new(410.0, 150.0, 500.0, 170.0), "26% 10% 23%"),
    ];

    let doc = ExtractionResult {
        document: DocumentInfo::default(),
        pages: vec![p1, p2],
    };
    let ocr = ScriptedOcr::with_answers(HashMap::from([
        (
            r(1, 1),
            Ok("Satisfacción del cliente 2023 vs 2024: 78% 85%".to_string()),
        ),
        (
            r(2, 0),
            Err(ItemError::OcrFailed {
                detail: "tesseract exited with status 1".into(),
            }),
        ),
    ]));

    let triage = triage_document(&doc, ocr, &config()).await.unwrap();
    let s = &triage.stats;
    assert_eq!(s.images_extracted, 3);
    assert_eq!(s.images_unreadable, 1);
    assert_eq!(s.text_layers_unreadable, 1);
    assert_eq!(s.images_kept, 1);
    assert_eq!(s.images_ocr_failed, 1);
    assert_eq!(
        s.images_kept + s.images_decorative + s.images_ocr_failed + s.images_unreadable,
        s.images_extracted
    );
    assert_eq!(s.discard_reasons.get("unreadable"), Some(&1));

    // The page without a text layer is still analysed.
    let p1 = &triage.pages[0];
    let note = p1.images[0].candidate.as_ref().unwrap().diagnostics.note;
    assert_eq!(note, DetectorNote::MissingTextLayer);
    assert_eq!(triage.requests.len(), 1);
    assert_eq!(triage.requests[0].image_ref, Some(r(1, 1)));

    // An image nobody could read is never reported as composite.
    assert_eq!(s.composites_detected, 0);
    assert!(triage.pages[1].images[0].candidate.is_none());
    assert!(!triage.pages[1].images[0].dispatched);
}

#[test]
fn page_text_jobs_follow_the_page_images() {
    let config = AnalysisConfig::builder()
        .analyze_page_text(true)
        .build()
        .unwrap();
    let triage =
        tokio_test::block_on(triage_document(&document(), ScriptedOcr::new(), &config)).unwrap();

    let labels: Vec<String> = triage.requests.iter().map(label).collect();
    // Page 3 has no text layer, so no text job.
    assert_eq!(labels, vec!["p1-img0", "p1-img2", "p1-text", "p2-text"]);
    assert_eq!(triage.stats.text_pages_submitted, 2);
    assert!(triage.pages[1].text_submitted);
    assert!(!triage.pages[2].text_submitted);
}

// ── Full run ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn claims_follow_submission_order_not_completion_order() {
    let backend = ScriptedBackend::new();
    let output = analyze_extraction(document(), ScriptedOcr::new(), &backend, &config())
        .await
        .unwrap();
    let claims = &output.report.claims;

    let ids: Vec<&str> = claims.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["C001", "C002", "C003", "C004"]);

    // The delayed first job still owns the first ids.
    assert_eq!(claims[0].image_ref, Some(r(1, 0)));
    assert_eq!(claims[0].classification, Classification::Finding);
    assert_eq!(claims[0].evidence.sample_size, Some(1260));
    assert!(claims[0].composite);
    assert_eq!(claims[0].source_title.as_deref(), Some("Ventas por trimestre"));

    // No score on the item: the analysis-level score applies.
    assert_eq!(claims[1].classification, Classification::Hypothesis);
    assert!((claims[1].relevance_score - 0.7).abs() < 1e-6);
    assert!(claims[1].ambiguity_flags.contains("missing_base"));

    assert_eq!(claims[2].classification, Classification::MethodologicalNote);
    assert!(claims[2].ambiguity_flags.is_empty());

    // Missing classification and null sample size.
    assert_eq!(claims[3].classification, Classification::Hypothesis);
    assert!(claims[3].ambiguity_flags.contains("missing_classification"));
    assert!(claims[3].ambiguity_flags.contains("missing_base"));
    assert!((claims[3].relevance_score - 0.1).abs() < 1e-6);

    let meta = &output.report.meta;
    assert_eq!(meta.model.as_deref(), Some("scripted-vlm"));
    assert_eq!(meta.ocr_engine.as_deref(), Some("scripted"));
    assert_eq!(meta.extraction.items_submitted, 2);
    assert_eq!(meta.extraction.items_failed, 0);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ids_are_unique_and_increasing_at_any_concurrency() {
    for concurrency in [1, 2, 8] {
        let config = AnalysisConfig::builder()
            .concurrency(concurrency)
            .analyze_page_text(true)
            .build()
            .unwrap();
        let backend = ScriptedBackend::new();
        let output = analyze_extraction(document(), ScriptedOcr::new(), &backend, &config)
            .await
            .unwrap();
        let numbers: Vec<usize> = output
            .report
            .claims
            .iter()
            .map(|c| c.id.trim_start_matches('C').parse().unwrap())
            .collect();
        assert!(!numbers.is_empty());
        assert!(
            numbers.windows(2).all(|w| w[0] < w[1]),
            "concurrency {concurrency}: {numbers:?}"
        );
    }
}

#[tokio::test]
async fn unusable_answer_is_quarantined_not_fatal() {
    let config = AnalysisConfig::builder()
        .analyze_page_text(true)
        .build()
        .unwrap();
    let output = analyze_extraction(document(), ScriptedOcr::new(), &ScriptedBackend::new(), &config)
        .await
        .unwrap();

    let quarantined: Vec<_> = output
        .report
        .claims
        .iter()
        .filter(|c| c.is_quarantined())
        .collect();
    // p1-text answers the default empty claim list; p2-text is prose.
    assert_eq!(quarantined.len(), 1);
    let q = quarantined[0];
    assert_eq!(q.page_number, 2);
    assert_eq!(q.relevance_score, 0.0);
    assert_eq!(q.classification, Classification::Hypothesis);
    assert!(q.error.is_some());
    assert_eq!(output.report.meta.extraction.items_failed, 1);

    let summary = output.report.summary();
    assert_eq!(summary.counts.quarantined, 1);
    assert_eq!(summary.counts.total_claims, 5);
}

#[tokio::test]
async fn drop_policy_counts_instead_of_recording() {
    let config = AnalysisConfig::builder()
        .analyze_page_text(true)
        .quarantine(QuarantinePolicy::Drop)
        .build()
        .unwrap();
    let output = analyze_extraction(document(), ScriptedOcr::new(), &ScriptedBackend::new(), &config)
        .await
        .unwrap();
    assert!(output.report.claims.iter().all(|c| !c.is_quarantined()));
    assert_eq!(output.report.claims.len(), 4);
    assert_eq!(output.report.meta.extraction.items_dropped, 1);
}

#[tokio::test]
async fn cancelled_run_still_produces_a_report() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let config = AnalysisConfig::builder()
        .cancel_flag(cancel)
        .build()
        .unwrap();
    let backend = ScriptedBackend::new();
    let output = analyze_extraction(document(), ScriptedOcr::new(), &backend, &config)
        .await
        .unwrap();

    assert!(output.report.claims.is_empty());
    assert_eq!(output.report.meta.extraction.items_cancelled, 2);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

// ── Rendering ────────────────────────────────────────────────────────────

#[tokio::test]
async fn digest_is_filtered_log_is_not() {
    let output = analyze_extraction(document(), ScriptedOcr::new(), &ScriptedBackend::new(), &config())
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let files = write_outputs(&output.report, dir.path(), &config())
        .await
        .unwrap();

    assert_eq!(files.log, dir.path().join("encuesta_2024_analysis.ndjson"));
    assert_eq!(files.digest, dir.path().join("insights-encuesta_2024.md"));

    let digest = std::fs::read_to_string(&files.digest).unwrap();
    assert!(digest.starts_with("# Insights: Encuesta de satisfacción 2024"));
    assert!(digest.contains("📊 **[Finding]** (N=1260) Las ventas crecieron un 26% en Q1 `C001`"));
    assert!(digest.contains("`C002`"));
    // Methodological note (0.9) and the low-relevance hypothesis stay out.
    assert!(!digest.contains("`C003`"));
    assert!(!digest.contains("`C004`"));

    let log = std::fs::read_to_string(&files.log).unwrap();
    let back = parse_log(&log).unwrap();
    assert_eq!(back.claims, output.report.claims);
}

#[tokio::test]
async fn log_claim_count_ignores_render_filter() {
    let output = analyze_extraction(document(), ScriptedOcr::new(), &ScriptedBackend::new(), &config())
        .await
        .unwrap();
    let expected = output.report.claims.len();

    for filter in [
        InsightFilter::All,
        InsightFilter::Findings,
        InsightFilter::Hypotheses,
        InsightFilter::Observations,
        InsightFilter::Actionable,
    ] {
        for threshold in [0.0, 0.5, 1.0] {
            let config = AnalysisConfig::builder()
                .insight_filter(filter)
                .relevance_threshold(threshold)
                .build()
                .unwrap();
            let dir = tempfile::tempdir().unwrap();
            let files = write_outputs(&output.report, dir.path(), &config)
                .await
                .unwrap();
            let log = std::fs::read_to_string(&files.log).unwrap();
            let claim_lines = log
                .lines()
                .filter(|l| l.contains("\"type\":\"claim\""))
                .count();
            assert_eq!(claim_lines, expected, "{filter:?} @ {threshold}");
        }
    }
}

#[tokio::test]
async fn digest_rerenders_from_log() {
    let output = analyze_extraction(document(), ScriptedOcr::new(), &ScriptedBackend::new(), &config())
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("encuesta_2024_analysis.ndjson");
    std::fs::write(&log_path, render_log(&output.report).unwrap()).unwrap();

    let digest_path = dir.path().join("notes.md");
    let render = RenderFilterConfig {
        relevance_threshold: 0.0,
        insight_filter: InsightFilter::Observations,
    };
    let report = render_from_log(&log_path, &digest_path, &render)
        .await
        .unwrap();
    assert_eq!(report.claims.len(), output.report.claims.len());

    let digest = std::fs::read_to_string(&digest_path).unwrap();
    assert!(digest.contains("`C003`"));
    assert!(!digest.contains("`C001`"));
    assert!(digest.contains("1 claims · 📊 0 findings · 💡 0 hypotheses · 📝 1 methodological notes"));
}
