//! Composite-chart detector.
//!
//! Some charts are drawn as an image while their values and labels live in
//! the page's text layer. OCR on such an image finds almost no numbers, so the
//! model would see bars without values. The detector spots these charts and
//! pairs each one with the page text printed around it.
//!
//! Detection is a pure function of the image element, the page's text blocks,
//! the page size, the image's own OCR text and [`DetectorConfig`]:
//!
//! 1. **Shape** — the raster must be at least `min_chart_width` ×
//!    `min_chart_height` and cover `min_page_ratio` of the page.
//! 2. **Proximity** — a text block is nearby when it intersects the image box
//!    grown by `proximity_margin`.
//! 3. **Numeric evidence** — nearby text must hold `min_nearby_numbers`
//!    numeric tokens while the OCR text holds fewer than
//!    `ocr_number_threshold`.

use crate::config::{DetectorConfig, StraddlePolicy};
use crate::document::{ImageElement, ImageRef, PageLayout, TextBlockElement};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Integers, decimals with `.` or `,`, optionally followed by `%`.
static NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?%?").expect("valid regex"));

pub fn count_numeric_tokens(text: &str) -> usize {
    NUMERIC_TOKEN.find_iter(text).count()
}

/// Outcome of the detector's decision chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorNote {
    BelowChartShape,
    MalformedBoundingBox,
    /// The page has no selectable text at all (scanned page).
    MissingTextLayer,
    NoNearbyText,
    InsufficientNearbyNumbers,
    ImageHasOwnNumbers,
    Composite,
}

/// Counters behind a detector decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorDiagnostics {
    pub nearby_blocks: usize,
    pub nearby_numbers: usize,
    pub ocr_numbers: usize,
    /// Share of the page area the image covers; 0 when unknown.
    pub page_ratio: f32,
    pub note: DetectorNote,
}

/// Detector verdict for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartCandidate {
    pub image_ref: ImageRef,
    pub is_chart_shape: bool,
    pub composite: bool,
    /// Set iff `composite`: nearby blocks joined with a space, in page order.
    pub nearby_text: Option<String>,
    pub diagnostics: DetectorDiagnostics,
}

impl ChartCandidate {
    fn rejected(image: &ImageElement, is_chart_shape: bool, diagnostics: DetectorDiagnostics) -> Self {
        Self {
            image_ref: image.image_ref,
            is_chart_shape,
            composite: false,
            nearby_text: None,
            diagnostics,
        }
    }
}

/// Run the detector for one image against the page's text blocks.
///
/// Every block is considered for proximity; a block near several images is
/// attached to each of them. Use [`detect_page`] to apply a different
/// [`StraddlePolicy`].
pub fn detect(
    image: &ImageElement,
    text_blocks: &[&TextBlockElement],
    page_area: f32,
    ocr_text: Option<&str>,
    config: &DetectorConfig,
) -> ChartCandidate {
    classify(image, has_text(text_blocks), text_blocks, page_area, ocr_text, config)
}

/// A page "has text" only if some block carries more than whitespace.
fn has_text(blocks: &[&TextBlockElement]) -> bool {
    blocks.iter().any(|b| !b.text.trim().is_empty())
}

fn classify(
    image: &ImageElement,
    page_has_text: bool,
    candidate_blocks: &[&TextBlockElement],
    page_area: f32,
    ocr_text: Option<&str>,
    config: &DetectorConfig,
) -> ChartCandidate {
    let ocr_numbers = ocr_text.map(count_numeric_tokens).unwrap_or(0);
    let mut diag = DetectorDiagnostics {
        nearby_blocks: 0,
        nearby_numbers: 0,
        ocr_numbers,
        page_ratio: 0.0,
        note: DetectorNote::Composite,
    };

    let bbox = image.bounding_box;
    if !bbox.is_valid() {
        diag.note = DetectorNote::MalformedBoundingBox;
        return ChartCandidate::rejected(image, false, diag);
    }

    if page_area.is_finite() && page_area > 0.0 {
        diag.page_ratio = bbox.area() / page_area;
    }
    let big_enough =
        image.width_px >= config.min_chart_width && image.height_px >= config.min_chart_height;
    let covers_page = !(page_area.is_finite() && page_area > 0.0)
        || diag.page_ratio >= config.min_page_ratio;
    if !(big_enough && covers_page) {
        diag.note = DetectorNote::BelowChartShape;
        return ChartCandidate::rejected(image, false, diag);
    }

    if !page_has_text {
        diag.note = DetectorNote::MissingTextLayer;
        return ChartCandidate::rejected(image, true, diag);
    }

    let window = bbox.expand(config.proximity_margin);
    let nearby: Vec<&str> = candidate_blocks
        .iter()
        .filter(|b| b.bounding_box.is_valid() && window.intersects(&b.bounding_box))
        .map(|b| b.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    diag.nearby_blocks = nearby.len();
    if nearby.is_empty() {
        diag.note = DetectorNote::NoNearbyText;
        return ChartCandidate::rejected(image, true, diag);
    }

    let nearby_text = nearby.join(" ");
    diag.nearby_numbers = count_numeric_tokens(&nearby_text);
    if diag.nearby_numbers < config.min_nearby_numbers {
        diag.note = DetectorNote::InsufficientNearbyNumbers;
        return ChartCandidate::rejected(image, true, diag);
    }
    if ocr_numbers >= config.ocr_number_threshold {
        diag.note = DetectorNote::ImageHasOwnNumbers;
        return ChartCandidate::rejected(image, true, diag);
    }

    ChartCandidate {
        image_ref: image.image_ref,
        is_chart_shape: true,
        composite: true,
        nearby_text: Some(nearby_text),
        diagnostics: diag,
    }
}

/// Run the detector for every image on a page.
///
/// `ocr` maps each image to its OCR text; images without an entry (OCR
/// skipped or failed) count as showing no numbers. Candidates come back in
/// the page's image order.
pub fn detect_page(
    page: &PageLayout,
    ocr: &HashMap<ImageRef, String>,
    config: &DetectorConfig,
) -> Vec<ChartCandidate> {
    let images: Vec<&ImageElement> = page.images().collect();
    let blocks: Vec<&TextBlockElement> = page.text_blocks().collect();
    let page_has_text = has_text(&blocks);
    let page_area = page.area();

    let owner = match config.straddle {
        StraddlePolicy::Shared => None,
        StraddlePolicy::Nearest => Some(nearest_owners(&images, &blocks, config.proximity_margin)),
    };

    images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let candidates: Vec<&TextBlockElement> = match &owner {
                None => blocks.clone(),
                Some(owners) => blocks
                    .iter()
                    .zip(owners)
                    .filter(|(_, o)| **o == Some(i))
                    .map(|(b, _)| *b)
                    .collect(),
            };
            let ocr_text = ocr.get(&image.image_ref).map(String::as_str);
            classify(image, page_has_text, &candidates, page_area, ocr_text, config)
        })
        .collect()
}

/// For each block, the index of the image whose window it intersects and
/// whose centre is closest to the block's centre. Ties go to the earlier image.
fn nearest_owners(
    images: &[&ImageElement],
    blocks: &[&TextBlockElement],
    margin: f32,
) -> Vec<Option<usize>> {
    blocks
        .iter()
        .map(|block| {
            let (bx, by) = block.bounding_box.center();
            images
                .iter()
                .enumerate()
                .filter(|(_, img)| {
                    img.bounding_box.is_valid()
                        && img.bounding_box.expand(margin).intersects(&block.bounding_box)
                })
                .map(|(i, img)| {
                    let (ix, iy) = img.bounding_box.center();
                    (i, (ix - bx).powi(2) + (iy - by).powi(2))
                })
                .fold(None, |best: Option<(usize, f32)>, (i, d)| match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((i, d)),
                })
                .map(|(i, _)| i)
        })
        .collect()
}
