//! OCR-based relevance filter.
//!
//! Decides whether an extracted image carries enough text and numbers to be
//! worth a model call. Logos, banners, photos and slide chrome are dropped
//! here; charts and tables survive.
//!
//! The filter is a pure function of the OCR text and [`FilterConfig`]. It
//! never mutates its input and never calls out, so the same input always
//! yields the same [`FilterDecision`].

use crate::config::FilterConfig;
use crate::document::{ImageElement, ImageRef};
use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an image was kept or dropped. The first failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// Raster below the dimension gate; OCR was not attempted.
    TooSmall,
    TooShort,
    TooFewDigits,
    TooFewWords,
    NoRequiredNumber,
    /// The OCR engine failed. Excluded, but not counted as decorative.
    OcrFailed,
    Passed,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::TooSmall => "too_small",
            FilterReason::TooShort => "too_short",
            FilterReason::TooFewDigits => "too_few_digits",
            FilterReason::TooFewWords => "too_few_words",
            FilterReason::NoRequiredNumber => "no_required_number",
            FilterReason::OcrFailed => "ocr_failed",
            FilterReason::Passed => "passed",
        }
    }

    /// Rejections caused by what the OCR text says (or fails to say).
    pub fn is_content_rejection(&self) -> bool {
        matches!(
            self,
            FilterReason::TooShort
                | FilterReason::TooFewDigits
                | FilterReason::TooFewWords
                | FilterReason::NoRequiredNumber
        )
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurements the decision was based on, kept for auditability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Characters in the normalised OCR text.
    pub normalized_len: usize,
    /// Digit characters in the raw OCR text.
    pub digit_count: usize,
    /// Tokens with at least one letter that are not ignored words.
    pub useful_words: usize,
}

/// Verdict of the relevance filter for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDecision {
    pub image_ref: ImageRef,
    pub kept: bool,
    pub reason: FilterReason,
    pub stats: FilterStats,
}

/// Case-fold, turn every non-alphanumeric character into a space and
/// collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compute the measurements for `raw` OCR text under `config`.
pub fn measure(raw: &str, config: &FilterConfig) -> FilterStats {
    let normalized = normalize(raw);
    let ignored: Vec<String> = config.ignore_words.iter().map(|w| normalize(w)).collect();
    let useful_words = normalized
        .split(' ')
        .filter(|tok| !tok.is_empty())
        .filter(|tok| !ignored.iter().any(|w| w == tok))
        .filter(|tok| tok.chars().any(char::is_alphabetic))
        .count();

    FilterStats {
        normalized_len: normalized.chars().count(),
        digit_count: raw.chars().filter(|c| c.is_ascii_digit()).count(),
        useful_words,
    }
}

/// Pre-OCR dimension gate. Returns a `too_small` decision for icons,
/// bullets and thin banners, or `None` when OCR is worth running.
pub fn check_dimensions(image: &ImageElement, config: &FilterConfig) -> Option<FilterDecision> {
    let (w, h) = (image.width_px, image.height_px);
    let area = u64::from(w) * u64::from(h);
    let aspect = w.max(h) as f32 / w.min(h).max(1) as f32;

    let too_small = (w < config.min_dimension && h < config.min_dimension)
        || area < config.min_area
        || aspect > config.max_aspect_ratio;

    too_small.then(|| FilterDecision {
        image_ref: image.image_ref,
        kept: false,
        reason: FilterReason::TooSmall,
        stats: FilterStats::default(),
    })
}

/// Decide whether an image is relevant, given its OCR outcome.
pub fn evaluate(
    image_ref: ImageRef,
    ocr: Result<&str, &ItemError>,
    config: &FilterConfig,
) -> FilterDecision {
    let raw = match ocr {
        Ok(text) => text,
        Err(_) => {
            return FilterDecision {
                image_ref,
                kept: false,
                reason: FilterReason::OcrFailed,
                stats: FilterStats::default(),
            }
        }
    };

    let stats = measure(raw, config);
    let reason = if stats.normalized_len < config.min_chars {
        FilterReason::TooShort
    } else if stats.digit_count < config.min_digits {
        FilterReason::TooFewDigits
    } else if stats.useful_words < config.min_words {
        FilterReason::TooFewWords
    } else if config.require_numbers && stats.digit_count == 0 {
        FilterReason::NoRequiredNumber
    } else {
        FilterReason::Passed
    };

    FilterDecision {
        image_ref,
        kept: reason == FilterReason::Passed,
        reason,
        stats,
    }
}
