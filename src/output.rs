//! Report data model: claims, per-document metadata and the derived summary.
//!
//! A [`DocumentReport`] is append-only while the aggregator fills it and
//! frozen once handed to the renderer. The summary is never stored: it is a
//! pure reduction over the claims, recomputed by [`DocumentReport::summary`]
//! and by the digest over its own filtered subset.

use crate::document::{DocumentInfo, ImageRef};
use crate::error::ItemError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Minimum sample size for a claim to stand as a finding.
pub const MIN_FINDING_SAMPLE_SIZE: u64 = 50;

/// Relevance assigned when the model gives none or gives garbage.
pub const DEFAULT_RELEVANCE_SCORE: f32 = 0.1;

/// How many unbased hypotheses the summary proposes for validation.
const MAX_HYPOTHESES_TO_VALIDATE: usize = 5;

/// Suggested sample size for validating an unbased hypothesis.
const SUGGESTED_VALIDATION_N: u64 = 100;

// ── Ambiguity flags ──────────────────────────────────────────────────────

pub const FLAG_MISSING_BASE: &str = "missing_base";
pub const FLAG_LOW_N: &str = "low_n_referential";
pub const FLAG_INFERRED_N: &str = "inferred_n";
pub const FLAG_INVALID_CLASSIFICATION: &str = "invalid_classification";
pub const FLAG_MISSING_CLASSIFICATION: &str = "missing_classification";
pub const FLAG_QUARANTINED: &str = "quarantined";

/// The three kinds of reported knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Backed by quantitative data with a sufficient base.
    Finding,
    /// Exploratory, qualitative or under-based; needs validation.
    Hypothesis,
    /// Describes study design or scope rather than a result.
    MethodologicalNote,
}

impl Classification {
    /// Parse a model-supplied label. Returns `None` for anything unknown.
    pub fn from_label(label: &str) -> Option<Self> {
        let norm = label.trim().to_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "finding" | "findings" => Some(Classification::Finding),
            "hypothesis" | "hypotheses" => Some(Classification::Hypothesis),
            "methodological_note" | "methodological_notes" | "methodology" => {
                Some(Classification::MethodologicalNote)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Finding => "finding",
            Classification::Hypothesis => "hypothesis",
            Classification::MethodologicalNote => "methodological_note",
        }
    }

    /// Marker used in the digest.
    pub fn marker(&self) -> &'static str {
        match self {
            Classification::Finding => "📊",
            Classification::Hypothesis => "💡",
            Classification::MethodologicalNote => "📝",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Finding => "Finding",
            Classification::Hypothesis => "Hypothesis",
            Classification::MethodologicalNote => "Methodological note",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nature of the data behind a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Quantitative,
    Qualitative,
    Mixed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DataType {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "quantitative" | "quant" => DataType::Quantitative,
            "qualitative" | "qual" => DataType::Qualitative,
            "mixed" => DataType::Mixed,
            _ => DataType::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataType::Quantitative => "quantitative",
            DataType::Qualitative => "qualitative",
            DataType::Mixed => "mixed",
            DataType::Unknown => "unknown",
        }
    }
}

/// Evidence attached to a claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(alias = "n")]
    pub sample_size: Option<u64>,
    #[serde(default)]
    pub data_type: DataType,
    pub base_label: Option<String>,
}

/// Which kind of model call produced a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    /// Analysis of an image (chart, table, infographic).
    #[default]
    Chart,
    /// Analysis of a page's selectable text.
    Text,
}

/// One reported piece of analysis, tied to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Sequential identifier, `C001`, `C002`, … in submission order.
    pub id: String,
    pub page_number: usize,
    #[serde(default)]
    pub source: ClaimSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    pub classification: Classification,
    #[serde(alias = "claim_text")]
    pub text: String,
    #[serde(default)]
    pub evidence: Evidence,
    pub relevance_score: f32,
    #[serde(default)]
    pub theme_tags: BTreeSet<String>,
    #[serde(default)]
    pub ambiguity_flags: BTreeSet<String>,
    #[serde(default)]
    pub classification_rationale: Option<String>,
    /// True when the model saw nearby page text alongside the image.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub composite: bool,
    /// Set on quarantined claims: why the original item could not be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl Claim {
    pub fn is_quarantined(&self) -> bool {
        self.error.is_some()
    }
}

/// Counters describing what happened to the document's images and jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub images_extracted: usize,
    /// Images that passed the relevance filter.
    pub images_kept: usize,
    /// Images judged to carry nothing worth analysing.
    pub images_decorative: usize,
    /// Images the OCR engine could not read; excluded but not decorative.
    pub images_ocr_failed: usize,
    /// Images that could not be decoded from the PDF at all.
    pub images_unreadable: usize,
    /// Pages whose text layer could not be read.
    pub text_layers_unreadable: usize,
    /// Filter-rejected images dispatched anyway because they are composite.
    pub images_rescued: usize,
    pub composites_detected: usize,
    /// Discard counts keyed by filter reason.
    pub discard_reasons: BTreeMap<String, usize>,
    pub text_pages_submitted: usize,
    pub items_submitted: usize,
    pub items_failed: usize,
    pub items_cancelled: usize,
    /// Malformed results discarded under the drop policy.
    pub items_dropped: usize,
}

/// The `meta` record of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub document: DocumentInfo,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub ocr_engine: Option<String>,
    #[serde(default)]
    pub extraction: ExtractionStats,
}

impl ReportMeta {
    pub fn new(document: DocumentInfo) -> Self {
        Self {
            document,
            generated_at: Utc::now(),
            model: None,
            ocr_engine: None,
            extraction: ExtractionStats::default(),
        }
    }
}

/// Counts of claims per classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub total_claims: usize,
    pub findings: usize,
    pub hypotheses: usize,
    pub methodological_notes: usize,
    /// Error-marker claims; also counted under their classification.
    pub quarantined: usize,
}

impl ClassificationCounts {
    pub fn from_claims<'a>(claims: impl IntoIterator<Item = &'a Claim>) -> Self {
        claims.into_iter().fold(Self::default(), |mut acc, c| {
            acc.total_claims += 1;
            match c.classification {
                Classification::Finding => acc.findings += 1,
                Classification::Hypothesis => acc.hypotheses += 1,
                Classification::MethodologicalNote => acc.methodological_notes += 1,
            }
            if c.is_quarantined() {
                acc.quarantined += 1;
            }
            acc
        })
    }
}

/// A hypothesis worth validating with fresh data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisToValidate {
    pub id: String,
    pub why: String,
    pub suggested_n: u64,
}

/// The `summary` record of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub counts: ClassificationCounts,
    pub top_hypotheses_to_validate: Vec<HypothesisToValidate>,
}

/// Everything known about one analysed document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReport {
    pub meta: ReportMeta,
    pub claims: Vec<Claim>,
}

impl DocumentReport {
    /// Recompute the summary from the current claims.
    pub fn summary(&self) -> ReportSummary {
        let top_hypotheses_to_validate = self
            .claims
            .iter()
            .filter(|c| {
                !c.is_quarantined()
                    && c.classification == Classification::Hypothesis
                    && c.evidence.sample_size.is_none()
            })
            .take(MAX_HYPOTHESES_TO_VALIDATE)
            .map(|c| HypothesisToValidate {
                id: c.id.clone(),
                why: "no sample size reported".to_string(),
                suggested_n: SUGGESTED_VALIDATION_N,
            })
            .collect();

        ReportSummary {
            counts: ClassificationCounts::from_claims(&self.claims),
            top_hypotheses_to_validate,
        }
    }
}
