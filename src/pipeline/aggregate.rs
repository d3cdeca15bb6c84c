//! Claim aggregation: raw model results → validated, numbered claims.
//!
//! The aggregator is the only writer of the [`DocumentReport`]. Outcomes
//! arrive from the dispatcher in completion order; [`Aggregator::ingest_all`]
//! sorts them by submission `seq` and applies them one at a time, so claim
//! ids (`C001`, `C002`, …) follow submission order and never the timing of
//! the model calls.
//!
//! Every claim item passes through the same rules:
//!
//! * **Classification** must be `finding`, `hypothesis` or
//!   `methodological_note`. Unknown labels become `hypothesis` flagged
//!   `invalid_classification`; a missing label becomes `hypothesis` flagged
//!   `missing_classification`.
//! * **Base**: a claim that is not a methodological note and has no sample
//!   size, or one below [`MIN_FINDING_SAMPLE_SIZE`], is a `hypothesis` and
//!   carries `missing_base` (plus `low_n_referential` when a small N was
//!   given). A downgraded finding says so in its rationale.
//! * **Relevance** is clamped into [0, 1]. Absent or unparsable scores fall
//!   back to the analysis-level score, then to [`DEFAULT_RELEVANCE_SCORE`].
//!
//! Results that cannot be used at all are quarantined according to
//! [`QuarantinePolicy`]. Aggregation never aborts.

use crate::config::QuarantinePolicy;
use crate::document::ImageRef;
use crate::error::ItemError;
use crate::output::{
    Claim, ClaimSource, Classification, DataType, DocumentReport, Evidence, ReportMeta,
    DEFAULT_RELEVANCE_SCORE, FLAG_INFERRED_N, FLAG_INVALID_CLASSIFICATION, FLAG_LOW_N,
    FLAG_MISSING_BASE, FLAG_MISSING_CLASSIFICATION, FLAG_QUARANTINED, MIN_FINDING_SAMPLE_SIZE,
};
use crate::pipeline::llm::JobOutcome;
use crate::pipeline::postprocess::{parse_analysis, string_field, RawAnalysis};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A run of digits with optional `.`/`,` groups: `30`, `1.260`, `45,5`.
static NUMBER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("valid regex"));

/// Where a raw result came from; copied onto every claim it yields.
#[derive(Debug, Clone)]
struct Origin {
    page_number: usize,
    source: ClaimSource,
    image_ref: Option<ImageRef>,
    composite: bool,
}

impl From<&JobOutcome> for Origin {
    fn from(o: &JobOutcome) -> Self {
        Self {
            page_number: o.page_number,
            source: o.source,
            image_ref: o.image_ref,
            composite: o.composite,
        }
    }
}

/// Builds a [`DocumentReport`] from dispatcher outcomes.
#[derive(Debug)]
pub struct Aggregator {
    report: DocumentReport,
    policy: QuarantinePolicy,
    next_id: usize,
}

impl Aggregator {
    pub fn new(meta: ReportMeta, policy: QuarantinePolicy) -> Self {
        Self {
            report: DocumentReport {
                meta,
                claims: Vec::new(),
            },
            policy,
            next_id: 1,
        }
    }

    /// Apply every outcome in submission order.
    pub fn ingest_all(&mut self, mut outcomes: Vec<JobOutcome>) {
        outcomes.sort_by_key(|o| o.seq);
        for outcome in outcomes {
            self.ingest(outcome);
        }
    }

    /// Apply one outcome.
    pub fn ingest(&mut self, outcome: JobOutcome) {
        let origin = Origin::from(&outcome);
        match outcome.result {
            Err(ItemError::Cancelled) => {
                self.report.meta.extraction.items_cancelled += 1;
            }
            Err(e) => {
                warn!("Job {} (page {}): {}", outcome.seq, origin.page_number, e);
                self.report.meta.extraction.items_failed += 1;
                self.quarantine(&origin, None, e);
            }
            Ok(raw) => match parse_analysis(&raw) {
                Ok(analysis) => self.ingest_analysis(&origin, analysis),
                Err(e) => {
                    warn!("Job {} (page {}): {}", outcome.seq, origin.page_number, e);
                    self.report.meta.extraction.items_failed += 1;
                    self.quarantine(&origin, None, e);
                }
            },
        }
    }

    /// Freeze the report.
    pub fn finish(self) -> DocumentReport {
        info!(
            "Aggregated {} claims ({} failed items, {} cancelled, {} dropped)",
            self.report.claims.len(),
            self.report.meta.extraction.items_failed,
            self.report.meta.extraction.items_cancelled,
            self.report.meta.extraction.items_dropped
        );
        self.report
    }

    fn next_id(&mut self) -> String {
        let id = format!("C{:03}", self.next_id);
        self.next_id += 1;
        id
    }

    fn ingest_analysis(&mut self, origin: &Origin, analysis: RawAnalysis) {
        let fallback_score = analysis.relevance_score.as_ref().and_then(parse_score);
        let title = analysis.title.clone();
        debug!(
            "Page {}: {} claim items ({:?})",
            origin.page_number,
            analysis.claims.len(),
            analysis.chart_type
        );

        for item in &analysis.claims {
            match item {
                Value::Object(obj) => match validate_item(obj, fallback_score) {
                    Ok(mut claim) => {
                        claim.id = self.next_id();
                        claim.page_number = origin.page_number;
                        claim.source = origin.source;
                        claim.image_ref = origin.image_ref;
                        claim.composite = origin.composite;
                        claim.source_title = title.clone();
                        self.report.claims.push(claim);
                    }
                    Err(detail) => self.quarantine(
                        origin,
                        title.clone(),
                        ItemError::MalformedOutput { detail },
                    ),
                },
                other => self.quarantine(
                    origin,
                    title.clone(),
                    ItemError::MalformedOutput {
                        detail: format!("claim item is not an object: {other}"),
                    },
                ),
            }
        }
    }

    fn quarantine(&mut self, origin: &Origin, title: Option<String>, reason: ItemError) {
        match self.policy {
            QuarantinePolicy::Drop => {
                debug!("Dropping unusable result on page {}: {}", origin.page_number, reason);
                self.report.meta.extraction.items_dropped += 1;
            }
            QuarantinePolicy::Record => {
                let subject = origin
                    .image_ref
                    .map(|r| format!("image {r}"))
                    .unwrap_or_else(|| format!("text of page {}", origin.page_number));
                let claim = Claim {
                    id: self.next_id(),
                    page_number: origin.page_number,
                    source: origin.source,
                    image_ref: origin.image_ref,
                    source_title: title,
                    classification: Classification::Hypothesis,
                    text: format!("Analysis unavailable for {subject}"),
                    evidence: Evidence::default(),
                    relevance_score: 0.0,
                    theme_tags: BTreeSet::new(),
                    ambiguity_flags: BTreeSet::from([
                        FLAG_QUARANTINED.to_string(),
                        FLAG_MISSING_BASE.to_string(),
                    ]),
                    classification_rationale: None,
                    composite: origin.composite,
                    error: Some(reason),
                };
                self.report.claims.push(claim);
            }
        }
    }
}

/// Validate one claim item. Identity fields are filled in by the caller.
fn validate_item(obj: &Map<String, Value>, fallback_score: Option<f32>) -> Result<Claim, String> {
    let text = string_field(obj, "text")
        .or_else(|| string_field(obj, "claim_text"))
        .ok_or_else(|| "claim item has no text".to_string())?;

    let mut flags: BTreeSet<String> = string_set(obj.get("ambiguity_flags"));
    let mut rationale = string_field(obj, "classification_rationale");

    let mut classification = match obj.get("classification") {
        None | Some(Value::Null) => {
            flags.insert(FLAG_MISSING_CLASSIFICATION.to_string());
            Classification::Hypothesis
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            flags.insert(FLAG_MISSING_CLASSIFICATION.to_string());
            Classification::Hypothesis
        }
        Some(Value::String(s)) => Classification::from_label(s).unwrap_or_else(|| {
            flags.insert(FLAG_INVALID_CLASSIFICATION.to_string());
            Classification::Hypothesis
        }),
        Some(_) => {
            flags.insert(FLAG_INVALID_CLASSIFICATION.to_string());
            Classification::Hypothesis
        }
    };

    let (sample_size, inferred) = obj
        .get("sample_size")
        .or_else(|| obj.get("n"))
        .map(parse_sample_size)
        .unwrap_or((None, false));
    if inferred {
        flags.insert(FLAG_INFERRED_N.to_string());
    }

    if classification != Classification::MethodologicalNote {
        let downgrade = match sample_size {
            None => {
                flags.insert(FLAG_MISSING_BASE.to_string());
                Some("no sample size reported".to_string())
            }
            Some(n) if n < MIN_FINDING_SAMPLE_SIZE => {
                flags.insert(FLAG_MISSING_BASE.to_string());
                flags.insert(FLAG_LOW_N.to_string());
                Some(format!("base N={n} is below {MIN_FINDING_SAMPLE_SIZE}"))
            }
            Some(_) => None,
        };
        if let Some(why) = downgrade {
            if classification == Classification::Finding {
                let note = format!("Downgraded from finding: {why}.");
                rationale = Some(match rationale {
                    Some(r) => format!("{r} {note}"),
                    None => note,
                });
            }
            classification = Classification::Hypothesis;
        }
    }

    let relevance_score = obj
        .get("relevance_score")
        .and_then(parse_score)
        .or(fallback_score)
        .unwrap_or(DEFAULT_RELEVANCE_SCORE)
        .clamp(0.0, 1.0);

    Ok(Claim {
        id: String::new(),
        page_number: 0,
        source: ClaimSource::default(),
        image_ref: None,
        source_title: None,
        classification,
        text,
        evidence: Evidence {
            sample_size,
            data_type: obj
                .get("data_type")
                .and_then(Value::as_str)
                .map(DataType::from_label)
                .unwrap_or_default(),
            base_label: string_field(obj, "base_label"),
        },
        relevance_score,
        theme_tags: string_set(obj.get("theme_tags")),
        ambiguity_flags: flags,
        classification_rationale: rationale,
        composite: false,
        error: None,
    })
}

/// A finite score from a number or a numeric string.
fn parse_score(v: &Value) -> Option<f32> {
    let score = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score.is_finite().then_some(score as f32)
}

/// Returns the sample size and whether it had to be dug out of a string
/// such as `"N=1.260"`.
///
/// A string must name exactly one number. `"n=30 (2024)"` or `"30-45"` give
/// no base at all, so the claim is treated as unbased.
fn parse_sample_size(v: &Value) -> (Option<u64>, bool) {
    match v {
        Value::Number(n) => {
            let n = n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.round() as u64));
            (n, false)
        }
        Value::String(s) => {
            let mut values = NUMBER_TOKEN.find_iter(s).filter_map(|m| parse_count(m.as_str()));
            match (values.next(), values.next()) {
                (Some(n), None) => (Some(n), true),
                _ => (None, false),
            }
        }
        _ => (None, false),
    }
}

/// One numeric token as a count. Groups of exactly three digits after a
/// `.` or `,` are thousands; a single other group is a decimal part.
fn parse_count(token: &str) -> Option<u64> {
    let groups: Vec<&str> = token.split(['.', ',']).collect();
    match groups.as_slice() {
        [whole] => whole.parse().ok(),
        [head, rest @ ..] if rest.iter().all(|g| g.len() == 3) => {
            let mut digits = head.to_string();
            for g in rest {
                digits.push_str(g);
            }
            digits.parse().ok()
        }
        [whole, frac] => format!("{whole}.{frac}")
            .parse::<f64>()
            .ok()
            .map(|f| f.round() as u64),
        _ => None,
    }
}

/// Trimmed, non-empty strings from an array (or a single string).
fn string_set(v: Option<&Value>) -> BTreeSet<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => BTreeSet::from([s.trim().to_string()]),
        _ => BTreeSet::new(),
    }
}
