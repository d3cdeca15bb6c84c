//! Report rendering: the full structured log and the filtered digest.
//!
//! Two outputs with different contracts:
//!
//! * **Log** (NDJSON) — one `meta` record, one `claim` record per claim and
//!   one `summary` record. Never filtered: every claim, quarantined ones
//!   included, is always present. [`read_log`] reads it back so a digest can
//!   be re-rendered without calling the model again.
//! * **Digest** (Markdown) — only the claims that pass
//!   [`RenderFilterConfig`], grouped by page, with counts computed over that
//!   filtered subset. Under each claim the digest lists its evidence
//!   (data type, base, relevance) and its limitations (flags in plain words,
//!   classification rationale).

use crate::config::RenderFilterConfig;
use crate::error::InsightsError;
use crate::output::{
    Claim, ClassificationCounts, DataType, DocumentReport, ReportMeta, ReportSummary,
    FLAG_INFERRED_N, FLAG_INVALID_CLASSIFICATION, FLAG_LOW_N, FLAG_MISSING_BASE,
    FLAG_MISSING_CLASSIFICATION, FLAG_QUARANTINED,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogRecordRef<'a> {
    Meta(&'a ReportMeta),
    Claim(&'a Claim),
    Summary(&'a ReportSummary),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogRecord {
    Meta(ReportMeta),
    Claim(Claim),
    Summary(serde_json::Value),
}

fn internal(e: serde_json::Error) -> InsightsError {
    InsightsError::Internal(format!("serialising log record: {e}"))
}

/// Serialise the whole report as NDJSON.
pub fn render_log(report: &DocumentReport) -> Result<String, InsightsError> {
    let summary = report.summary();
    let mut out = String::new();
    let mut push = |record: LogRecordRef<'_>| -> Result<(), InsightsError> {
        out.push_str(&serde_json::to_string(&record).map_err(internal)?);
        out.push('\n');
        Ok(())
    };

    push(LogRecordRef::Meta(&report.meta))?;
    for claim in &report.claims {
        push(LogRecordRef::Claim(claim))?;
    }
    push(LogRecordRef::Summary(&summary))?;
    Ok(out)
}

/// Parse an NDJSON log back into a report.
///
/// `summary` records are ignored; the summary is always recomputed.
pub fn parse_log(ndjson: &str) -> Result<DocumentReport, InsightsError> {
    let mut meta: Option<ReportMeta> = None;
    let mut claims = Vec::new();

    for (i, line) in ndjson.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: LogRecord = serde_json::from_str(line).map_err(|e| InsightsError::LogParse {
            line: i + 1,
            detail: e.to_string(),
        })?;
        match record {
            LogRecord::Meta(m) => {
                if meta.is_some() {
                    return Err(InsightsError::LogParse {
                        line: i + 1,
                        detail: "duplicate meta record".into(),
                    });
                }
                meta = Some(m);
            }
            LogRecord::Claim(c) => claims.push(c),
            LogRecord::Summary(_) => {}
        }
    }

    let meta = meta.ok_or_else(|| InsightsError::LogParse {
        line: 0,
        detail: "no meta record".into(),
    })?;
    Ok(DocumentReport { meta, claims })
}

/// Read a log file written by [`write_log`].
pub async fn read_log(path: &Path) -> Result<DocumentReport, InsightsError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => InsightsError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => InsightsError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => InsightsError::LogParse {
                line: 0,
                detail: e.to_string(),
            },
        })?;
    parse_log(&raw)
}

/// Claims that belong in the digest, stably ordered by page.
pub fn select_for_digest<'a>(claims: &'a [Claim], filter: &RenderFilterConfig) -> Vec<&'a Claim> {
    let mut selected: Vec<&Claim> = claims
        .iter()
        .filter(|c| {
            c.relevance_score >= filter.relevance_threshold
                && filter.insight_filter.matches(c.classification)
        })
        .collect();
    selected.sort_by_key(|c| c.page_number);
    selected
}

/// Render the human-readable Markdown digest.
pub fn render_digest(report: &DocumentReport, filter: &RenderFilterConfig) -> String {
    let selected = select_for_digest(&report.claims, filter);
    let counts = ClassificationCounts::from_claims(selected.iter().copied());
    let doc = &report.meta.document;
    let title = doc
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(&doc.file_name);

    let mut md = String::new();
    let _ = writeln!(md, "# Insights: {title}\n");
    let _ = writeln!(
        md,
        "> {} · relevance ≥ {:.2}",
        filter.insight_filter.describe(),
        filter.relevance_threshold
    );
    let _ = writeln!(
        md,
        "> {} claims · 📊 {} findings · 💡 {} hypotheses · 📝 {} methodological notes\n",
        counts.total_claims, counts.findings, counts.hypotheses, counts.methodological_notes
    );

    if selected.is_empty() {
        md.push_str("_No claims match the current filter._\n");
    }

    let mut current_page = None;
    for claim in &selected {
        if current_page != Some(claim.page_number) {
            let _ = writeln!(md, "## Page {}\n", claim.page_number);
            current_page = Some(claim.page_number);
        }
        md.push_str(&render_claim(claim));
    }

    let omitted = report.claims.len() - selected.len();
    let quarantined = report.claims.iter().filter(|c| c.is_quarantined()).count();
    let dropped = report.meta.extraction.items_dropped;
    if omitted > 0 || quarantined > 0 || dropped > 0 {
        md.push_str("\n---\n\n");
        if omitted > 0 {
            let _ = writeln!(
                md,
                "_{omitted} more claim(s) are in the analysis log but not shown here._"
            );
        }
        if quarantined > 0 || dropped > 0 {
            let _ = writeln!(
                md,
                "_{} item(s) could not be analysed._",
                quarantined + dropped
            );
        }
    }
    md
}

fn render_claim(claim: &Claim) -> String {
    let mut line = format!(
        "- {} **[{}]**",
        claim.classification.marker(),
        claim.classification.label()
    );
    if let Some(n) = claim.evidence.sample_size {
        let _ = write!(line, " (N={n})");
    }
    let _ = writeln!(line, " {} `{}`", claim.text, claim.id);

    let _ = writeln!(line, "  - Evidence: {}", evidence_line(claim));
    if let Some(limits) = limitations_line(claim) {
        let _ = writeln!(line, "  - ⚠️ Limitations: {limits}");
    }
    if !claim.theme_tags.is_empty() {
        let tags: Vec<&str> = claim.theme_tags.iter().map(String::as_str).collect();
        let _ = writeln!(line, "  - Themes: {}", tags.join(", "));
    }
    line
}

fn evidence_line(claim: &Claim) -> String {
    let mut parts = Vec::new();
    if claim.evidence.data_type != DataType::Unknown {
        parts.push(claim.evidence.data_type.label().to_string());
    }
    if let Some(ref base) = claim.evidence.base_label {
        parts.push(format!("base: {base}"));
    }
    parts.push(format!("relevance {:.2}", claim.relevance_score));
    if claim.composite {
        parts.push("chart read with surrounding text".to_string());
    }
    parts.join(" · ")
}

/// Flags in plain words, then the rationale. `None` when there is nothing
/// to qualify the claim with.
fn limitations_line(claim: &Claim) -> Option<String> {
    let mut parts: Vec<String> = claim
        .ambiguity_flags
        .iter()
        .filter(|f| *f != FLAG_QUARANTINED)
        .map(|f| flag_label(f).to_string())
        .collect();
    if let Some(ref rationale) = claim.classification_rationale {
        parts.push(rationale.clone());
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn flag_label(flag: &str) -> &str {
    match flag {
        FLAG_MISSING_BASE => "no base/N reported",
        FLAG_LOW_N => "low N (referential only)",
        FLAG_INFERRED_N => "N inferred from text",
        FLAG_MISSING_CLASSIFICATION => "no classification given",
        FLAG_INVALID_CLASSIFICATION => "unrecognised classification",
        "unspecified_method" => "method not specified",
        other => other,
    }
}

/// Write `contents` to `path` atomically (temp file + rename).
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), InsightsError> {
    let write_failed = |source: std::io::Error| InsightsError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;
    Ok(())
}

pub async fn write_log(report: &DocumentReport, path: &Path) -> Result<(), InsightsError> {
    write_atomic(path, &render_log(report)?).await
}

pub async fn write_digest(
    report: &DocumentReport,
    filter: &RenderFilterConfig,
    path: &Path,
) -> Result<(), InsightsError> {
    write_atomic(path, &render_digest(report, filter)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsightFilter;
    use crate::document::DocumentInfo;
    use crate::error::ItemError;
    use crate::output::{ClaimSource, Classification, Evidence};
    use std::collections::BTreeSet;

    fn claim(id: &str, page: usize, class: Classification, n: Option<u64>, score: f32) -> Claim {
        Claim {
            id: id.into(),
            page_number: page,
            source: ClaimSource::Chart,
            image_ref: None,
            source_title: None,
            classification: class,
            text: format!("claim {id}"),
            evidence: Evidence {
                sample_size: n,
                ..Default::default()
            },
            relevance_score: score,
            theme_tags: BTreeSet::new(),
            ambiguity_flags: BTreeSet::new(),
            classification_rationale: None,
            composite: false,
            error: None,
        }
    }

    fn report() -> DocumentReport {
        DocumentReport {
            meta: ReportMeta::new(DocumentInfo {
                file_name: "study.pdf".into(),
                ..Default::default()
            }),
            claims: vec![
                claim("C001", 3, Classification::Finding, Some(1260), 0.85),
                claim("C002", 1, Classification::MethodologicalNote, None, 0.9),
                claim("C003", 1, Classification::Hypothesis, None, 0.3),
                claim("C004", 2, Classification::Hypothesis, None, 0.6),
            ],
        }
    }

    #[test]
    fn actionable_digest_excludes_notes_and_low_scores() {
        let r = report();
        let selected = select_for_digest(&r.claims, &RenderFilterConfig::default());
        let ids: Vec<&str> = selected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C004", "C001"]);
    }

    #[test]
    fn digest_line_format() {
        let md = render_digest(&report(), &RenderFilterConfig::default());
        assert!(md.contains("- 📊 **[Finding]** (N=1260) claim C001 `C001`"), "{md}");
        assert!(md.contains("## Page 2"));
        assert!(!md.contains("C002"));
        assert!(md.contains("2 claims · 📊 1 findings · 💡 1 hypotheses"), "{md}");
        assert!(md.contains("2 more claim(s)"));
        assert!(md.find("## Page 2").unwrap() < md.find("## Page 3").unwrap());
    }

    #[test]
    fn digest_lists_evidence_and_limitations() {
        let mut r = report();
        r.claims[0].evidence.base_label = Some("Adults 18-65".into());
        r.claims[0].evidence.data_type = DataType::Quantitative;
        r.claims[3].ambiguity_flags =
            BTreeSet::from([FLAG_MISSING_BASE.to_string(), "unspecified_method".to_string()]);
        r.claims[3].classification_rationale = Some("Downgraded from finding.".into());

        let md = render_digest(&r, &RenderFilterConfig::default());
        assert!(
            md.contains("  - Evidence: quantitative · base: Adults 18-65 · relevance 0.85"),
            "{md}"
        );
        assert!(
            md.contains(
                "  - ⚠️ Limitations: no base/N reported; method not specified; Downgraded from finding."
            ),
            "{md}"
        );
        // A well-based finding has nothing to qualify.
        let c001 = &md[md.find("`C001`").unwrap()..];
        assert!(!c001.contains("Limitations"), "{md}");
    }

    #[test]
    fn log_is_never_filtered() {
        let r = report();
        let log = render_log(&r).unwrap();
        let claim_lines = log
            .lines()
            .filter(|l| l.contains("\"type\":\"claim\""))
            .count();
        assert_eq!(claim_lines, 4);
        assert!(log.lines().next().unwrap().contains("\"type\":\"meta\""));
        assert!(log.lines().last().unwrap().contains("\"type\":\"summary\""));
    }

    #[test]
    fn log_reads_back() {
        let r = report();
        let back = parse_log(&render_log(&r).unwrap()).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn quarantine_reason_keeps_its_kind_in_the_log() {
        let mut r = report();
        r.claims[2].error = Some(ItemError::Timeout { secs: 60 });
        let log = render_log(&r).unwrap();
        assert!(log.contains("\"error\":{\"kind\":\"timeout\",\"secs\":60}"), "{log}");
        let back = parse_log(&log).unwrap();
        assert_eq!(back.claims[2].error, Some(ItemError::Timeout { secs: 60 }));
    }

    #[test]
    fn log_without_meta_is_rejected() {
        let err = parse_log("{\"type\":\"summary\",\"counts\":{}}\n").unwrap_err();
        assert!(matches!(err, InsightsError::LogParse { .. }));
        let err = parse_log("{\"type\":\"meta\"").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn empty_digest_says_so() {
        let filter = RenderFilterConfig {
            relevance_threshold: 1.0,
            insight_filter: InsightFilter::All,
        };
        let md = render_digest(&report(), &filter);
        assert!(md.contains("No claims match"));
    }

    #[tokio::test]
    async fn files_are_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("study_analysis.ndjson");
        write_log(&report(), &path).await.unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("out").join("study_analysis.ndjson.tmp").exists());
        let back = read_log(&path).await.unwrap();
        assert_eq!(back.claims.len(), 4);
    }
}
