//! Prompts for chart and page-text analysis.
//!
//! Callers can override the chart prompt via
//! [`crate::config::AnalysisConfig::system_prompt`]; the constants here are
//! used only when no override is provided. Both prompts ask for the same JSON
//! shape, which [`crate::pipeline::postprocess::parse_analysis`] reads.

/// Default system prompt for analysing one chart image.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a senior market-research analyst. You receive one image taken from a study report (a chart, table or infographic) and must extract the knowledge it carries as discrete, auditable claims.

Follow these rules precisely:

1. CLAIMS
   - One claim per distinct, self-contained statement supported by the image
   - Quote figures exactly as shown (percentages, counts, currencies)
   - Never invent data that is not visible

2. CLASSIFICATION (exactly one per claim)
   - "finding": backed by quantitative data with a stated base of at least 50 respondents
   - "hypothesis": exploratory, qualitative, or without a sufficient base; needs validation
   - "methodological_note": describes the study design, sample or scope rather than a result

3. EVIDENCE
   - sample_size: the base (N) printed on or next to the chart, or null when absent
   - data_type: "quantitative", "qualitative" or "mixed"
   - base_label: how the base is described (e.g. "Total respondents"), or null

4. RELEVANCE
   - relevance_score between 0 and 1: how useful the claim is for business decisions

5. OUTPUT FORMAT
   - Output ONLY one JSON object, no commentary, no Markdown fences:
{
  "chart_type": "bar|line|pie|table|infographic|other",
  "title": "chart title or null",
  "description": "one sentence describing the chart",
  "relevance_score": 0.0,
  "claims": [
    {
      "text": "...",
      "classification": "finding|hypothesis|methodological_note",
      "sample_size": null,
      "data_type": "quantitative",
      "base_label": null,
      "relevance_score": 0.0,
      "theme_tags": ["..."],
      "ambiguity_flags": [],
      "classification_rationale": "..."
    }
  ]
}"#;

/// System prompt for analysing a page's selectable text.
pub const TEXT_SYSTEM_PROMPT: &str = r#"You are a senior market-research analyst. You receive the selectable text of one page of a study report and must extract the knowledge it carries as discrete, auditable claims.

Apply the same rules as for charts: one self-contained statement per claim, figures quoted exactly, nothing invented. Classify each claim as "finding" (quantitative, base of at least 50), "hypothesis" (exploratory, qualitative or under-based) or "methodological_note" (study design, sample or scope). Report the base as sample_size when the text states it, otherwise null.

Output ONLY one JSON object, no commentary, no Markdown fences, with the keys "title", "description", "relevance_score" and "claims"; each claim has "text", "classification", "sample_size", "data_type", "base_label", "relevance_score", "theme_tags", "ambiguity_flags" and "classification_rationale"."#;

/// Appended to the system prompt when the caller supplies a domain briefing.
pub fn domain_context_suffix(context: &str) -> String {
    format!("\n\nDOMAIN CONTEXT\n{}", context.trim())
}

/// User message accompanying a chart image.
///
/// For composite charts the detector found the data labels in the page's
/// text layer; they are passed along so the model can read values the image
/// itself does not show.
pub fn chart_user_message(page_number: usize, nearby_text: Option<&str>) -> String {
    match nearby_text {
        Some(text) if !text.trim().is_empty() => format!(
            "Analyse this chart from page {page_number}.\n\n\
             The chart's values are printed next to it as page text, not inside the image:\n\
             \"\"\"{}\"\"\"\n\
             Use these values when they clearly belong to the chart.",
            text.trim()
        ),
        _ => format!("Analyse this chart from page {page_number}."),
    }
}

/// User message carrying a page's selectable text.
pub fn text_user_message(page_number: usize, text: &str) -> String {
    format!("Text of page {page_number}:\n\n\"\"\"{}\"\"\"", text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_message_includes_nearby_text() {
        let msg = chart_user_message(4, Some("26% 10% 23%"));
        assert!(msg.contains("page 4"));
        assert!(msg.contains("26% 10% 23%"));
    }

    #[test]
    fn chart_message_without_context() {
        let msg = chart_user_message(2, Some("   "));
        assert_eq!(msg, "Analyse this chart from page 2.");
    }

    #[test]
    fn prompts_ask_for_every_claim_field() {
        for field in ["classification", "sample_size", "relevance_score", "theme_tags"] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(field), "{field}");
            assert!(TEXT_SYSTEM_PROMPT.contains(field), "{field}");
        }
    }
}
