//! Configuration types for document analysis.
//!
//! All behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`] or loaded from a JSON file with
//! [`ConfigFile::load`]. Each component receives only its own section
//! ([`FilterConfig`], [`DetectorConfig`], [`RenderFilterConfig`]) as an explicit
//! parameter; nothing reads configuration from ambient state.
//!
//! Every threshold is validated once, in [`AnalysisConfigBuilder::build`].
//! A bad value is a misconfigured run, not a transient condition, so it is
//! fatal before any page is touched.

use crate::error::InsightsError;
use crate::output::Classification;
use crate::pipeline::llm::CancelFlag;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Upper bound for [`AnalysisConfig::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Upper bound for [`AnalysisConfig::retry_backoff_ms`] (one minute).
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

// ── Relevance filter ─────────────────────────────────────────────────────

/// Thresholds for the OCR-based relevance filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Minimum length of the normalised OCR text. Default: 10.
    pub min_chars: usize,
    /// Minimum digit characters in the raw OCR text. Default: 2.
    pub min_digits: usize,
    /// Minimum useful (alphabetic, non-ignored) words. Default: 2.
    pub min_words: usize,
    /// Reject images whose OCR text contains no digit at all. Default: false.
    pub require_numbers: bool,
    /// Words that never count as useful (logos, slide chrome, watermarks).
    pub ignore_words: Vec<String>,
    /// Images smaller than this on both sides skip OCR. Default: 100 px.
    pub min_dimension: u32,
    /// Images below this pixel area skip OCR. Default: 10 000 px².
    pub min_area: u64,
    /// Banners and rules beyond this long/short side ratio skip OCR. Default: 10.
    pub max_aspect_ratio: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_chars: 10,
            min_digits: 2,
            min_words: 2,
            require_numbers: false,
            ignore_words: Vec::new(),
            min_dimension: 100,
            min_area: 10_000,
            max_aspect_ratio: 10.0,
        }
    }
}

impl FilterConfig {
    fn validate(&self) -> Result<(), InsightsError> {
        if !self.max_aspect_ratio.is_finite() || self.max_aspect_ratio < 1.0 {
            return Err(InsightsError::InvalidConfig(format!(
                "filter.max_aspect_ratio must be a finite value ≥ 1, got {}",
                self.max_aspect_ratio
            )));
        }
        if self.ignore_words.iter().any(|w| w.trim().is_empty()) {
            return Err(InsightsError::InvalidConfig(
                "filter.ignore_words must not contain empty entries".into(),
            ));
        }
        Ok(())
    }
}

// ── Composite detector ───────────────────────────────────────────────────

/// What to do with a text block inside the windows of several images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StraddlePolicy {
    /// Attach the block to every image it is near. (default)
    #[default]
    Shared,
    /// Attach the block only to the image whose centre is closest.
    Nearest,
}

/// Thresholds for the composite-chart detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Search margin around the image, in page points. Default: 50.
    pub proximity_margin: f32,
    /// Minimum raster width to be chart-shaped. Default: 200 px.
    pub min_chart_width: u32,
    /// Minimum raster height to be chart-shaped. Default: 150 px.
    pub min_chart_height: u32,
    /// Minimum share of the page area the image must cover. Default: 0.1.
    pub min_page_ratio: f32,
    /// Numeric tokens required in nearby text. Default: 3.
    pub min_nearby_numbers: usize,
    /// The image's own OCR must show fewer numeric tokens than this. Default: 2.
    pub ocr_number_threshold: usize,
    /// Handling of text blocks near several images. Default: shared.
    pub straddle: StraddlePolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            proximity_margin: 50.0,
            min_chart_width: 200,
            min_chart_height: 150,
            min_page_ratio: 0.1,
            min_nearby_numbers: 3,
            ocr_number_threshold: 2,
            straddle: StraddlePolicy::default(),
        }
    }
}

impl DetectorConfig {
    fn validate(&self) -> Result<(), InsightsError> {
        if !self.proximity_margin.is_finite() || self.proximity_margin < 0.0 {
            return Err(InsightsError::InvalidConfig(format!(
                "detector.proximity_margin must be a finite value ≥ 0, got {}",
                self.proximity_margin
            )));
        }
        if !(0.0..=1.0).contains(&self.min_page_ratio) {
            return Err(InsightsError::InvalidConfig(format!(
                "detector.min_page_ratio must be within [0, 1], got {}",
                self.min_page_ratio
            )));
        }
        Ok(())
    }
}

// ── Renderer ─────────────────────────────────────────────────────────────

/// Which classifications the digest shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightFilter {
    All,
    Findings,
    Hypotheses,
    #[serde(alias = "methodological_notes")]
    Observations,
    /// Findings and hypotheses, without methodological notes. (default)
    #[default]
    Actionable,
}

impl InsightFilter {
    pub fn matches(&self, classification: Classification) -> bool {
        use Classification::*;
        match self {
            InsightFilter::All => true,
            InsightFilter::Findings => classification == Finding,
            InsightFilter::Hypotheses => classification == Hypothesis,
            InsightFilter::Observations => classification == MethodologicalNote,
            InsightFilter::Actionable => matches!(classification, Finding | Hypothesis),
        }
    }

    /// Human-readable description used in the digest header.
    pub fn describe(&self) -> &'static str {
        match self {
            InsightFilter::All => "All claims",
            InsightFilter::Findings => "Findings only",
            InsightFilter::Hypotheses => "Hypotheses only",
            InsightFilter::Observations => "Methodological notes only",
            InsightFilter::Actionable => "Findings + hypotheses (no methodological notes)",
        }
    }
}

impl FromStr for InsightFilter {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(InsightFilter::All),
            "findings" => Ok(InsightFilter::Findings),
            "hypotheses" => Ok(InsightFilter::Hypotheses),
            "observations" | "methodological_notes" => Ok(InsightFilter::Observations),
            "actionable" => Ok(InsightFilter::Actionable),
            other => Err(InsightsError::InvalidConfig(format!(
                "unknown insight_filter '{other}' (expected all, findings, hypotheses, observations or actionable)"
            ))),
        }
    }
}

impl fmt::Display for InsightFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InsightFilter::All => "all",
            InsightFilter::Findings => "findings",
            InsightFilter::Hypotheses => "hypotheses",
            InsightFilter::Observations => "observations",
            InsightFilter::Actionable => "actionable",
        };
        f.write_str(s)
    }
}

/// Controls what the human digest shows. Never affects the structured log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderFilterConfig {
    /// Claims scoring below this are left out of the digest. Default: 0.5.
    pub relevance_threshold: f32,
    /// Default: actionable.
    pub insight_filter: InsightFilter,
}

impl Default for RenderFilterConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.5,
            insight_filter: InsightFilter::default(),
        }
    }
}

impl RenderFilterConfig {
    pub fn validate(&self) -> Result<(), InsightsError> {
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(InsightsError::InvalidConfig(format!(
                "render.relevance_threshold must be within [0, 1], got {}",
                self.relevance_threshold
            )));
        }
        Ok(())
    }
}

// ── Aggregation ──────────────────────────────────────────────────────────

/// What the aggregator does with a result it cannot use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantinePolicy {
    /// Record an error-marker claim in its place. (default)
    #[default]
    Record,
    /// Discard it; only the meta counters remember it.
    Drop,
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Configuration for analysing one document.
///
/// # Example
/// ```rust
/// use edgequake_insights::{AnalysisConfig, InsightFilter};
///
/// let config = AnalysisConfig::builder()
///     .concurrency(4)
///     .insight_filter(InsightFilter::Findings)
///     .relevance_threshold(0.6)
///     .build()
///     .unwrap();
/// assert_eq!(config.render.relevance_threshold, 0.6);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    pub filter: FilterConfig,
    pub detector: DetectorConfig,
    pub render: RenderFilterConfig,

    /// Maximum concurrent model calls. Default: 4.
    ///
    /// Upstream rate limits, not CPU, bound this pool.
    pub concurrency: usize,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per item. Default: 4096.
    pub max_tokens: usize,

    /// Retries per model call on failure. Default: 3, at most [`MAX_RETRIES`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500,
    /// at most [`MAX_RETRY_BACKOFF_MS`].
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Custom system prompt for chart analysis. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Domain briefing appended to every prompt (sector vocabulary, metrics).
    pub domain_context: Option<String>,

    /// Also send each page's selectable text to the model. Default: false.
    pub analyze_page_text: bool,

    /// Dispatch filter-rejected images the detector finds composite. Default: true.
    pub rescue_composites: bool,

    /// Handling of malformed model results. Default: record.
    pub quarantine: QuarantinePolicy,

    /// Tesseract language string. Default: "spa+eng".
    pub ocr_language: String,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,

    /// Optional cancellation switch; once raised no new model call starts.
    pub cancel: Option<CancelFlag>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            detector: DetectorConfig::default(),
            render: RenderFilterConfig::default(),
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 90,
            system_prompt: None,
            domain_context: None,
            analyze_page_text: false,
            rescue_composites: true,
            quarantine: QuarantinePolicy::default(),
            ocr_language: "spa+eng".to_string(),
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("filter", &self.filter)
            .field("detector", &self.detector)
            .field("render", &self.render)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("analyze_page_text", &self.analyze_page_text)
            .field("rescue_composites", &self.rescue_composites)
            .field("quarantine", &self.quarantine)
            .field("ocr_language", &self.ocr_language)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn detector(mut self, detector: DetectorConfig) -> Self {
        self.config.detector = detector;
        self
    }

    pub fn render(mut self, render: RenderFilterConfig) -> Self {
        self.config.render = render;
        self
    }

    pub fn relevance_threshold(mut self, threshold: f32) -> Self {
        self.config.render.relevance_threshold = threshold;
        self
    }

    pub fn insight_filter(mut self, filter: InsightFilter) -> Self {
        self.config.render.insight_filter = filter;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn domain_context(mut self, context: impl Into<String>) -> Self {
        self.config.domain_context = Some(context.into());
        self
    }

    pub fn analyze_page_text(mut self, v: bool) -> Self {
        self.config.analyze_page_text = v;
        self
    }

    pub fn rescue_composites(mut self, v: bool) -> Self {
        self.config.rescue_composites = v;
        self
    }

    pub fn quarantine(mut self, policy: QuarantinePolicy) -> Self {
        self.config.quarantine = policy;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating every threshold.
    pub fn build(self) -> Result<AnalysisConfig, InsightsError> {
        let c = &self.config;
        c.filter.validate()?;
        c.detector.validate()?;
        c.render.validate()?;
        if c.concurrency == 0 {
            return Err(InsightsError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(InsightsError::InvalidConfig("ocr_language must not be empty".into()));
        }
        if c.max_retries > MAX_RETRIES {
            return Err(InsightsError::InvalidConfig(format!(
                "max_retries must be ≤ {MAX_RETRIES}, got {}",
                c.max_retries
            )));
        }
        if c.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(InsightsError::InvalidConfig(format!(
                "retry_backoff_ms must be ≤ {MAX_RETRY_BACKOFF_MS}, got {}",
                c.retry_backoff_ms
            )));
        }
        Ok(self.config)
    }
}

// ── JSON config file ─────────────────────────────────────────────────────

/// Dispatcher and pipeline knobs of the JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisSection {
    pub concurrency: Option<usize>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub api_timeout_secs: Option<u64>,
    pub analyze_page_text: Option<bool>,
    pub rescue_composites: Option<bool>,
    pub quarantine: Option<QuarantinePolicy>,
    pub ocr_language: Option<String>,
    pub download_timeout_secs: Option<u64>,
}

/// On-disk configuration, one section per component.
///
/// ```json
/// {
///   "filter":   { "min_chars": 12, "ignore_words": ["confidential"] },
///   "detector": { "proximity_margin": 40 },
///   "render":   { "relevance_threshold": 0.6, "insight_filter": "findings" },
///   "analysis": { "concurrency": 6, "provider": "openai", "model": "gpt-4.1-mini" }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub filter: FilterConfig,
    pub detector: DetectorConfig,
    pub render: RenderFilterConfig,
    pub analysis: AnalysisSection,
}

impl ConfigFile {
    /// Read and parse a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, InsightsError> {
        let raw = std::fs::read_to_string(path).map_err(|e| InsightsError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            InsightsError::InvalidConfig(detail) => InsightsError::ConfigLoad {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, InsightsError> {
        serde_json::from_str(raw).map_err(|e| InsightsError::InvalidConfig(e.to_string()))
    }

    /// Seed a builder with the file's values; callers may override further.
    pub fn into_builder(self) -> AnalysisConfigBuilder {
        let a = self.analysis;
        let mut b = AnalysisConfig::builder()
            .filter(self.filter)
            .detector(self.detector)
            .render(self.render);
        if let Some(n) = a.concurrency {
            b = b.concurrency(n);
        }
        if let Some(m) = a.model {
            b = b.model(m);
        }
        if let Some(p) = a.provider {
            b = b.provider_name(p);
        }
        if let Some(t) = a.temperature {
            b = b.temperature(t);
        }
        if let Some(n) = a.max_tokens {
            b = b.max_tokens(n);
        }
        if let Some(n) = a.max_retries {
            b = b.max_retries(n);
        }
        if let Some(ms) = a.retry_backoff_ms {
            b = b.retry_backoff_ms(ms);
        }
        if let Some(secs) = a.api_timeout_secs {
            b = b.api_timeout_secs(secs);
        }
        if let Some(v) = a.analyze_page_text {
            b = b.analyze_page_text(v);
        }
        if let Some(v) = a.rescue_composites {
            b = b.rescue_composites(v);
        }
        if let Some(q) = a.quarantine {
            b = b.quarantine(q);
        }
        if let Some(lang) = a.ocr_language {
            b = b.ocr_language(lang);
        }
        if let Some(secs) = a.download_timeout_secs {
            b = b.download_timeout_secs(secs);
        }
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let c = AnalysisConfig::builder().build().unwrap();
        assert_eq!(c.filter.min_chars, 10);
        assert_eq!(c.detector.proximity_margin, 50.0);
        assert_eq!(c.render.insight_filter, InsightFilter::Actionable);
        assert_eq!(c.quarantine, QuarantinePolicy::Record);
    }

    #[test]
    fn insight_filter_table() {
        use Classification::*;
        let cases = [
            (InsightFilter::All, [true, true, true]),
            (InsightFilter::Findings, [true, false, false]),
            (InsightFilter::Hypotheses, [false, true, false]),
            (InsightFilter::Observations, [false, false, true]),
            (InsightFilter::Actionable, [true, true, false]),
        ];
        for (filter, expected) in cases {
            let got = [
                filter.matches(Finding),
                filter.matches(Hypothesis),
                filter.matches(MethodologicalNote),
            ];
            assert_eq!(got, expected, "{filter}");
        }
    }

    #[test]
    fn unknown_insight_filter_is_a_config_error() {
        let err = "everything".parse::<InsightFilter>().unwrap_err();
        assert!(matches!(err, InsightsError::InvalidConfig(_)));
        assert_eq!(
            "methodological_notes".parse::<InsightFilter>().unwrap(),
            InsightFilter::Observations
        );
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let err = AnalysisConfig::builder()
            .relevance_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("relevance_threshold"));

        let err = AnalysisConfig::builder()
            .relevance_threshold(f32::NAN)
            .build()
            .unwrap_err();
        assert!(matches!(err, InsightsError::InvalidConfig(_)));
    }

    #[test]
    fn retry_limits_rejected() {
        let err = AnalysisConfig::builder().max_retries(65).build().unwrap_err();
        assert!(err.to_string().contains("max_retries"), "{err}");
        let err = AnalysisConfig::builder()
            .retry_backoff_ms(u64::MAX)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("retry_backoff_ms"), "{err}");
        assert!(AnalysisConfig::builder()
            .max_retries(MAX_RETRIES)
            .retry_backoff_ms(MAX_RETRY_BACKOFF_MS)
            .build()
            .is_ok());
    }

    #[test]
    fn negative_margin_rejected() {
        let detector = DetectorConfig {
            proximity_margin: -1.0,
            ..Default::default()
        };
        assert!(AnalysisConfig::builder().detector(detector).build().is_err());
    }

    #[test]
    fn config_file_overrides_sections() {
        let raw = r#"{
            "filter": { "min_chars": 12, "ignore_words": ["confidencial"] },
            "render": { "insight_filter": "findings" },
            "analysis": { "concurrency": 6, "quarantine": "drop" }
        }"#;
        let config = ConfigFile::from_json(raw).unwrap().into_builder().build().unwrap();
        assert_eq!(config.filter.min_chars, 12);
        assert_eq!(config.filter.min_digits, 2);
        assert_eq!(config.render.insight_filter, InsightFilter::Findings);
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.quarantine, QuarantinePolicy::Drop);
    }

    #[test]
    fn config_file_rejects_unknown_filter_value() {
        let raw = r#"{ "render": { "insight_filter": "everything" } }"#;
        assert!(ConfigFile::from_json(raw).is_err());
    }

    #[test]
    fn config_file_rejects_unknown_keys() {
        let raw = r#"{ "detector": { "proximity": 10 } }"#;
        assert!(ConfigFile::from_json(raw).is_err());
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ConfigFile::load(&path).unwrap_err();
        assert!(matches!(err, InsightsError::ConfigLoad { .. }));
    }
}
