//! Analysis dispatch: one independent model call per job, bounded concurrency.
//!
//! The model is reached through the [`AnalysisBackend`] seam. Production uses
//! [`LlmBackend`], which builds vision messages for an edgequake-llm provider;
//! tests plug in a scripted backend. Prompt text lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! spreads the retries out: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. Each attempt is bounded by `api_timeout_secs`.
//!
//! ## Ordering
//!
//! [`dispatch_all`] returns outcomes in completion order. Every outcome
//! carries its submission `seq`; the aggregator restores submission order.

use crate::config::AnalysisConfig;
use crate::document::ImageRef;
use crate::error::ItemError;
use crate::output::ClaimSource;
use crate::pipeline::encode::to_image_data;
use crate::progress::ProgressCallback;
use crate::prompts::{
    chart_user_message, domain_context_suffix, text_user_message, DEFAULT_SYSTEM_PROMPT,
    TEXT_SYSTEM_PROMPT,
};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Shared cancellation switch. Once raised, no new model call starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the model is asked to look at.
#[derive(Clone)]
pub enum AnalysisKind {
    /// One image, optionally with the page text printed around it.
    Chart {
        png: Arc<Vec<u8>>,
        nearby_text: Option<String>,
        composite: bool,
    },
    /// A page's selectable text.
    PageText { text: String },
}

impl std::fmt::Debug for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisKind::Chart {
                png,
                nearby_text,
                composite,
            } => f
                .debug_struct("Chart")
                .field("png", &format_args!("<{} bytes>", png.len()))
                .field("nearby_text", nearby_text)
                .field("composite", composite)
                .finish(),
            AnalysisKind::PageText { text } => f
                .debug_struct("PageText")
                .field("text", &format_args!("<{} chars>", text.len()))
                .finish(),
        }
    }
}

/// One unit of work for the dispatcher. Owns everything the call needs.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Submission index; fixes the order of the resulting claims.
    pub seq: usize,
    pub page_number: usize,
    pub image_ref: Option<ImageRef>,
    pub kind: AnalysisKind,
}

impl AnalysisRequest {
    pub fn source(&self) -> ClaimSource {
        match self.kind {
            AnalysisKind::Chart { .. } => ClaimSource::Chart,
            AnalysisKind::PageText { .. } => ClaimSource::Text,
        }
    }

    pub fn composite(&self) -> bool {
        matches!(self.kind, AnalysisKind::Chart { composite: true, .. })
    }
}

/// The capability the dispatcher calls for every job.
///
/// Returns the raw model response; parsing happens in the aggregator so a
/// malformed answer is still attributable to its job.
pub trait AnalysisBackend: Send + Sync {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<String, ItemError>>;

    /// Model identifier recorded in the report metadata.
    fn model_name(&self) -> Option<String> {
        None
    }
}

/// Result of one dispatched job, in whatever order it finished.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub seq: usize,
    pub page_number: usize,
    pub image_ref: Option<ImageRef>,
    pub source: ClaimSource,
    pub composite: bool,
    pub result: Result<String, ItemError>,
}

/// Run every request through `backend` with at most `concurrency` in flight.
///
/// A failing job never affects the others. When `cancel` is raised, jobs
/// that have not started yet resolve to [`ItemError::Cancelled`] without
/// calling the backend; jobs in flight run to completion.
pub async fn dispatch_all(
    backend: &dyn AnalysisBackend,
    requests: Vec<AnalysisRequest>,
    concurrency: usize,
    cancel: Option<&CancelFlag>,
    progress: Option<&ProgressCallback>,
) -> Vec<JobOutcome> {
    let total = requests.len();
    info!("Dispatching {} jobs (concurrency {})", total, concurrency);
    if let Some(cb) = progress {
        cb.on_dispatch_start(total);
    }

    stream::iter(requests.into_iter().map(|request| async move {
        let seq = request.seq;
        let page_number = request.page_number;
        let image_ref = request.image_ref;
        let source = request.source();
        let composite = request.composite();

        let result = if cancel.is_some_and(CancelFlag::is_cancelled) {
            debug!("Job {}: cancelled before dispatch", seq);
            Err(ItemError::Cancelled)
        } else {
            if let Some(cb) = progress {
                cb.on_item_start(seq, total);
            }
            backend.analyze(request).await
        };

        if let Some(cb) = progress {
            match &result {
                Ok(response) => cb.on_item_complete(seq, total, response.len()),
                Err(e) => cb.on_item_error(seq, total, e.to_string()),
            }
        }

        JobOutcome {
            seq,
            page_number,
            image_ref,
            source,
            composite,
            result,
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}

/// [`AnalysisBackend`] over an edgequake-llm vision provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    model: Option<String>,
    chart_prompt: String,
    text_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        let suffix = config
            .domain_context
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(domain_context_suffix)
            .unwrap_or_default();
        let chart_base = config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        Self {
            provider,
            model: config.model.clone(),
            chart_prompt: format!("{chart_base}{suffix}"),
            text_prompt: format!("{TEXT_SYSTEM_PROMPT}{suffix}"),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    /// Override the model label reported in the log metadata.
    pub fn with_model_name(mut self, model: Option<String>) -> Self {
        if model.is_some() {
            self.model = model;
        }
        self
    }

    /// Message layout: system prompt, then one user turn carrying either
    /// the image plus any nearby page text, or the page text alone.
    fn build_messages(&self, request: &AnalysisRequest) -> Vec<ChatMessage> {
        match &request.kind {
            AnalysisKind::Chart {
                png, nearby_text, ..
            } => vec![
                ChatMessage::system(&self.chart_prompt),
                ChatMessage::user_with_images(
                    chart_user_message(request.page_number, nearby_text.as_deref()),
                    vec![to_image_data(png)],
                ),
            ],
            AnalysisKind::PageText { text } => vec![
                ChatMessage::system(&self.text_prompt),
                ChatMessage::user(text_user_message(request.page_number, text)),
            ],
        }
    }

    async fn call(&self, request: AnalysisRequest) -> Result<String, ItemError> {
        let start = Instant::now();
        let label = request
            .image_ref
            .map(|r| r.to_string())
            .unwrap_or_else(|| format!("p{}-text", request.page_number));
        let messages = self.build_messages(&request);

        let mut last_err: Option<ItemError> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    label, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&self.options));
            match timeout(Duration::from_secs(self.api_timeout_secs), call).await {
                Ok(Ok(response)) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        label,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed — {}", label, attempt + 1, e);
                    last_err = Some(ItemError::LlmFailed {
                        retries: self.max_retries,
                        detail: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {}s",
                        label,
                        attempt + 1,
                        self.api_timeout_secs
                    );
                    last_err = Some(ItemError::Timeout {
                        secs: self.api_timeout_secs,
                    });
                }
            }
        }

        Err(last_err.unwrap_or(ItemError::LlmFailed {
            retries: self.max_retries,
            detail: "Unknown error".to_string(),
        }))
    }
}

impl AnalysisBackend for LlmBackend {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<String, ItemError>> {
        Box::pin(self.call(request))
    }

    fn model_name(&self) -> Option<String> {
        self.model.clone()
    }
}

/// Build `CompletionOptions` from the analysis config.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base.saturating_mul(factor)
}
