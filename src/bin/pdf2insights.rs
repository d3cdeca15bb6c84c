//! CLI binary for edgequake-insights.
//!
//! A thin shim over the library crate that maps CLI flags (on top of an
//! optional JSON config file) to `AnalysisConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_insights::{
    analyze_to_files, inspect, render_from_log, AnalysisConfig, AnalysisConfigBuilder,
    AnalysisProgressCallback, CancelFlag, ConfigFile, InsightFilter, OutputFiles,
    ProgressCallback, QuarantinePolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while pages are triaged, then a bar over the
/// model jobs. Jobs finish out of order, so start times are keyed by `seq`.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} jobs  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, seq: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&seq))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_pages: usize, total_images: usize) {
        self.bar.set_prefix("Triage");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{total_pages} pages, {total_images} images extracted"
            ))
        ));
    }

    fn on_page_triaged(&self, page_num: usize, jobs: usize) {
        self.bar
            .set_message(format!("page {page_num}: {jobs} job(s)"));
    }

    fn on_dispatch_start(&self, total_jobs: usize) {
        self.activate_bar(total_jobs);
    }

    fn on_item_start(&self, seq: usize, _total_jobs: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(seq, Instant::now());
        }
        self.bar.set_message(format!("job {}", seq + 1));
    }

    fn on_item_complete(&self, seq: usize, total_jobs: usize, response_len: usize) {
        let secs = self.elapsed_secs(seq);
        self.bar.println(format!(
            "  {} Job {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            seq + 1,
            total_jobs,
            dim(&format!("{response_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, seq: usize, total_jobs: usize, error: String) {
        let secs = self.elapsed_secs(seq);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };

        self.bar.println(format!(
            "  {} Job {:>3}/{:<3}  {}  {}",
            red("✗"),
            seq + 1,
            total_jobs,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_analysis_complete(&self, total_claims: usize, quarantined: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        if errors == 0 && quarantined == 0 {
            eprintln!(
                "{} {} claims extracted",
                green("✔"),
                bold(&total_claims.to_string())
            );
        } else {
            eprintln!(
                "{} {} claims extracted  ({} quarantined, {} failed jobs)",
                cyan("⚠"),
                bold(&total_claims.to_string()),
                red(&quarantined.to_string()),
                red(&errors.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a report, write log + digest into ./out
  pdf2insights survey.pdf -o out

  # Slide decks are converted with LibreOffice first
  pdf2insights results.pptx -o out

  # Only findings with relevance ≥ 0.7
  pdf2insights survey.pdf --insight-filter findings --relevance-threshold 0.7

  # Re-render the digest from an existing log (no model calls)
  pdf2insights --from-log out/survey_analysis.ndjson --insight-filter all

  # See which images would be analysed, without calling the model
  pdf2insights survey.pdf --dry-run

  # Thresholds from a JSON config file, flags override it
  pdf2insights survey.pdf --config insights.json --concurrency 8

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter (overrides -v / -q)

EXTERNAL TOOLS:
  tesseract               OCR for the relevance filter (apt install tesseract-ocr tesseract-ocr-spa)
  soffice                 LibreOffice, only for .pptx/.ppt/.odp/.docx input
"#;

/// Extract classified claims from the charts in PDF reports and slide decks.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2insights",
    version,
    about = "Extract classified claims from charts in PDFs and slide decks using OCR and Vision LLMs",
    long_about = "Triage every image of a PDF or slide deck with OCR, pair charts with the \
numbers printed around them, ask a Vision Language Model for structured claims, and write a \
complete NDJSON analysis log plus a filtered Markdown digest.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF/PPTX file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "from_log")]
    input: Option<String>,

    /// Directory for `<stem>_analysis.ndjson` and `insights-<stem>.md`.
    #[arg(short, long, env = "PDF2INSIGHTS_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// JSON configuration file (filter / detector / render / analysis sections).
    #[arg(long, env = "PDF2INSIGHTS_CONFIG")]
    config: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Number of concurrent VLM API calls.
    #[arg(short, long, env = "PDF2INSIGHTS_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Minimum relevance score (0.0–1.0) for a claim to appear in the digest.
    #[arg(long, env = "PDF2INSIGHTS_RELEVANCE")]
    relevance_threshold: Option<f32>,

    /// Digest filter: all, findings, hypotheses, observations, actionable.
    #[arg(long, env = "PDF2INSIGHTS_FILTER", value_parser = parse_insight_filter)]
    insight_filter: Option<InsightFilter>,

    /// Text file with domain context appended to the system prompt.
    #[arg(long, env = "PDF2INSIGHTS_DOMAIN_CONTEXT")]
    domain_context: Option<PathBuf>,

    /// Text file with a custom chart system prompt.
    #[arg(long, env = "PDF2INSIGHTS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Also send each page's selectable text to the model.
    #[arg(long)]
    analyze_text: bool,

    /// Do not dispatch composite charts the OCR filter rejected.
    #[arg(long)]
    no_rescue: bool,

    /// Discard malformed model results instead of recording them.
    #[arg(long)]
    drop_malformed: bool,

    /// Tesseract language(s), e.g. `spa+eng`.
    #[arg(long, env = "PDF2INSIGHTS_OCR_LANG")]
    ocr_lang: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2INSIGHTS_PASSWORD")]
    password: Option<String>,

    /// Retries per model call.
    #[arg(long, env = "PDF2INSIGHTS_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2INSIGHTS_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2INSIGHTS_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    /// Re-render the digest from an existing analysis log.
    #[arg(long, conflicts_with_all = ["dry_run", "input"])]
    from_log: Option<PathBuf>,

    /// Triage only: report which images would be analysed, no model calls.
    #[arg(long)]
    dry_run: bool,

    /// Print the dry-run triage as JSON.
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2INSIGHTS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2INSIGHTS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2INSIGHTS_QUIET")]
    quiet: bool,
}

fn parse_insight_filter(s: &str) -> std::result::Result<InsightFilter, String> {
    s.parse::<InsightFilter>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.dry_run && cli.from_log.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Re-render mode ───────────────────────────────────────────────────
    if let Some(ref log_path) = cli.from_log {
        let config = build_config(&cli, None, None).await?;
        let digest = digest_path_for_log(log_path, &cli.output_dir);
        let report = render_from_log(log_path, &digest, &config.render)
            .await
            .context("Failed to re-render digest")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} claims in log  →  {}",
                green("✔"),
                report.claims.len(),
                bold(&digest.display().to_string()),
            );
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input file or URL is required")?;

    // ── Dry-run mode ─────────────────────────────────────────────────────
    if cli.dry_run {
        let config = build_config(&cli, None, None).await?;
        let triage = inspect(&input, &config)
            .await
            .context("Failed to triage document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&triage.pages)
                    .context("Failed to serialise triage")?
            );
        } else {
            for page in &triage.pages {
                for img in &page.images {
                    let verdict = if img.rescued {
                        cyan("rescued")
                    } else if img.dispatched {
                        green("analyse")
                    } else {
                        dim("skip")
                    };
                    let composite = img
                        .candidate
                        .as_ref()
                        .is_some_and(|c| c.composite);
                    println!(
                        "{:<10} {:<8} {:<16} {}",
                        img.image_ref.to_string(),
                        verdict,
                        img.filter.reason.as_str(),
                        if composite { "composite" } else { "" }
                    );
                }
                if page.text_submitted {
                    println!("{:<10} {}", format!("p{}-text", page.page_number), green("analyse"));
                }
            }
            let s = &triage.stats;
            eprintln!(
                "{} pages, {} images: {} kept, {} rescued, {} decorative, {} OCR failures, {} unreadable → {} jobs",
                s.total_pages,
                s.images_extracted,
                s.images_kept,
                s.images_rescued,
                s.images_decorative,
                s.images_ocr_failed,
                s.images_unreadable,
                s.items_submitted
            );
        }
        return Ok(());
    }

    // ── Cancellation ─────────────────────────────────────────────────────
    // First Ctrl-C stops new model calls; the partial report is still written.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{} interrupted: finishing in-flight calls, writing partial report",
                    cyan("⚠")
                );
                cancel.cancel();
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb, Some(cancel)).await?;

    // ── Run analysis ─────────────────────────────────────────────────────
    let start = Instant::now();
    let (output, files) = analyze_to_files(&input, &cli.output_dir, &config)
        .await
        .context("Analysis failed")?;

    if !cli.quiet {
        let summary = output.report.summary();
        let stats = &output.report.meta.extraction;
        eprintln!(
            "{}  {} claims  ({} findings, {} hypotheses, {} methodological notes)  {}ms",
            if summary.counts.quarantined == 0 && stats.items_cancelled == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            summary.counts.total_claims,
            summary.counts.findings,
            summary.counts.hypotheses,
            summary.counts.methodological_notes,
            start.elapsed().as_millis(),
        );
        if stats.items_cancelled > 0 {
            eprintln!(
                "   {} job(s) cancelled before dispatch",
                red(&stats.items_cancelled.to_string())
            );
        }
        eprintln!(
            "   log     {}\n   digest  {}",
            dim(&files.log.display().to_string()),
            bold(&files.digest.display().to_string()),
        );
    }

    Ok(())
}

/// `<dir>/insights-<stem>.md` for a log named `<stem>_analysis.ndjson`.
fn digest_path_for_log(log_path: &Path, output_dir: &Path) -> PathBuf {
    let name = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let stem = name
        .strip_suffix("_analysis.ndjson")
        .or_else(|| name.strip_suffix(".ndjson"))
        .unwrap_or(name);
    OutputFiles::for_stem(output_dir, stem).digest
}

/// Map the config file and CLI args to `AnalysisConfig`. Flags win.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: Option<CancelFlag>,
) -> Result<AnalysisConfig> {
    let mut builder: AnalysisConfigBuilder = match cli.config {
        Some(ref path) => ConfigFile::load(path)
            .context("Failed to load configuration file")?
            .into_builder(),
        None => AnalysisConfig::builder(),
    };

    if let Some(ref path) = cli.domain_context {
        let context = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read domain context from {:?}", path))?;
        builder = builder.domain_context(context);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(t) = cli.relevance_threshold {
        builder = builder.relevance_threshold(t);
    }
    if let Some(f) = cli.insight_filter {
        builder = builder.insight_filter(f);
    }
    if let Some(ref lang) = cli.ocr_lang {
        builder = builder.ocr_language(lang.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(n) = cli.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(secs) = cli.download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if cli.analyze_text {
        builder = builder.analyze_page_text(true);
    }
    if cli.no_rescue {
        builder = builder.rescue_composites(false);
    }
    if cli.drop_malformed {
        builder = builder.quarantine(QuarantinePolicy::Drop);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    if let Some(flag) = cancel {
        builder = builder.cancel_flag(flag);
    }

    builder.build().context("Invalid configuration")
}
