//! CLI binary for quizgrade.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GradingConfig` and prints reports.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use quizgrade::{
    analyze_consistency, extract_key, grade, grade_stream, grade_with_key, load_key, save_key,
    GradingConfig, GradingProgressCallback, GradingReport, KeyRecord, MatchStrategy, ProgressCallback,
    Side,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner plus one log line per extracted page.
///
/// Key and submission pages are read concurrently, so lines may arrive in
/// either order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new(total_submissions: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total_submissions as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos}/{len} graded  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Grading");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl GradingProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, side: Side) {
        self.bar.set_message(format!("reading {side}…"));
    }

    fn on_extraction_complete(&self, side: Side, questions: usize) {
        self.bar.println(format!(
            "  {} {:<11} {}",
            green("✓"),
            side.to_string(),
            dim(&format!("{questions} questions"))
        ));
    }

    fn on_extraction_error(&self, side: Side, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<11} {}", red("✗"), side.to_string(), red(&msg)));
    }

    fn on_grading_complete(&self, _entries: usize) {
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Grade one quiz against an answer-key photo
  quizgrade --key key.jpg student.jpg

  # Extract the key once, then grade a class against it
  quizgrade --key key.jpg --extract-key-only -o quiz1-key.json
  quizgrade --key-json quiz1-key.json alice.jpg bob.jpg carol.jpg

  # JSON report to a file
  quizgrade --key-json quiz1-key.json --json student.jpg -o report.json

  # How stable is the grade? Re-grade one quiz five times
  quizgrade --key-json quiz1-key.json --runs 5 student.jpg

  # Literal matching only
  quizgrade --strategy exact --key key.jpg student.jpg

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  QUIZGRADE_*             Any flag, e.g. QUIZGRADE_CONCURRENCY=8
"#;

/// Grade photographed quizzes against an answer key using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "quizgrade",
    version,
    about = "Grade photographed quizzes against an answer key using Vision LLMs",
    long_about = "Read an answer-key page and completed quiz pages (local images or URLs) with a \
Vision Language Model, then grade every answer against the key. Supports OpenAI, Anthropic, \
Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Completed quiz images (local paths or HTTP/HTTPS URLs).
    submissions: Vec<String>,

    /// Answer-key image (local path or URL).
    #[arg(long, env = "QUIZGRADE_KEY", conflicts_with = "key_json")]
    key: Option<String>,

    /// Previously extracted answer key (JSON written by --extract-key-only).
    #[arg(long, env = "QUIZGRADE_KEY_JSON")]
    key_json: Option<PathBuf>,

    /// Only extract the answer key and write it as JSON.
    #[arg(long, requires = "key")]
    extract_key_only: bool,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "QUIZGRADE_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// How answers are compared with the key.
    #[arg(long, env = "QUIZGRADE_STRATEGY", value_enum, default_value = "normalized")]
    strategy: StrategyArg,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "QUIZGRADE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "QUIZGRADE_MAX_TOKENS", default_value_t = 2500)]
    max_tokens: usize,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "QUIZGRADE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries per page on LLM failure.
    #[arg(long, env = "QUIZGRADE_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Submissions graded at once.
    #[arg(short, long, env = "QUIZGRADE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "QUIZGRADE_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Text file with a custom answer-key instruction.
    #[arg(long, env = "QUIZGRADE_KEY_PROMPT")]
    key_prompt: Option<PathBuf>,

    /// Text file with a custom submission instruction.
    #[arg(long, env = "QUIZGRADE_SUBMISSION_PROMPT")]
    submission_prompt: Option<PathBuf>,

    /// Grade a single submission N times and report grading consistency.
    #[arg(long, value_parser = clap::value_parser!(u32).range(2..=50))]
    runs: Option<u32>,

    /// Output JSON instead of the text summary.
    #[arg(long, env = "QUIZGRADE_JSON")]
    json: bool,

    /// Disable progress output.
    #[arg(long, env = "QUIZGRADE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "QUIZGRADE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "QUIZGRADE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Exact,
    Normalized,
}

impl From<StrategyArg> for MatchStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Exact => MatchStrategy::Exact,
            StrategyArg::Normalized => MatchStrategy::Normalized,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO-level library logs while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let total = match cli.runs {
        Some(n) => n as usize,
        None => cli.submissions.len(),
    };
    let progress = show_progress.then(|| CliProgressCallback::new(total));
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback)).await?;

    let outcome = run(&cli, &config).await;
    if let Some(ref p) = progress {
        p.finish();
    }
    outcome
}

async fn run(cli: &Cli, config: &GradingConfig) -> Result<()> {
    // ── Key-only mode ────────────────────────────────────────────────────
    if cli.extract_key_only {
        let input = cli.key.as_deref().context("--extract-key-only needs --key")?;
        let key = extract_key(input, config)
            .await
            .context("Answer-key extraction failed")?;
        match cli.output {
            Some(ref path) => {
                save_key(&key, path).await.context("Failed to save answer key")?;
                if !cli.quiet {
                    eprintln!(
                        "{} {} questions  →  {}",
                        green("✔"),
                        key.questions.len(),
                        bold(&path.display().to_string())
                    );
                }
            }
            None => emit(&serde_json::to_string_pretty(&key)?, None).await?,
        }
        return Ok(());
    }

    if cli.submissions.is_empty() {
        anyhow::bail!("No submission images given");
    }

    // ── Consistency mode ─────────────────────────────────────────────────
    if let Some(runs) = cli.runs {
        let [submission] = cli.submissions.as_slice() else {
            anyhow::bail!("--runs grades exactly one submission");
        };
        let key = resolve_key(cli, config).await?;
        let mut reports = Vec::with_capacity(runs as usize);
        for i in 0..runs {
            let report = grade_with_key(&key, submission, config)
                .await
                .with_context(|| format!("Grading run {} of {} failed", i + 1, runs))?;
            reports.push(report);
        }
        let analysis = analyze_consistency(&reports).context("No grading runs completed")?;
        let text = if cli.json {
            serde_json::to_string_pretty(&analysis)?
        } else {
            analysis.to_text()
        };
        return emit(&text, cli.output.as_deref()).await;
    }

    // ── Single submission ────────────────────────────────────────────────
    if let [submission] = cli.submissions.as_slice() {
        let report = match (&cli.key, &cli.key_json) {
            // Both pages are read concurrently.
            (Some(key_input), None) => grade(key_input, submission, config).await,
            _ => grade_with_key(&resolve_key(cli, config).await?, submission, config).await,
        }
        .context("Grading failed")?;

        emit(&render_report(&report, cli.json)?, cli.output.as_deref()).await?;
        if !cli.quiet {
            print_score_line(submission, &report);
        }
        return Ok(());
    }

    // ── Batch ────────────────────────────────────────────────────────────
    let key = resolve_key(cli, config).await?;
    let mut stream = grade_stream(&key, cli.submissions.iter().cloned(), config)
        .context("Failed to start batch grading")?;

    let mut texts = Vec::new();
    let mut json_items = Vec::new();
    let mut failed = 0usize;
    while let Some((input, result)) = stream.next().await {
        match result {
            Ok(report) => {
                if !cli.quiet {
                    print_score_line(&input, &report);
                }
                if cli.json {
                    json_items.push(serde_json::json!({ "input": input, "report": report }));
                } else {
                    texts.push(format!("# {input}\n{}", report.to_text()));
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}  {}", red("✘"), input, red(&e.to_string()));
                if cli.json {
                    json_items.push(serde_json::json!({ "input": input, "error": e.to_string() }));
                }
            }
        }
    }

    let out = if cli.json {
        serde_json::to_string_pretty(&json_items)?
    } else {
        texts.join("\n")
    };
    emit(&out, cli.output.as_deref()).await?;

    if failed > 0 {
        anyhow::bail!("{} of {} submissions failed", failed, cli.submissions.len());
    }
    Ok(())
}

/// The answer key from `--key-json`, or extracted from `--key`.
async fn resolve_key(cli: &Cli, config: &GradingConfig) -> Result<KeyRecord> {
    match (&cli.key, &cli.key_json) {
        (_, Some(path)) => load_key(path)
            .await
            .with_context(|| format!("Failed to load answer key from {:?}", path)),
        (Some(input), None) => extract_key(input, config)
            .await
            .context("Answer-key extraction failed"),
        (None, None) => anyhow::bail!("Provide --key IMAGE or --key-json FILE"),
    }
}

fn render_report(report: &GradingReport, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(report).context("Failed to serialise report")
    } else {
        Ok(report.to_text())
    }
}

fn print_score_line(input: &str, report: &GradingReport) {
    let s = &report.summary;
    let pct = s
        .grade_percent
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| "n/a".to_string());
    let marker = if s.undetermined.is_empty() {
        green("✔")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{} {}  {}  {}/{} points  {}",
        marker,
        bold(&report.student_name),
        dim(input),
        s.points_awarded,
        s.points_possible,
        bold(&pct),
    );
}

/// Write `text` to `path`, or to stdout with a trailing newline.
async fn emit(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write {:?}", path)),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            Ok(())
        }
    }
}

/// Map CLI args to `GradingConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GradingConfig> {
    let mut builder = GradingConfig::builder()
        .strategy(cli.strategy.into())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.key_prompt {
        builder = builder.key_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = cli.submission_prompt {
        builder = builder.submission_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}
