//! CLI binary for docflow.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `PipelineConfig`, runs one flow over one file and prints the result.

use anyhow::{Context as _, Result};
use clap::Parser;
use docflow::{
    image_flow, office_flow, pdf_flow, Context, Message, PdfiumPageProcessor, PipelineConfig,
    Presentation, PresentationFlow, RenderFormat, StageEnv,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
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

const AFTER_HELP: &str = r#"
EXAMPLES:
  # Convert a PowerPoint deck, then split and render every slide
  docflow --flow office /var/bigbluebutton/abc/deck.pptx

  # Same, skipping the pptx pre-scan and allowing a single attempt
  docflow --flow office --skip-precheck --max-attempts 1 deck.pptx

  # Turn an uploaded photo into a one-page presentation
  docflow --flow image --id abc photo.jpg

  # Process an existing PDF with a config file, print the result as JSON
  docflow --flow pdf --config /etc/docflow.json --json slides.pdf

ENVIRONMENT VARIABLES:
  DOCFLOW_CONFIG           JSON configuration file (tool paths, timeouts, blanks)
  DOCFLOW_MAX_ATTEMPTS     Office conversion attempts
  DOCFLOW_SKIP_PRECHECK    Skip the pptx pre-scan
  DOCFLOW_PDFIUM_DIR       Directory containing the pdfium shared library
  RUST_LOG                 Overrides --verbose / --quiet log filtering

Press Ctrl-C to cancel: the running tool is killed and the flow stops at
the current stage.
"#;

/// Convert an uploaded document into per-page presentation artifacts.
#[derive(Parser, Debug)]
#[command(
    name = "docflow",
    version,
    about = "Convert uploaded documents into per-page presentation artifacts",
    long_about = "Run one conversion flow over an uploaded file. The office flow converts \
the document to PDF first; every flow writes per-page PDFs, thumbnails, text, SVG and PNG \
artifacts next to the input file.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Uploaded file to convert.
    input: PathBuf,

    /// Which flow to run over the input.
    #[arg(long, value_enum)]
    flow: FlowArg,

    /// Presentation id. Defaults to the input file stem.
    #[arg(long)]
    id: Option<String>,

    /// JSON configuration file.
    #[arg(short, long, env = "DOCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the pptx pre-scan.
    #[arg(long, env = "DOCFLOW_SKIP_PRECHECK")]
    skip_precheck: bool,

    /// Office conversion attempts (overrides the config file).
    #[arg(long, env = "DOCFLOW_MAX_ATTEMPTS",
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "DOCFLOW_PDFIUM_DIR")]
    pdfium_dir: Option<PathBuf>,

    /// Format of the image flow's second render pass.
    #[arg(long)]
    repeat_render: Option<RenderFormat>,

    /// Create the download marker for the input.
    #[arg(long)]
    downloadable: bool,

    /// Print the resulting presentation as JSON.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FlowArg {
    Office,
    Image,
    Pdf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    // ── Build config and flow ────────────────────────────────────────────
    let config = build_config(&cli)?;
    let processor = Arc::new(PdfiumPageProcessor::new(config.tools.pdfium_dir.clone()));
    let env = StageEnv::with_process_runner(Arc::new(config));
    let flow: PresentationFlow = match cli.flow {
        FlowArg::Office => office_flow(&env, processor),
        FlowArg::Image => image_flow(&env),
        FlowArg::Pdf => pdf_flow(&env, processor),
    };

    let id = match &cli.id {
        Some(id) => id.clone(),
        None => cli
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Input path has no file name")?,
    };
    let pres = Presentation {
        downloadable: cli.downloadable,
        ..Presentation::new(id, &cli.input)
    };

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    let (ctx, cancel) = Context::background().with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling flow");
            cancel.cancel();
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let started = Instant::now();
    let outcome = flow.run(Message::with_context(pres, ctx)).await;
    let elapsed_ms = started.elapsed().as_millis();

    let pres = match outcome {
        Ok(msg) => msg.into_payload(),
        Err(e) => {
            if !cli.quiet {
                eprintln!("{}  {} failed after {}ms", red("✘"), cli.input.display(), elapsed_ms);
            }
            return Err(e).with_context(|| format!("Flow failed for {}", cli.input.display()));
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&pres).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&pres, elapsed_ms);
    }

    Ok(())
}

/// Map CLI args onto the configuration file (or defaults).
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PipelineConfig::default(),
    };

    if cli.skip_precheck {
        config.validation.office.skip_precheck = true;
    }
    if let Some(n) = cli.max_attempts {
        config.conversion.office.max_attempts = n;
    }
    if let Some(dir) = &cli.pdfium_dir {
        config.tools.pdfium_dir = Some(dir.clone());
    }
    if let Some(format) = cli.repeat_render {
        config.generation.image_repeat_render = format;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_summary(pres: &Presentation, elapsed_ms: u128) {
    eprintln!(
        "{}  {} pages  {}ms  →  {}",
        green("✔"),
        pres.pages.len(),
        elapsed_ms,
        bold(&pres.file_path.display().to_string()),
    );
    for page in &pres.pages {
        let mark = |p: &Option<PathBuf>| match p {
            Some(_) => green("✓"),
            None => red("·"),
        };
        eprintln!(
            "   {:>3}  thumb {}  text {}  svg {}  png {}  {}",
            page.num,
            mark(&page.thumbnail_path),
            mark(&page.text_file_path),
            mark(&page.svg_path),
            mark(&page.png_path),
            dim(&page.file_path.display().to_string()),
        );
    }
}
