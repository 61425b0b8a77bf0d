//! IV-Care - clinical feedback collector for IV injection procedures
//!
//! A CLI tool that records post-procedure feedback from nursing staff,
//! summarizes it into a dashboard, exports CSV, and requests a narrative
//! analysis from a local Ollama model.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (unreadable store, config, write failure, etc.)

mod analysis;
mod cli;
mod config;
mod form;
mod models;
mod narrative;
mod report;
mod store;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{AnalyzeArgs, Args, Command, OutputFormat, SubmitArgs};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use narrative::{AnalysisState, AnalysisTracker, NarrativeAnalyst, OllamaGenerator};
use report::{DashboardReport, ReportMetadata};
use std::path::{Path, PathBuf};
use std::time::Duration;
use store::{FileSlots, LoadSource, RecordStore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so `[general] verbose` applies
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("IV-Care v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    config_source.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .ivcare.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the data directory, model, and export location.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the subcommand. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let opener = StoreOpener {
        config: &config,
        strict: args.strict,
    };

    match &args.command {
        Some(Command::Submit(submit)) => handle_submit(&opener, submit),
        Some(Command::Dashboard { format, output, .. }) => {
            handle_dashboard(&opener, *format, output.as_deref())
        }
        Some(Command::List { limit }) => handle_list(&opener, *limit),
        Some(Command::Export { .. }) => handle_export(&opener),
        Some(Command::Analyze(analyze)) => handle_analyze(&opener, analyze, args.quiet).await,
        None => bail!("No subcommand given"),
    }
}

/// Where the configuration came from. Reported once logging is up.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Defaults,
    /// The default file exists but could not be read.
    Unreadable(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            ConfigSource::Defaults => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::DefaultFile),
        Ok(None) => (Config::default(), ConfigSource::Defaults),
        Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
    })
}

/// Opens the file-backed store the way the command line asked for.
struct StoreOpener<'a> {
    config: &'a Config,
    /// Unreadable stored records are an error instead of a fallback.
    strict: bool,
}

impl StoreOpener<'_> {
    /// Open the store, returning it with its on-disk location.
    fn open(&self) -> Result<(RecordStore<FileSlots>, PathBuf)> {
        let general = &self.config.general;
        let slots = FileSlots::new(&general.data_dir);
        let location = slots.path_for(&general.storage_key);

        let store = if self.strict {
            RecordStore::load(slots, &general.storage_key)
        } else {
            RecordStore::load_or_seed(slots, &general.storage_key)
        }
        .with_context(|| format!("Failed to open record store at {}", location.display()))?;

        match store.source() {
            LoadSource::Stored => {
                debug!("Loaded {} records from {}", store.len(), location.display())
            }
            LoadSource::Seeded => info!("No records stored yet, showing the example records"),
            LoadSource::Recovered => warn!(
                "Stored records at {} were unreadable, showing the example records. \
                 They are kept as a backup when the next record is saved.",
                location.display()
            ),
        }

        Ok((store, location))
    }
}

fn build_report(
    store: &RecordStore<FileSlots>,
    location: &Path,
    narrative_analysis: Option<models::AiAnalysis>,
    model_used: Option<String>,
) -> DashboardReport {
    DashboardReport {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            store_location: location.display().to_string(),
            record_count: store.len(),
            model_used,
        },
        summary: analysis::summarize(store.records()),
        analysis: narrative_analysis,
    }
}

fn handle_submit(opener: &StoreOpener<'_>, submit: &SubmitArgs) -> Result<i32> {
    let (mut store, location) = opener.open()?;

    let record = submit.to_form().submit();
    let id = record.id.clone();

    let records = store
        .append(record)
        .with_context(|| format!("Failed to save record to {}", location.display()))?;

    println!("✅ Feedback recorded (id {}).", id);
    if let Some(summary) = analysis::summarize(records) {
        println!();
        print!("{}", report::generate_headline_section(&summary));
    }

    Ok(0)
}

fn handle_dashboard(
    opener: &StoreOpener<'_>,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<i32> {
    let config = opener.config;
    let (store, location) = opener.open()?;
    let dashboard = build_report(&store, &location, None, None);

    let rendered = match format {
        OutputFormat::Json => report::generate_json_report(&dashboard)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&dashboard, store.records(), &config.render_options())
        }
    };

    write_or_print(&rendered, output)?;
    Ok(0)
}

fn handle_list(opener: &StoreOpener<'_>, limit: Option<usize>) -> Result<i32> {
    let (store, _) = opener.open()?;

    if store.is_empty() {
        println!("No feedback has been recorded yet.");
        return Ok(0);
    }

    let records = store.records();
    let shown = &records[..limit.unwrap_or(records.len()).min(records.len())];

    print!("{}", report::generate_records_table(shown));
    if shown.len() < records.len() {
        println!("\n({} of {} records shown)", shown.len(), records.len());
    }

    Ok(0)
}

fn handle_export(opener: &StoreOpener<'_>) -> Result<i32> {
    let (store, _) = opener.open()?;
    let dir = Path::new(&opener.config.export.output_dir);

    let path = report::write_export(store.records(), dir, Utc::now().date_naive())
        .with_context(|| format!("Failed to export records to {}", dir.display()))?;

    println!("✅ Exported {} records to {}", store.len(), path.display());
    Ok(0)
}

async fn handle_analyze(
    opener: &StoreOpener<'_>,
    analyze: &AnalyzeArgs,
    quiet: bool,
) -> Result<i32> {
    let config = opener.config;
    let (store, location) = opener.open()?;

    if store.is_empty() {
        println!("No feedback has been recorded yet. Nothing to analyze.");
        return Ok(0);
    }

    let ollama = config.ollama_config();
    println!("🤖 Requesting clinical bottleneck analysis...");
    println!("   Model: {}", ollama.model_name);
    println!("   Ollama: {}", ollama.ollama_url);
    println!("   Timeout: {}s", ollama.timeout_seconds);

    let timeout = Duration::from_secs(ollama.timeout_seconds);
    let model_name = ollama.model_name.clone();
    let generator = OllamaGenerator::new(ollama)?;
    let analyst = NarrativeAnalyst::new(generator, timeout);
    let tracker = AnalysisTracker::new();

    let spinner = analysis_spinner(quiet);
    let result = tracker.run(&analyst, store.records()).await;
    spinner.finish_and_clear();

    let Some(analysis) = result else {
        bail!("An analysis is already in progress");
    };

    if let AnalysisState::Failed(_) = tracker.state() {
        eprintln!("⚠️  The model could not be reached or gave an unusable answer. Showing the fallback.");
    }

    println!();
    print!("{}", report::generate_analysis_section(&analysis));

    if let Some(ref output) = analyze.output {
        let dashboard = build_report(&store, &location, Some(analysis), Some(model_name));
        let rendered =
            report::generate_markdown_report(&dashboard, store.records(), &config.render_options());
        write_or_print(&rendered, Some(output))?;
    }

    Ok(0)
}

/// Loading indicator shown while the analysis is pending.
fn analysis_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Analyzing feedback...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn write_or_print(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}
