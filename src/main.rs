use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pipesynth::asset::AssetPackager;
use pipesynth::config::{Config, Overrides};
use pipesynth::pipeline::{self, Variant};
use pipesynth::synth;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Version injected at compile time via PIPESYNTH_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("PIPESYNTH_VERSION") {
    Some(v) => v,
    None => "dev",
};

/// Synthesize the image pipeline resource graph
#[derive(Parser, Debug)]
#[command(name = "pipesynth", version, about, long_about = None)]
struct Args {
    /// Stack config file (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GCP project to use
    #[arg(short, long)]
    project: Option<String>,

    /// GCP region to use
    #[arg(short, long)]
    region: Option<String>,

    /// Prediction endpoint the function calls
    #[arg(long)]
    endpoint_id: Option<String>,

    /// Directory holding the function source
    #[arg(long, default_value = "function")]
    source: PathBuf,

    /// Output directory for staged assets and the synthesized document
    #[arg(short, long, default_value = "synth.out")]
    out: PathBuf,

    /// Stack name, used as the output subdirectory
    #[arg(long, default_value = "ideal-adventure")]
    stack: String,

    /// Which shape of the pipeline to declare
    #[arg(long, value_enum, default_value = "full")]
    variant: VariantArg,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    Full,
    Minimal,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Full => Variant::Full,
            VariantArg::Minimal => Variant::Minimal,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("pipesynth {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("pipesynth").join("pipesynth.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".pipesynth").join("pipesynth.log");
    }
    PathBuf::from("pipesynth.log")
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let document_path = run(&args)?;
    println!("{}", document_path.display());
    Ok(())
}

fn run(args: &Args) -> Result<PathBuf> {
    // Step 1: Load configuration
    let config = Config::load(args.config.as_deref())?;
    let stack = config.resolve(&Overrides {
        project_id: args.project.clone(),
        region: args.region.clone(),
        endpoint_id: args.endpoint_id.clone(),
    })?;
    tracing::info!("Using project: {}, region: {}", stack.project, stack.region);

    // Step 2: Package the function source
    let packager = AssetPackager::new(&args.out);
    let asset = packager
        .package(&args.source)
        .context("Failed to package function source")?;
    tracing::info!("Function source hash: {}", asset.hash);

    // Step 3: Declare the graph
    let graph = pipeline::build_pipeline(&stack, asset, args.variant.into())
        .context("Failed to declare pipeline")?;

    for (depth, phase) in synth::plan_phases(&graph)?.iter().enumerate() {
        let ids: Vec<&str> = phase.iter().map(|id| id.as_str()).collect();
        tracing::debug!("Phase {}: {}", depth, ids.join(", "));
    }

    // Step 4: Synthesize and write the document in one piece
    let document = synth::synthesize(&graph, &pipeline::synth_options(&stack))
        .context("Failed to synthesize pipeline")?;
    let json = document.to_json().context("Failed to serialize document")?;

    let stack_dir = args.out.join("stacks").join(&args.stack);
    let document_path = stack_dir.join("resources.json");
    write_atomically(&stack_dir, &document_path, json.as_bytes())?;
    tracing::info!("Wrote {:?}", document_path);

    Ok(document_path)
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(())
}
