use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpk_lib::{
    compute_cpk, extract_test_points, generate_selection, split_export, CpkPaths, Layout,
    PipelineSettings, Progress,
};
use env_logger::Env;
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "cpk",
    version,
    about = "Process capability (Cpk) analysis of production test-log exports"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Optional TOML file overriding thresholds, plot size and column names
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a raw export into one CSV per unit test run (<out>/split_files)
    Split {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Generate <out>/config.csv listing every test point, all excluded
    Config {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Regroup split unit files into one dataset per test point
    ///
    /// Datasets are appended to; clear the output directory before re-running
    /// over the same unit files or every row will be duplicated.
    Extract {
        #[arg(long)]
        split_dir: PathBuf,
        /// Defaults to test_data/ next to the split directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compute Cpk, plots and logs for the test points switched on in the selection
    Cpk {
        #[arg(long)]
        selection: PathBuf,
        #[arg(long)]
        test_data: PathBuf,
        /// Root for cpk_results/ and cpk_plots/; defaults to the test data's parent
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let settings = load_settings(cli.settings.as_deref())?;
    let mut progress = log_progress();
    match cli.command {
        Commands::Split { input, out } => cmd_split(&input, &out, &settings, &mut progress)?,
        Commands::Config { input, out } => cmd_config(&input, &out, &settings)?,
        Commands::Extract { split_dir, out } => {
            cmd_extract(&split_dir, out.as_deref(), &settings, &mut progress)?
        }
        Commands::Cpk {
            selection,
            test_data,
            out,
        } => cmd_cpk(&selection, &test_data, out.as_deref(), &settings, &mut progress)?,
    }
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<PipelineSettings> {
    match path {
        Some(path) => {
            let settings = PipelineSettings::load(path)
                .with_context(|| format!("loading settings {}", path.display()))?;
            info!("using settings from {}", path.display());
            Ok(settings)
        }
        None => Ok(PipelineSettings::default()),
    }
}

fn log_progress() -> impl FnMut(f64) {
    |percent: f64| debug!("progress {:.0}%", percent)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_split(
    input: &Path,
    out: &Path,
    settings: &PipelineSettings,
    progress: &mut dyn Progress,
) -> Result<()> {
    let split_dir = Layout::new(out).split_dir();
    let report = split_export(input, &split_dir, settings, progress)
        .with_context(|| format!("splitting {}", input.display()))?;
    print_json(&report)
}

fn cmd_config(input: &Path, out: &Path, settings: &PipelineSettings) -> Result<()> {
    let report = generate_selection(input, out, settings)
        .with_context(|| format!("generating selection from {}", input.display()))?;
    print_json(&report)
}

fn cmd_extract(
    split_dir: &Path,
    out: Option<&Path>,
    settings: &PipelineSettings,
    progress: &mut dyn Progress,
) -> Result<()> {
    let out = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Layout::beside(split_dir).test_data_dir());
    let report = extract_test_points(split_dir, &out, settings, progress)
        .with_context(|| format!("extracting test points from {}", split_dir.display()))?;
    print_json(&report)
}

fn cmd_cpk(
    selection: &Path,
    test_data: &Path,
    out: Option<&Path>,
    settings: &PipelineSettings,
    progress: &mut dyn Progress,
) -> Result<()> {
    let mut paths = CpkPaths::new(selection, test_data);
    if let Some(root) = out {
        paths = paths.with_output_root(root);
    }
    let report = compute_cpk(&paths, settings, progress)
        .with_context(|| format!("computing Cpk with {}", selection.display()))?;
    print_json(&report)
}
