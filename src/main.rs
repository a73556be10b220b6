use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use school_network::config::{OversizePolicy, PipelineConfig};
use school_network::pipeline::{self, RunSummary, StatsInputs};
use school_network::stats::export_report;
use school_network::utils::logging::{create_spinner, finish_progress_bar};

#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration (JSON); built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build bipartite tables, then project them
    Run,
    /// Build bipartite tables from raw extracts
    Bipartite,
    /// Project bipartite tables into pair tables
    Project {
        /// Project a single table instead of the configured directory
        #[arg(long, requires = "output")]
        input: Option<PathBuf>,
        /// Output of a single-table projection
        #[arg(long)]
        output: Option<PathBuf>,
        /// Profile whose projection settings apply to a single table
        #[arg(long, default_value = "vo")]
        profile: String,
        /// Render groups in parallel
        #[arg(long)]
        parallel: bool,
        /// Override the pairing ceiling
        #[arg(long)]
        max_group_size: Option<usize>,
        /// Override the handling of oversized groups
        #[arg(long)]
        oversize: Option<Oversize>,
    },
    /// Compute co-infection statistics of matched pairs
    Stats {
        /// Matched pair table
        #[arg(long)]
        pairs: PathBuf,
        /// Address table with grid cells
        #[arg(long)]
        residences: PathBuf,
        /// Test results
        #[arg(long)]
        tests: PathBuf,
        /// Family link table
        #[arg(long)]
        family: Option<PathBuf>,
        /// Statistics file to append to
        #[arg(long)]
        output: PathBuf,
    },
    /// Export a statistics file with small counts suppressed
    Export {
        #[arg(long)]
        stats: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Oversize {
    Skip,
    Abort,
}

impl From<Oversize> for OversizePolicy {
    fn from(value: Oversize) -> Self {
        match value {
            Oversize::Skip => Self::Skip,
            Oversize::Abort => Self::Abort,
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// Log every failed input and fail when there was one
fn report_failures(summary: &RunSummary) -> anyhow::Result<()> {
    if !summary.is_success() {
        for failure in &summary.failures {
            warn!("{} {}: {}", failure.profile, failure.year, failure.message);
        }
        bail!("{} inputs failed", summary.failures.len());
    }
    Ok(())
}

fn finish(summary: &RunSummary) -> anyhow::Result<()> {
    summary.log();
    report_failures(summary)
}

fn main() -> anyhow::Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run => {
            // Totals are logged by the pipeline itself
            let summary = pipeline::run(&config).context("running pipeline")?;
            report_failures(&summary)?;
        }
        Command::Bipartite => {
            let summary = pipeline::build_bipartite(&config).context("building bipartite tables")?;
            finish(&summary)?;
        }
        Command::Project {
            input,
            output,
            profile,
            parallel,
            max_group_size,
            oversize,
        } => {
            for p in &mut config.profiles {
                p.projection.parallel |= parallel;
                if let Some(limit) = max_group_size {
                    p.projection.max_group_size = limit;
                }
                if let Some(policy) = oversize {
                    p.projection.oversize_policy = policy.into();
                }
            }

            match (input, output) {
                (Some(input), Some(output)) => {
                    let profile = config
                        .profile(&profile)
                        .with_context(|| format!("unknown profile '{profile}'"))?;
                    pipeline::project_file(&input, &output, &profile.projection, &config.sink)
                        .with_context(|| format!("projecting {}", input.display()))?;
                }
                _ => {
                    let summary =
                        pipeline::project_directory(&config).context("projecting bipartite tables")?;
                    finish(&summary)?;
                }
            }
        }
        Command::Stats {
            pairs,
            residences,
            tests,
            family,
            output,
        } => {
            let inputs = StatsInputs {
                pairs,
                residences,
                tests,
                family,
                output,
            };
            let spinner = create_spinner(Some("Computing statistics"), true);
            pipeline::run_statistics(&inputs, &config.stats).context("computing statistics")?;
            finish_progress_bar(&spinner, Some("Statistics written"));
        }
        Command::Export { stats, output } => {
            let rows = export_report(&stats, &output, config.stats.min_reportable)
                .with_context(|| format!("exporting {}", stats.display()))?;
            info!("Exported {rows} rows");
        }
    }

    Ok(())
}
