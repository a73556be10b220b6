//! End-to-end runs: raw extracts to bipartite tables, bipartite tables to pair
//! tables, and matched pairs to co-infection statistics.
//!
//! A failure for one profile and year is logged and recorded; the remaining
//! inputs still run.

use std::path::{Path, PathBuf};
use std::time::Instant;

use arrow::record_batch::RecordBatch;

use crate::config::{DatasetProfile, PipelineConfig, ProjectionConfig, SinkConfig, StatsConfig};
use crate::enrollment::{EnrollmentFilter, FilteredEnrollment, select_matching, sort_enrollment};
use crate::error::util::ensure_directory;
use crate::error::{NetworkError, Result};
use crate::loader::{LoadOptions, TableLoader, load_file};
use crate::network::{PairProjector, ProjectionSummary};
use crate::sink::DelimitedWriter;
use crate::stats::baseline::DEFAULT_BASELINE_SEED;
use crate::stats::{
    FAMILY_LINK_TYPES, GeoLookup, InfectionLookup, KinshipIndex, LinkColumns, Observer, PairCategory,
    PairColumns, PairObservation, ResidenceColumns, StatsWriter, TestColumns, baseline_pairs,
    read_member_pairs, summarize,
};
use crate::utils::logging::{log_anomaly, log_operation_complete, log_operation_start, log_warning};

/// Bipartite table of a profile and year
#[must_use]
pub fn bipartite_path(dir: &Path, profile: &str, year: i32) -> PathBuf {
    dir.join(format!("{profile}_{year}.tsv"))
}

/// Final-grade selection of a profile and year
#[must_use]
pub fn final_grade_path(dir: &Path, profile: &str, year: i32) -> PathBuf {
    dir.join(format!("{profile}_{year}_last_year.tsv"))
}

/// An input that could not be processed
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub profile: String,
    pub year: i32,
    pub message: String,
}

/// Counts of a pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Tables written
    pub tables_written: usize,
    /// Rows read from raw extracts
    pub rows_read: usize,
    /// Rows of the selected education types
    pub rows_of_type: usize,
    /// Rows written to bipartite tables
    pub rows_kept: usize,
    /// Registrations dropped as too short
    pub dropped_short: usize,
    /// Registrations dropped for unparseable dates
    pub dropped_invalid: usize,
    /// Counts of all projections
    pub projection: ProjectionSummary,
    pub failures: Vec<RunFailure>,
}

impl RunSummary {
    fn add_filtered(&mut self, filtered: &FilteredEnrollment) {
        self.rows_read += filtered.input_rows;
        self.rows_of_type += filtered.type_rows;
        self.rows_kept += filtered.batch.num_rows();
        self.dropped_short += filtered.dropped_short;
        self.dropped_invalid += filtered.dropped_invalid;
    }

    fn fail(&mut self, profile: &str, year: i32, error: &NetworkError) {
        if error.is_input_error() {
            log::error!("Skipping {profile} {year}: {error}");
        } else {
            log::error!("Failed {profile} {year}: {error}");
        }
        self.failures.push(RunFailure {
            profile: profile.to_string(),
            year,
            message: error.to_string(),
        });
    }

    /// Add the counts of another run
    pub fn merge(&mut self, other: Self) {
        self.tables_written += other.tables_written;
        self.rows_read += other.rows_read;
        self.rows_of_type += other.rows_of_type;
        self.rows_kept += other.rows_kept;
        self.dropped_short += other.dropped_short;
        self.dropped_invalid += other.dropped_invalid;
        self.projection.merge(&other.projection);
        self.failures.extend(other.failures);
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Log the run totals
    pub fn log(&self) {
        log::info!(
            "Run complete: {} tables written, {} of {} rows kept, {} short registrations filtered",
            self.tables_written,
            self.rows_kept,
            self.rows_read,
            self.dropped_short
        );
        if self.projection.cohorts > 0 {
            self.projection.log();
        }
        log_anomaly(self.dropped_invalid as u64, "registrations with unreadable dates");
        log_anomaly(self.failures.len() as u64, "inputs failed");
    }
}

/// Load, filter and sort the extract of `profile` for `year`
///
/// # Returns
/// `None` when the profile has no extract for the year.
pub fn build_table(
    loader: &TableLoader,
    profile: &DatasetProfile,
    year: i32,
    row_limit: Option<usize>,
) -> Result<Option<FilteredEnrollment>> {
    let options = LoadOptions::default()
        .with_columns(profile.source_columns())
        .with_row_limit(row_limit);
    let Some(raw) = loader.load(&profile.source_dir, year, &options)? else {
        return Ok(None);
    };

    let mut filtered = EnrollmentFilter::new(&profile.filter).apply(&raw, &profile.columns)?;
    filtered.batch = sort_enrollment(&filtered.batch, &profile.sort_columns)?;
    Ok(Some(filtered))
}

/// Write `batch` with its column names as header
pub fn write_table(path: &Path, batch: &RecordBatch, sink: &SinkConfig) -> Result<u64> {
    let header: Vec<String> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let mut writer = DelimitedWriter::create(path, &header, sink)?;
    writer.write_batch(batch)?;
    let rows = writer.rows_written();
    writer.finish()?;
    Ok(rows)
}

fn build_one(
    config: &PipelineConfig,
    loader: &TableLoader,
    profile: &DatasetProfile,
    year: i32,
    summary: &mut RunSummary,
) -> Result<()> {
    let Some(filtered) = build_table(loader, profile, year, config.row_limit)? else {
        return Ok(());
    };
    summary.add_filtered(&filtered);

    let path = bipartite_path(&config.bipartite_dir, &profile.name, year);
    let rows = write_table(&path, &filtered.batch, &config.sink)?;
    log_operation_complete("Wrote", &path, rows, "enrollments", None);
    summary.tables_written += 1;

    if !profile.final_grade.is_empty() {
        let last_year = select_matching(&filtered.batch, &profile.final_grade)?;
        let path = final_grade_path(&config.bipartite_dir, &profile.name, year);
        let rows = write_table(&path, &last_year, &config.sink)?;
        log_operation_complete("Wrote", &path, rows, "final-grade enrollments", None);
        summary.tables_written += 1;
    }
    Ok(())
}

/// Build the bipartite tables of every profile and year
pub fn build_bipartite(config: &PipelineConfig) -> Result<RunSummary> {
    ensure_directory(&config.bipartite_dir, "bipartite output")?;
    let loader = TableLoader::new(&config.data_root);
    let mut summary = RunSummary::default();

    for profile in &config.profiles {
        for &year in &config.years {
            log::info!("Building {} {}", profile.name, year);
            if let Err(e) = build_one(config, &loader, profile, year, &mut summary) {
                summary.fail(&profile.name, year, &e);
            }
        }
    }
    Ok(summary)
}

/// Project one bipartite table into a pair table
///
/// The output is only created once the input has been read and validated, and
/// is removed again if the projection fails.
pub fn project_file(
    input: &Path,
    output: &Path,
    projection: &ProjectionConfig,
    sink: &SinkConfig,
) -> Result<ProjectionSummary> {
    let start = Instant::now();
    log_operation_start("Analyzing file", input);

    let projector = PairProjector::new(projection)?;
    let options = LoadOptions::default().with_columns(projection.required_columns());
    let batch = load_file(input, &options)?;
    projector.validate_schema(batch.schema().as_ref())?;

    let mut writer = DelimitedWriter::create(output, &projector.output_header(), sink)?;
    let result = projector
        .project_to_writer(&batch, &mut writer)
        .and_then(|summary| writer.finish().map(|_| summary));

    match result {
        Ok(summary) => {
            log_operation_complete("Wrote", output, summary.pairs, "pairs", Some(start.elapsed()));
            summary.log();
            Ok(summary)
        }
        Err(e) => {
            if std::fs::remove_file(output).is_err() {
                log_warning("Could not remove partial output", Some(output));
            }
            Err(e)
        }
    }
}

/// Project the bipartite tables of the configured years
///
/// Years come from `project_years`, or `years` when that is empty. Final-grade
/// selections are projected alongside their full tables when present.
pub fn project_directory(config: &PipelineConfig) -> Result<RunSummary> {
    ensure_directory(&config.projected_dir, "projected output")?;
    let years = if config.project_years.is_empty() {
        &config.years
    } else {
        &config.project_years
    };

    let mut summary = RunSummary::default();
    for profile in &config.profiles {
        for &year in years {
            let inputs = [
                (
                    bipartite_path(&config.bipartite_dir, &profile.name, year),
                    bipartite_path(&config.projected_dir, &profile.name, year),
                ),
                (
                    final_grade_path(&config.bipartite_dir, &profile.name, year),
                    final_grade_path(&config.projected_dir, &profile.name, year),
                ),
            ];
            for (input, output) in inputs {
                if !input.is_file() {
                    log::debug!("No bipartite table at {}", input.display());
                    continue;
                }
                match project_file(&input, &output, &profile.projection, &config.sink) {
                    Ok(projected) => {
                        summary.projection.merge(&projected);
                        summary.tables_written += 1;
                    }
                    Err(e) => summary.fail(&profile.name, year, &e),
                }
            }
        }
    }
    Ok(summary)
}

/// Build and project everything the configuration names
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let mut summary = build_bipartite(config)?;
    summary.merge(project_directory(config)?);
    summary.log();
    Ok(summary)
}

/// Inputs of a statistics run
#[derive(Debug, Clone)]
pub struct StatsInputs {
    /// Matched pair table (two former classmates and their new schools)
    pub pairs: PathBuf,
    /// Address table with grid cells
    pub residences: PathBuf,
    /// Test table
    pub tests: PathBuf,
    /// Family link table
    pub family: Option<PathBuf>,
    /// Statistics file rows are appended to
    pub output: PathBuf,
}

fn write_sample(
    writer: &mut StatsWriter,
    label: &str,
    observations: &[PairObservation],
    siblings: Option<&KinshipIndex>,
    config: &StatsConfig,
    schools: bool,
) -> Result<()> {
    let infected: Vec<PairObservation> = observations
        .iter()
        .filter(|o| !o.not_infected)
        .cloned()
        .collect();
    writer.write_rows(&summarize(&format!("{label}_all"), observations, config, schools))?;
    writer.write_rows(&summarize(&format!("{label}_infected"), &infected, config, schools))?;

    if let Some(siblings) = siblings {
        let is_twin = |o: &&PairObservation| siblings.contains(&o.first, &o.second);
        let twins: Vec<PairObservation> = observations.iter().filter(is_twin).cloned().collect();
        let infected_twins: Vec<PairObservation> = infected.iter().filter(is_twin).cloned().collect();
        writer.write_rows(&summarize(&format!("{label}_twins"), &twins, config, schools))?;
        writer.write_rows(&summarize(
            &format!("{label}_infected_twins"),
            &infected_twins,
            config,
            schools,
        ))?;
    }
    Ok(())
}

/// Compute co-infection statistics and append them to `inputs.output`
pub fn run_statistics(inputs: &StatsInputs, config: &StatsConfig) -> Result<()> {
    let start = Instant::now();
    let options = LoadOptions::default();

    let residences = GeoLookup::from_batch(
        &load_file(&inputs.residences, &options)?,
        &ResidenceColumns::default(),
    )?;
    let infections = InfectionLookup::from_batch(
        &load_file(&inputs.tests, &options)?,
        &TestColumns::default(),
        config.reference_date,
        true,
    )?;
    let pairs = read_member_pairs(&load_file(&inputs.pairs, &options)?, &PairColumns::default())?;
    let family = match &inputs.family {
        Some(path) => Some(load_file(path, &options)?),
        None => None,
    };

    let observer = Observer {
        residences: &residences,
        infections: &infections,
        config,
    };
    let siblings = family
        .as_ref()
        .map(|batch| KinshipIndex::from_batch(batch, &LinkColumns::default(), &["103"]))
        .transpose()?;

    let mut writer = StatsWriter::append(&inputs.output)?;

    let observed = observer.observe_pairs(&pairs);
    for category in PairCategory::ALL {
        let sample: Vec<PairObservation> = observed
            .pairs
            .iter()
            .filter(|o| o.category == Some(category))
            .cloned()
            .collect();
        log::info!("{}: {} pairs", category.label(), sample.len());
        write_sample(&mut writer, category.label(), &sample, siblings.as_ref(), config, true)?;
    }

    let baseline = observer.observe_pairs(&baseline_pairs(&pairs, DEFAULT_BASELINE_SEED));
    write_sample(&mut writer, "baseline", &baseline.pairs, siblings.as_ref(), config, true)?;

    if let Some(batch) = &family {
        let codes: Vec<&str> = FAMILY_LINK_TYPES.iter().map(|(_, code)| *code).collect();
        let links = KinshipIndex::from_batch(batch, &LinkColumns::default(), &codes)?;
        for (label, code) in FAMILY_LINK_TYPES {
            let observed = observer.observe_links(links.links_of_type(code));
            write_sample(
                &mut writer,
                &format!("{label}-{code}"),
                &observed.pairs,
                None,
                config,
                false,
            )?;
        }
    }

    writer.finish()?;
    log_operation_complete(
        "Computed statistics of",
        &inputs.pairs,
        pairs.len() as u64,
        "pairs",
        Some(start.elapsed()),
    );
    Ok(())
}
