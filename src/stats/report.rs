//! Co-infection counts per distance bucket
//!
//! Every sample contributes a `general` row, one row per distance bucket and,
//! for school pairs, rows for schools sharing a postcode or a municipality.
//! Rows accumulate in a statistics file across samples and are exported with
//! small counts suppressed.

use std::path::Path;

use crate::config::{SinkConfig, StatsConfig};
use crate::error::{NetworkError, Result};
use crate::loader::{LoadOptions, load_file};
use crate::sink::DelimitedWriter;
use crate::stats::analysis::PairObservation;
use crate::stats::confint::{Interval, proportion_interval};
use crate::utils::arrow::TextColumns;

/// Header of statistics files and reports
pub const REPORT_HEADER: [&str; 4] = ["Group", "Distance", "N", "N_inf"];

/// Half-open distance range `(lower, upper]` in metres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceBucket {
    pub lower: f64,
    pub upper: f64,
}

impl DistanceBucket {
    #[must_use]
    pub fn contains(&self, distance: f64) -> bool {
        distance > self.lower && distance <= self.upper
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{}-{}", self.lower, self.upper)
    }
}

/// Buckets between consecutive thresholds, the first starting just below zero
#[must_use]
pub fn distance_buckets(thresholds: &[f64]) -> Vec<DistanceBucket> {
    let mut lower = -1.0;
    thresholds
        .iter()
        .map(|&upper| {
            let bucket = DistanceBucket { lower, upper };
            lower = upper;
            bucket
        })
        .collect()
}

/// One line of a statistics file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRow {
    pub group: String,
    pub scope: String,
    pub n: u64,
    pub n_inf: u64,
}

impl StatsRow {
    fn tally<'a>(group: &str, scope: String, observations: impl Iterator<Item = &'a PairObservation>) -> Self {
        let (n, n_inf) = observations.fold((0, 0), |(n, inf), obs| (n + 1, inf + u64::from(obs.co_infected)));
        Self {
            group: group.to_string(),
            scope,
            n,
            n_inf,
        }
    }

    /// Confidence interval of the co-infection proportion, in percent
    #[must_use]
    pub fn interval(&self, config: &StatsConfig) -> Option<Interval> {
        proportion_interval(self.n_inf, self.n, config.alpha, config.interval_method)
            .map(|ci| ci.as_percent())
    }
}

/// Summarise one sample
///
/// Every row is logged with its confidence interval.
#[must_use]
pub fn summarize(
    label: &str,
    observations: &[PairObservation],
    config: &StatsConfig,
    schools: bool,
) -> Vec<StatsRow> {
    let mut rows = vec![StatsRow::tally(label, "general".to_string(), observations.iter())];

    for bucket in distance_buckets(&config.distance_thresholds) {
        rows.push(StatsRow::tally(
            label,
            bucket.label(),
            observations.iter().filter(|o| bucket.contains(o.distance)),
        ));
    }

    if schools {
        rows.push(StatsRow::tally(
            label,
            "school_postcode".to_string(),
            observations.iter().filter(|o| o.same_postcode == Some(true)),
        ));
        rows.push(StatsRow::tally(
            label,
            "school_gemeente".to_string(),
            observations.iter().filter(|o| o.same_municipality == Some(true)),
        ));
    }

    for row in &rows {
        match row.interval(config) {
            Some(ci) => log::info!(
                "{} {} (N={}) [{:.2}%, {:.2}%] {}",
                row.group,
                row.scope,
                row.n,
                ci.lower,
                ci.upper,
                row.n_inf
            ),
            None => log::info!("{} {} (N=0)", row.group, row.scope),
        }
    }
    rows
}

/// Appends rows to a statistics file
pub struct StatsWriter {
    writer: DelimitedWriter<std::fs::File>,
}

impl StatsWriter {
    /// Open `path` for appending, writing the header if the file is new
    pub fn append(path: &Path) -> Result<Self> {
        let header: Vec<String> = REPORT_HEADER.iter().map(|h| (*h).to_string()).collect();
        Ok(Self {
            writer: DelimitedWriter::append(path, &header, &SinkConfig::default())?,
        })
    }

    pub fn write_rows(&mut self, rows: &[StatsRow]) -> Result<()> {
        for row in rows {
            let (n, n_inf) = (row.n.to_string(), row.n_inf.to_string());
            self.writer
                .write_record([row.group.as_str(), row.scope.as_str(), n.as_str(), n_inf.as_str()])?;
        }
        self.writer.flush()
    }

    pub fn finish(self) -> Result<()> {
        self.writer.finish().map(drop)
    }
}

/// Blank out a count below `min_reportable`
fn suppress(raw: &str, min_reportable: u64) -> Result<String> {
    let raw = raw.trim();
    let value: u64 = raw
        .parse()
        .map_err(|_| NetworkError::invalid_value("count", raw))?;
    Ok(if value < min_reportable {
        String::new()
    } else {
        value.to_string()
    })
}

/// Export a statistics file with small counts suppressed
///
/// `N` and `N_inf` are suppressed independently. Returns the number of rows written.
pub fn export_report(stats_file: &Path, output: &Path, min_reportable: u64) -> Result<usize> {
    let batch = load_file(stats_file, &LoadOptions::default())?;
    let header: Vec<String> = REPORT_HEADER.iter().map(|h| (*h).to_string()).collect();
    let text = TextColumns::from_batch(&batch, &header, "statistics file")?;

    let mut writer = DelimitedWriter::create(output, &header, &SinkConfig::default())?;
    for row in 0..text.num_rows() {
        let n = suppress(text.value(2, row), min_reportable)?;
        let n_inf = suppress(text.value(3, row), min_reportable)?;
        writer.write_record([text.value(0, row), text.value(1, row), n.as_str(), n_inf.as_str()])?;
    }
    writer.finish()?;

    log::info!("Exported {} statistics rows to {}", text.num_rows(), output.display());
    Ok(text.num_rows())
}
