//! Configuration for enrollment filtering, projection and output.
//!
//! Every struct has a `Default` matching the secondary-education register, and the
//! whole run can be described by a JSON document loaded with [`PipelineConfig::from_file`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Identity triplet duplicated per pair member
pub const IDENTITY_COLUMNS: [&str; 3] = ["ONDERWIJSNR_crypt", "RINPERSOONS", "RINPERSOON"];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Start and end columns of a registration period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationDates {
    /// Column holding the registration start (`YYYYMMDD`)
    pub start_column: String,
    /// Column holding the registration end (`YYYYMMDD` or an open marker)
    pub end_column: String,
    /// Values meaning "not yet ended"; empty values are always open
    pub open_end_markers: Vec<String>,
    /// Date substituted for open registrations
    pub open_end_date: NaiveDate,
}

impl Default for RegistrationDates {
    fn default() -> Self {
        Self {
            start_column: "AANVINSCHR".to_string(),
            end_column: "EINDINSCHR".to_string(),
            open_end_markers: strings(&["Niet uitgeschreven", "99999999"]),
            open_end_date: far_future(),
        }
    }
}

fn far_future() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Configuration of the enrollment filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentFilterConfig {
    /// Column holding the education type
    pub education_type_column: String,
    /// Education type to keep
    pub education_type: String,
    /// Alternative spellings mapped onto canonical education types
    pub type_aliases: BTreeMap<String, String>,
    /// Registration period columns; `None` when the register carries no dates
    pub dates: Option<RegistrationDates>,
    /// Registrations shorter than this are dropped
    pub min_duration_days: i64,
    /// First calendar month of the academic year
    pub academic_year_start_month: u32,
}

impl Default for EnrollmentFilterConfig {
    fn default() -> Self {
        Self {
            education_type_column: "TYPEONDERWIJS".to_string(),
            education_type: "VO".to_string(),
            type_aliases: BTreeMap::new(),
            dates: Some(RegistrationDates::default()),
            min_duration_days: 180,
            academic_year_start_month: 8,
        }
    }
}

/// What to do with a group larger than `max_group_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Log the group and emit no pairs for it
    #[default]
    Skip,
    /// Fail the projection
    Abort,
}

/// Configuration of the pair projector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Columns forming the group key, written once per pair
    pub group_columns: Vec<String>,
    /// Cohort column; rows are partitioned by it before the group key
    pub year_column: String,
    /// Identity columns duplicated for both pair members
    pub identity_columns: Vec<String>,
    /// Suffixes appended to identity column names for member 1 and 2
    pub pair_suffixes: (String, String),
    /// Cohort values containing any of these are undefined; `0` and blank always are
    pub undefined_cohort_markers: Vec<String>,
    /// Pairing ceiling per group
    pub max_group_size: usize,
    /// Handling of groups above the ceiling
    pub oversize_policy: OversizePolicy,
    /// Render groups on the rayon pool
    pub parallel: bool,
    /// Number of groups rendered per parallel window
    pub parallel_window: usize,
    /// Pair rows buffered per parallel window; larger groups are streamed alone
    pub parallel_pair_budget: u64,
    /// Show a progress bar per cohort
    pub show_progress: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            group_columns: strings(&["BRIN_crypt", "VOBRINVEST", "VOLEERJAAR", "OPLNR"]),
            year_column: "VOLEERJAAR".to_string(),
            identity_columns: strings(&IDENTITY_COLUMNS),
            pair_suffixes: ("_1".to_string(), "_2".to_string()),
            undefined_cohort_markers: strings(&["n.v.t."]),
            max_group_size: 10_000,
            oversize_policy: OversizePolicy::Skip,
            parallel: false,
            parallel_window: num_cpus::get() * 4,
            parallel_pair_budget: 2_000_000,
            show_progress: false,
        }
    }
}

impl ProjectionConfig {
    /// Header of the pair table: group columns, then both identity triplets
    #[must_use]
    pub fn output_header(&self) -> Vec<String> {
        let (first, second) = &self.pair_suffixes;
        self.group_columns
            .iter()
            .cloned()
            .chain(self.identity_columns.iter().map(|c| format!("{c}{first}")))
            .chain(self.identity_columns.iter().map(|c| format!("{c}{second}")))
            .collect()
    }

    /// Every column the projector reads
    #[must_use]
    pub fn required_columns(&self) -> Vec<String> {
        let mut columns = vec![self.year_column.clone()];
        for column in self.group_columns.iter().chain(&self.identity_columns) {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        columns
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_columns.is_empty() {
            return Err(NetworkError::config("group_columns must not be empty"));
        }
        if self.identity_columns.is_empty() {
            return Err(NetworkError::config("identity_columns must not be empty"));
        }
        if self.pair_suffixes.0 == self.pair_suffixes.1 {
            return Err(NetworkError::config("pair suffixes must differ"));
        }
        if self.max_group_size < 2 {
            return Err(NetworkError::config("max_group_size must be at least 2"));
        }
        if self.parallel_window == 0 {
            return Err(NetworkError::config("parallel_window must be positive"));
        }
        if self.parallel_pair_budget == 0 {
            return Err(NetworkError::config("parallel_pair_budget must be positive"));
        }
        Ok(())
    }
}

/// Escaping of fields that contain the delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEscape {
    /// Wrap the field in double quotes, doubling inner quotes
    #[default]
    Quote,
    /// Replace delimiters and line breaks with the given character
    Replace(char),
}

/// Configuration of delimited output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Field delimiter; must be ASCII
    pub delimiter: char,
    /// Escaping discipline for fields containing the delimiter
    pub escape: FieldEscape,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            escape: FieldEscape::Quote,
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(NetworkError::config(format!(
                "delimiter {:?} must be a single ASCII character other than quote or newline",
                self.delimiter
            )));
        }
        if let FieldEscape::Replace(c) = self.escape {
            if c == self.delimiter || matches!(c, '\n' | '\r') {
                return Err(NetworkError::config(
                    "replacement character must not be the delimiter or a line break",
                ));
            }
        }
        Ok(())
    }
}

/// One registry and how to turn it into enrollment and pair tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetProfile {
    /// Short name used as output file prefix
    pub name: String,
    /// Directory holding the yearly extracts
    pub source_dir: PathBuf,
    /// Columns kept in the bipartite table
    pub columns: Vec<String>,
    /// Enrollment filter
    pub filter: EnrollmentFilterConfig,
    /// Sort order of the bipartite table
    pub sort_columns: Vec<String>,
    /// Projection of the bipartite table
    pub projection: ProjectionConfig,
    /// Column/value pairs selecting the final grade; empty disables the extract
    pub final_grade: Vec<(String, String)>,
}

impl Default for DatasetProfile {
    fn default() -> Self {
        Self::secondary()
    }
}

impl DatasetProfile {
    /// Secondary-education registrations (VO)
    #[must_use]
    pub fn secondary() -> Self {
        Self {
            name: "vo".to_string(),
            source_dir: PathBuf::from("ONDERWIJSINSCHRTAB"),
            columns: strings(&[
                "RINPERSOONS",
                "RINPERSOON",
                "ONDERWIJSNR_crypt",
                "BRIN_crypt",
                "OPLNR",
                "AANVINSCHR",
                "EINDINSCHR",
                "TYPEONDERWIJS",
                "VOBRINVEST",
                "VOLEERJAAR",
            ]),
            filter: EnrollmentFilterConfig::default(),
            sort_columns: strings(&[
                "BRIN_crypt",
                "VOBRINVEST",
                "VOLEERJAAR",
                "OPLNR",
                "ONDERWIJSNR_crypt",
                "RINPERSOONS",
                "RINPERSOON",
            ]),
            projection: ProjectionConfig::default(),
            final_grade: Vec::new(),
        }
    }

    /// Primary-education participations (BO)
    #[must_use]
    pub fn primary() -> Self {
        let mut type_aliases = BTreeMap::new();
        type_aliases.insert("Basisonderwijs".to_string(), "BO".to_string());
        type_aliases.insert("Speciaal Basisonderwijs".to_string(), "SBO".to_string());

        Self {
            name: "bo".to_string(),
            source_dir: PathBuf::from("INSCHRWPOTAB"),
            columns: strings(&[
                "RINPERSOONS",
                "RINPERSOON",
                "ONDERWIJSNR_crypt",
                "WPOBRIN_crypt",
                "WPOOPLNR",
                "WPOTYPEPO",
                "WPOBRINVEST",
                "WPOLEERJAAR",
                "WPOVERBLIJFSJRBO",
                "WPODENOMINATIE",
            ]),
            filter: EnrollmentFilterConfig {
                education_type_column: "WPOTYPEPO".to_string(),
                education_type: "BO".to_string(),
                type_aliases,
                dates: None,
                ..EnrollmentFilterConfig::default()
            },
            sort_columns: strings(&[
                "WPOBRIN_crypt",
                "WPOBRINVEST",
                "WPOLEERJAAR",
                "WPOOPLNR",
                "ONDERWIJSNR_crypt",
                "RINPERSOONS",
                "RINPERSOON",
            ]),
            projection: ProjectionConfig {
                group_columns: strings(&[
                    "WPOBRIN_crypt",
                    "WPOBRINVEST",
                    "WPOLEERJAAR",
                    "WPOOPLNR",
                    "WPODENOMINATIE",
                ]),
                year_column: "WPOLEERJAAR".to_string(),
                ..ProjectionConfig::default()
            },
            final_grade: vec![
                ("WPOLEERJAAR".to_string(), "8".to_string()),
                ("WPOVERBLIJFSJRBO".to_string(), "8".to_string()),
            ],
        }
    }

    /// Columns that must be present in the raw extract
    #[must_use]
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns = self.columns.clone();
        let mut push = |column: &String| {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        };
        push(&self.filter.education_type_column);
        if let Some(dates) = &self.filter.dates {
            push(&dates.start_column);
            push(&dates.end_column);
        }
        columns
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(NetworkError::config("profile name must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(NetworkError::config(format!(
                "profile '{}' selects no columns",
                self.name
            )));
        }
        if !(1..=12).contains(&self.filter.academic_year_start_month) {
            return Err(NetworkError::config(format!(
                "academic_year_start_month {} is not a month",
                self.filter.academic_year_start_month
            )));
        }
        self.projection.validate()
    }
}

/// Method used for proportion confidence intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalMethod {
    /// Normal approximation
    #[default]
    Normal,
    /// Wilson score interval
    Wilson,
}

/// Parameters of the co-infection statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Metres added to every grid distance to account for cell resolution
    pub resolution_offset_m: f64,
    /// Infections closer than this many days are temporally associated
    pub co_infection_window_days: i64,
    /// Day zero for infection offsets
    pub reference_date: NaiveDate,
    /// Upper bounds of the distance buckets in metres
    pub distance_thresholds: Vec<f64>,
    /// Counts below this are suppressed in exported reports
    pub min_reportable: u64,
    /// Confidence interval method
    pub interval_method: IntervalMethod,
    /// Significance level of the intervals
    pub alpha: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            resolution_offset_m: 52.0,
            co_infection_window_days: 14,
            reference_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            distance_thresholds: vec![0.0, 300.0, 1_000.0, 3_000.0, 10_000.0, 30_000.0, 300_000.0],
            min_reportable: 10,
            interval_method: IntervalMethod::Normal,
            alpha: 0.05,
        }
    }
}

/// Configuration of a full pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory the profile source directories are relative to
    pub data_root: PathBuf,
    /// Years for which bipartite tables are built
    pub years: Vec<i32>,
    /// Years whose bipartite tables are projected; empty projects all
    pub project_years: Vec<i32>,
    /// Registers to process
    pub profiles: Vec<DatasetProfile>,
    /// Output directory for bipartite tables
    pub bipartite_dir: PathBuf,
    /// Output directory for pair tables
    pub projected_dir: PathBuf,
    /// Delimited output settings
    pub sink: SinkConfig,
    /// Optional row limit when loading extracts
    pub row_limit: Option<usize>,
    /// Statistics parameters
    pub stats: StatsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            years: (2000..2022).collect(),
            project_years: vec![2020],
            profiles: vec![DatasetProfile::secondary(), DatasetProfile::primary()],
            bipartite_dir: PathBuf::from("data/bipartite"),
            projected_dir: PathBuf::from("data/projected"),
            sink: SinkConfig::default(),
            row_limit: None,
            stats: StatsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = crate::error::util::safe_open_file(path, "pipeline configuration")?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sink.validate()?;
        for profile in &self.profiles {
            profile.validate()?;
        }
        let mut names: Vec<&str> = self.profiles.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(NetworkError::config("profile names must be unique"));
        }
        Ok(())
    }

    /// Profile by name
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&DatasetProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}
