//! First positive test per person, as days since a reference date

use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::enrollment::parse_registry_date;
use crate::error::Result;
use crate::utils::arrow::TextColumns;
use crate::utils::logging::log_anomaly;

/// Column names and result coding of a test table
#[derive(Debug, Clone)]
pub struct TestColumns {
    pub person: String,
    pub sample_date: String,
    pub result: String,
    /// Result value of a negative test
    pub negative: String,
}

impl Default for TestColumns {
    fn default() -> Self {
        Self {
            person: "RINPERSOON".to_string(),
            sample_date: "DatumMonsterafname".to_string(),
            result: "Testuitslag".to_string(),
            negative: "NEGATIEF".to_string(),
        }
    }
}

/// Person to infection day lookup
#[derive(Debug, Clone, Default)]
pub struct InfectionLookup {
    days: FxHashMap<String, i64>,
}

impl InfectionLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a test table
    ///
    /// Blank person ids are skipped. With `only_positives` negative tests are
    /// ignored. Day offsets are relative to `reference`.
    pub fn from_batch(
        batch: &RecordBatch,
        columns: &TestColumns,
        reference: NaiveDate,
        only_positives: bool,
    ) -> Result<Self> {
        let names = [
            columns.person.clone(),
            columns.sample_date.clone(),
            columns.result.clone(),
        ];
        let text = TextColumns::from_batch(batch, &names, "test table")?;

        let mut lookup = Self::new();
        let mut invalid_dates = 0u64;
        for row in 0..text.num_rows() {
            let person = text.value(0, row).trim().trim_matches('"');
            if person.is_empty() {
                continue;
            }
            if only_positives && text.value(2, row).trim() == columns.negative {
                continue;
            }
            let Some(date) = parse_registry_date(text.value(1, row)) else {
                invalid_dates += 1;
                continue;
            };
            lookup.insert(person, (date - reference).num_days());
        }

        log_anomaly(invalid_dates, "tests with an unreadable sample date");
        log::info!("Loaded infection days of {} people", lookup.len());
        Ok(lookup)
    }

    /// Record a test day, keeping the earliest day per person
    pub fn insert(&mut self, person: &str, day: i64) {
        self.days
            .entry(person.to_string())
            .and_modify(|d| *d = (*d).min(day))
            .or_insert(day);
    }

    #[must_use]
    pub fn day(&self, person: &str) -> Option<i64> {
        self.days.get(person.trim()).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.days.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Both infected within `window_days` of each other
#[must_use]
pub fn co_infected(a: Option<i64>, b: Option<i64>, window_days: i64) -> bool {
    matches!((a, b), (Some(a), Some(b)) if (a - b).abs() < window_days)
}

/// Neither person has a known infection
#[must_use]
pub const fn not_infected(a: Option<i64>, b: Option<i64>) -> bool {
    a.is_none() && b.is_none()
}
