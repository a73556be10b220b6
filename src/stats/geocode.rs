//! Residence lookup by person

use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::stats::distance::{GridCell, Residence};
use crate::utils::arrow::TextColumns;
use crate::utils::logging::log_anomaly;

/// Column names of an address table
#[derive(Debug, Clone)]
pub struct ResidenceColumns {
    pub person: String,
    pub address: String,
    pub cell: String,
}

impl Default for ResidenceColumns {
    fn default() -> Self {
        Self {
            person: "RINPERSOON".to_string(),
            address: "RINOBJECTNUMMER".to_string(),
            cell: "VRLVIERKANT100M".to_string(),
        }
    }
}

/// Person to residence lookup
#[derive(Debug, Clone, Default)]
pub struct GeoLookup {
    residences: FxHashMap<String, Residence>,
}

impl GeoLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an address table
    ///
    /// When a person has several rows the last one wins. Rows with an unknown grid
    /// cell are skipped and counted.
    pub fn from_batch(batch: &RecordBatch, columns: &ResidenceColumns) -> Result<Self> {
        let names = [
            columns.person.clone(),
            columns.address.clone(),
            columns.cell.clone(),
        ];
        let text = TextColumns::from_batch(batch, &names, "address table")?;

        let mut lookup = Self::new();
        let mut unknown = 0u64;
        for row in 0..text.num_rows() {
            let person = text.value(0, row).trim();
            if person.is_empty() {
                continue;
            }
            let Some(cell) = GridCell::parse(text.value(2, row)) else {
                unknown += 1;
                continue;
            };
            lookup.insert(
                person,
                Residence {
                    address: text.value(1, row).trim().to_string(),
                    cell,
                },
            );
        }

        log_anomaly(unknown, "addresses without a known grid cell");
        log::info!("Loaded residences of {} people", lookup.len());
        Ok(lookup)
    }

    pub fn insert(&mut self, person: &str, residence: Residence) {
        self.residences.insert(person.to_string(), residence);
    }

    #[must_use]
    pub fn get(&self, person: &str) -> Option<&Residence> {
        self.residences.get(person.trim())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.residences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.residences.is_empty()
    }
}
