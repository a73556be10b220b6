use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use school_network::ProjectionConfig;

/// Columns of a secondary-school bipartite table, in file order
pub const BIPARTITE_COLUMNS: [&str; 7] = [
    "BRIN_crypt",
    "VOBRINVEST",
    "VOLEERJAAR",
    "OPLNR",
    "ONDERWIJSNR_crypt",
    "RINPERSOONS",
    "RINPERSOON",
];

/// Build a batch of `Utf8` columns
#[must_use]
pub fn string_batch(columns: &[(&str, Vec<&str>)]) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, values)| Arc::new(StringArray::from(values.clone())) as ArrayRef)
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).expect("valid test batch")
}

/// One enrollment of a bipartite table
#[derive(Debug, Clone, Copy)]
pub struct Enrollment<'a> {
    pub school: &'a str,
    pub cohort: &'a str,
    pub program: &'a str,
    pub student: &'a str,
}

#[must_use]
pub fn enrollment<'a>(school: &'a str, cohort: &'a str, program: &'a str, student: &'a str) -> Enrollment<'a> {
    Enrollment {
        school,
        cohort,
        program,
        student,
    }
}

/// Build a bipartite table; every student gets a person id derived from its number
#[must_use]
pub fn bipartite_batch(rows: &[Enrollment<'_>]) -> RecordBatch {
    let person_ids: Vec<String> = rows.iter().map(|r| format!("p{}", r.student)).collect();
    string_batch(&[
        ("BRIN_crypt", rows.iter().map(|r| r.school).collect()),
        ("VOBRINVEST", rows.iter().map(|_| "00").collect()),
        ("VOLEERJAAR", rows.iter().map(|r| r.cohort).collect()),
        ("OPLNR", rows.iter().map(|r| r.program).collect()),
        ("ONDERWIJSNR_crypt", rows.iter().map(|r| r.student).collect()),
        ("RINPERSOONS", rows.iter().map(|_| "R").collect()),
        ("RINPERSOON", person_ids.iter().map(String::as_str).collect()),
    ])
}

/// Projection settings of the secondary register, quiet
#[must_use]
pub fn projection_config() -> ProjectionConfig {
    ProjectionConfig {
        show_progress: false,
        ..ProjectionConfig::default()
    }
}

/// Write `contents` to `dir/name`
pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create test directory");
    }
    std::fs::write(&path, contents).expect("write test file");
    path
}

/// Lines of a text file
#[must_use]
pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("read output")
        .lines()
        .map(str::to_string)
        .collect()
}

/// Unordered student pairs of pair rows, taking the student number of each member
///
/// `first` and `second` are the positions of the two student number columns.
#[must_use]
pub fn pair_set(rows: &[Vec<String>], first: usize, second: usize) -> BTreeSet<(String, String)> {
    rows.iter()
        .map(|row| {
            let (a, b) = (row[first].clone(), row[second].clone());
            if a <= b { (a, b) } else { (b, a) }
        })
        .collect()
}
