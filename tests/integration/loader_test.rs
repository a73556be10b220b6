use std::fs::File;
use std::path::Path;

use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use school_network::loader::find_dataset_file;
use school_network::{LoadOptions, NetworkError, TableLoader, load_file};
use tempfile::TempDir;

use crate::utils::{string_batch, write_file};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

fn text(batch: &RecordBatch, column: &str) -> Vec<Option<String>> {
    let array = batch
        .column_by_name(column)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i).to_string()))
        .collect()
}

#[test]
fn test_tsv_column_selection_keeps_requested_order() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "vo_2020.tsv", "a\tb\tc\n1\t007\tx\n2\t\ty\n");

    let options = LoadOptions::default().with_columns(strings(&["c", "a"]));
    let batch = load_file(&path, &options).unwrap();

    assert_eq!(column_names(&batch), vec!["c", "a"]);
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(text(&batch, "c"), vec![Some("x".to_string()), Some("y".to_string())]);

    // Leading zeros survive and empty cells come back null
    let all = load_file(&path, &LoadOptions::default()).unwrap();
    assert_eq!(text(&all, "b"), vec![Some("007".to_string()), None]);
}

#[test]
fn test_missing_selected_column() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "t.tsv", "a\tb\n1\t2\n");
    let options = LoadOptions::default().with_columns(strings(&["a", "z"]));

    match load_file(&path, &options).unwrap_err() {
        NetworkError::MissingColumns { columns, .. } => assert_eq!(columns, vec!["z"]),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_unsupported_format() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "ONDERWIJSINSCHRTAB2020V1.sav", b"\x00\x01");
    let err = load_file(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, NetworkError::UnsupportedFormat { .. }));
    assert!(err.is_input_error());
}

#[test]
fn test_semicolon_file_and_row_limit() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "links.csv",
        "RINPERSOONSRC;RINPERSOONDST;linktype\n1;2;103\n3;4;102\n5;6;104\n",
    );
    let options = LoadOptions::default().with_row_limit(Some(2));
    let batch = load_file(&path, &options).unwrap();

    assert_eq!(column_names(&batch), vec!["RINPERSOONSRC", "RINPERSOONDST", "linktype"]);
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(
        text(&batch, "linktype"),
        vec![Some("103".to_string()), Some("102".to_string())]
    );
}

#[test]
fn test_latin1_file_is_transcoded() {
    let dir = TempDir::new().unwrap();
    let mut contents = b"gemeente\tcode\n".to_vec();
    contents.extend_from_slice(b"S\xfadwest-Frysl\xe2n\t1900\n");
    let path = write_file(dir.path(), "gem.tsv", contents);

    let batch = load_file(&path, &LoadOptions::default()).unwrap();
    assert_eq!(text(&batch, "gemeente"), vec![Some("Súdwest-Fryslân".to_string())]);
}

#[test]
fn test_latin1_row_deep_in_file_is_transcoded() {
    let dir = TempDir::new().unwrap();
    let mut contents = b"naam\tcode\n".to_vec();
    for i in 0..10_000 {
        contents.extend_from_slice(format!("row{i:05}\t{i}\n").as_bytes());
    }
    // Well past the first 64 KiB
    assert!(contents.len() > 100_000);
    contents.extend_from_slice(b"caf\xe9\tx\n");
    let path = write_file(dir.path(), "late.tsv", contents);

    let batch = load_file(&path, &LoadOptions::default()).unwrap();
    assert_eq!(batch.num_rows(), 10_001);
    let names = text(&batch, "naam");
    assert_eq!(names[0], Some("row00000".to_string()));
    assert_eq!(names[10_000], Some("café".to_string()));
}

fn write_parquet(path: &Path, batch: &RecordBatch) {
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

#[test]
fn test_parquet_selection_and_limit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("INSCHRWPOTAB2019.parquet");
    write_parquet(
        &path,
        &string_batch(&[
            ("RINPERSOON", vec!["1", "2", "3"]),
            ("WPOTYPEPO", vec!["BO", "BO", "SBO"]),
            ("WPOLEERJAAR", vec!["1", "2", "3"]),
        ]),
    );

    let options = LoadOptions::default()
        .with_columns(strings(&["WPOLEERJAAR", "RINPERSOON"]))
        .with_row_limit(Some(2));
    let batch = load_file(&path, &options).unwrap();

    assert_eq!(column_names(&batch), vec!["WPOLEERJAAR", "RINPERSOON"]);
    assert_eq!(
        text(&batch, "RINPERSOON"),
        vec![Some("1".to_string()), Some("2".to_string())]
    );
}

#[test]
fn test_latest_version_is_selected() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "ONDERWIJSINSCHRTAB2020V1.tsv", "a\n1\n");
    write_file(dir.path(), "ONDERWIJSINSCHRTAB2020V3.tsv", "a\n3\n");
    write_file(dir.path(), "ONDERWIJSINSCHRTAB2020V2.tsv", "a\n2\n");
    write_file(dir.path(), "ONDERWIJSINSCHRTAB2019V9.tsv", "a\n9\n");

    let found = find_dataset_file(dir.path(), 2020).unwrap().unwrap();
    assert_eq!(
        found.file_name().unwrap().to_str().unwrap(),
        "ONDERWIJSINSCHRTAB2020V3.tsv"
    );
    assert!(find_dataset_file(dir.path(), 2021).unwrap().is_none());
}

#[test]
fn test_table_loader_reads_dataset_year() {
    let root = TempDir::new().unwrap();
    write_file(
        &root.path().join("ONDERWIJSINSCHRTAB"),
        "ONDERWIJSINSCHRTAB2020V1.tsv",
        "RINPERSOON\tBRIN_crypt\n1\tS1\n",
    );
    let loader = TableLoader::new(root.path());

    let batch = loader
        .load(Path::new("ONDERWIJSINSCHRTAB"), 2020, &LoadOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert!(
        loader
            .load(Path::new("ONDERWIJSINSCHRTAB"), 2018, &LoadOptions::default())
            .unwrap()
            .is_none()
    );
    assert!(
        loader
            .load(Path::new("MISSING"), 2020, &LoadOptions::default())
            .is_err()
    );
}
