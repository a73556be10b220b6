use arrow::array::{Array, StringArray};
use school_network::config::{FieldEscape, SinkConfig};
use school_network::{DelimitedWriter, LoadOptions, NetworkError, load_file};
use tempfile::TempDir;

use crate::utils::{read_lines, write_file};

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_append_writes_header_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stats.tsv");
    let columns = header(&["Group", "N"]);
    let config = SinkConfig::default();

    let mut first = DelimitedWriter::append(&path, &columns, &config).unwrap();
    first.write_record(["a_all", "10"]).unwrap();
    first.finish().unwrap();

    let mut second = DelimitedWriter::append(&path, &columns, &config).unwrap();
    second.write_record(["b_all", "12"]).unwrap();
    assert_eq!(second.rows_written(), 1);
    second.finish().unwrap();

    assert_eq!(read_lines(&path), vec!["Group\tN", "a_all\t10", "b_all\t12"]);
}

#[test]
fn test_append_rejects_other_header() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "stats.tsv", "Group\tDistance\nx\t1\n");

    let err = DelimitedWriter::append(&path, &header(&["Group", "N"]), &SinkConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, NetworkError::HeaderMismatch { .. }));
    // Untouched
    assert_eq!(read_lines(&path), vec!["Group\tDistance", "x\t1"]);
}

#[test]
fn test_append_to_empty_file_writes_header() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "empty.tsv", "");

    let mut writer = DelimitedWriter::append(&path, &header(&["a"]), &SinkConfig::default()).unwrap();
    writer.write_record(["1"]).unwrap();
    writer.finish().unwrap();

    assert_eq!(read_lines(&path), vec!["a", "1"]);
}

#[test]
fn test_append_restores_missing_line_break() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "stats.tsv", "Group\tN\na_all\t10");

    let mut writer = DelimitedWriter::append(&path, &header(&["Group", "N"]), &SinkConfig::default()).unwrap();
    writer.write_record(["b_all", "12"]).unwrap();
    writer.finish().unwrap();

    assert_eq!(read_lines(&path), vec!["Group\tN", "a_all\t10", "b_all\t12"]);
}

#[test]
fn test_append_after_bare_header() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "stats.tsv", "Group\tN");

    let mut writer = DelimitedWriter::append(&path, &header(&["Group", "N"]), &SinkConfig::default()).unwrap();
    writer.write_record(["a_all", "10"]).unwrap();
    writer.finish().unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "Group\tN\na_all\t10\n");
}

#[test]
fn test_create_truncates() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "pairs.tsv", "old\nrows\nhere\n");

    let writer = DelimitedWriter::create(&path, &header(&["x", "y"]), &SinkConfig::default()).unwrap();
    writer.finish().unwrap();

    assert_eq!(read_lines(&path), vec!["x\ty"]);
}

#[test]
fn test_quoted_fields_read_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quoted.tsv");

    let mut writer =
        DelimitedWriter::create(&path, &header(&["school", "name"]), &SinkConfig::default()).unwrap();
    writer.write_record(["S1", "De\tSchool"]).unwrap();
    writer.write_record(["S2", "plain"]).unwrap();
    writer.finish().unwrap();

    let batch = load_file(&path, &LoadOptions::default()).unwrap();
    let names = batch
        .column_by_name("name")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(names.value(0), "De\tSchool");
    assert_eq!(names.value(1), "plain");
}

#[test]
fn test_replace_policy_keeps_row_shape() {
    let config = SinkConfig {
        delimiter: ';',
        escape: FieldEscape::Replace('_'),
    };
    let mut writer = DelimitedWriter::new(Vec::new(), Some(&header(&["a", "b"])), &config).unwrap();
    writer.write_record(["x;y", "multi\nline"]).unwrap();
    let bytes = writer.finish().unwrap();

    assert_eq!(String::from_utf8(bytes).unwrap(), "a;b\nx_y;multi_line\n");
}

#[test]
fn test_non_ascii_delimiter_is_rejected() {
    let config = SinkConfig {
        delimiter: '§',
        escape: FieldEscape::Quote,
    };
    let err = DelimitedWriter::new(Vec::new(), None, &config).err().unwrap();
    assert!(matches!(err, NetworkError::ConfigError(_)));
}
