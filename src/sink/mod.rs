//! Streaming output of delimited tables
//!
//! Pair tables are far larger than memory, so rows are encoded straight into a
//! buffered writer and flushed at every group boundary. Fields are only quoted or
//! rewritten when they contain the delimiter, a quote or a line break.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use arrow::record_batch::RecordBatch;

use crate::config::{FieldEscape, SinkConfig};
use crate::error::{NetworkError, Result};
use crate::utils::arrow::TextColumns;

/// One unordered co-enrollment pair, borrowed from the projected table
#[derive(Debug, Clone, Copy)]
pub struct PairRow<'a> {
    /// Group key fields, written once
    pub key: &'a [&'a str],
    /// Identity fields of the first member
    pub first: &'a [&'a str],
    /// Identity fields of the second member
    pub second: &'a [&'a str],
}

impl<'a> PairRow<'a> {
    /// All fields in output order
    pub fn fields(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.key
            .iter()
            .chain(self.first)
            .chain(self.second)
            .copied()
    }
}

/// Destination of projected pairs
pub trait PairSink {
    /// Write one pair row
    fn write_pair(&mut self, pair: &PairRow<'_>) -> Result<()>;

    /// Called after the last pair of every group
    fn end_group(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Encodes fields and rows with a delimiter and escaping policy
#[derive(Debug, Clone, Copy)]
pub struct RowEncoder {
    delimiter: u8,
    escape: FieldEscape,
}

impl RowEncoder {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            // validate() guarantees an ASCII delimiter
            delimiter: config.delimiter as u8,
            escape: config.escape,
        })
    }

    #[must_use]
    pub const fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Whether `field` must be quoted or rewritten
    #[inline]
    #[must_use]
    pub fn needs_escape(&self, field: &str) -> bool {
        let delimiter = self.delimiter;
        match self.escape {
            FieldEscape::Quote => field
                .bytes()
                .any(|b| b == delimiter || b == b'"' || b == b'\n' || b == b'\r'),
            FieldEscape::Replace(_) => field
                .bytes()
                .any(|b| b == delimiter || b == b'\n' || b == b'\r'),
        }
    }

    /// Append one field to `out`
    pub fn encode_field(&self, out: &mut Vec<u8>, field: &str) {
        if !self.needs_escape(field) {
            out.extend_from_slice(field.as_bytes());
            return;
        }

        match self.escape {
            FieldEscape::Quote => {
                out.push(b'"');
                for b in field.bytes() {
                    if b == b'"' {
                        out.push(b'"');
                    }
                    out.push(b);
                }
                out.push(b'"');
            }
            FieldEscape::Replace(replacement) => {
                let mut utf8 = [0u8; 4];
                let replacement = replacement.encode_utf8(&mut utf8).as_bytes();
                for b in field.bytes() {
                    if b == self.delimiter || b == b'\n' || b == b'\r' {
                        out.extend_from_slice(replacement);
                    } else {
                        out.push(b);
                    }
                }
            }
        }
    }

    /// Append one row, terminated by a newline
    pub fn encode_row<'f>(&self, out: &mut Vec<u8>, fields: impl IntoIterator<Item = &'f str>) {
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            self.encode_field(out, field);
        }
        out.push(b'\n');
    }

    /// Encoded header line
    #[must_use]
    pub fn encode_header(&self, header: &[String]) -> Vec<u8> {
        let mut line = Vec::new();
        self.encode_row(&mut line, header.iter().map(String::as_str));
        line
    }
}

/// Buffered writer of delimited rows
pub struct DelimitedWriter<W: Write> {
    out: BufWriter<W>,
    encoder: RowEncoder,
    line: Vec<u8>,
    rows: u64,
}

impl DelimitedWriter<File> {
    /// Create (or truncate) `path` and write the header
    pub fn create(path: &Path, header: &[String], config: &SinkConfig) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(file, Some(header), config)
    }

    /// Append to `path`, writing the header only when the file is new or empty
    ///
    /// An existing header must equal `header`, otherwise rows would land under
    /// the wrong columns. A missing final line break is restored first.
    pub fn append(path: &Path, header: &[String], config: &SinkConfig) -> Result<Self> {
        let encoder = RowEncoder::new(config)?;
        let expected = encoder.encode_header(header);

        let has_content = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        if has_content {
            let mut existing = Vec::new();
            BufReader::new(File::open(path)?).read_until(b'\n', &mut existing)?;
            if existing.last() != Some(&b'\n') {
                existing.push(b'\n');
            }
            if existing != expected {
                return Err(NetworkError::HeaderMismatch {
                    path: path.to_path_buf(),
                });
            }
        }

        let mut file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        if has_content {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }
        Self::new(file, (!has_content).then_some(header), config)
    }
}

impl<W: Write> DelimitedWriter<W> {
    /// Wrap `inner`, writing `header` first when given
    pub fn new(inner: W, header: Option<&[String]>, config: &SinkConfig) -> Result<Self> {
        let encoder = RowEncoder::new(config)?;
        let mut out = BufWriter::new(inner);
        if let Some(header) = header {
            out.write_all(&encoder.encode_header(header))?;
        }
        Ok(Self {
            out,
            encoder,
            line: Vec::with_capacity(256),
            rows: 0,
        })
    }

    #[must_use]
    pub const fn encoder(&self) -> &RowEncoder {
        &self.encoder
    }

    /// Data rows written so far (excluding the header)
    #[must_use]
    pub const fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Write one row of fields
    pub fn write_record<'f>(&mut self, fields: impl IntoIterator<Item = &'f str>) -> Result<()> {
        self.line.clear();
        self.encoder.encode_row(&mut self.line, fields);
        self.out.write_all(&self.line)?;
        self.rows += 1;
        Ok(())
    }

    /// Write rows already encoded with this writer's encoder
    pub fn write_encoded(&mut self, bytes: &[u8], rows: u64) -> Result<()> {
        self.out.write_all(bytes)?;
        self.rows += rows;
        Ok(())
    }

    /// Write every row of `batch`, all columns rendered as text
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let names: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let text = TextColumns::from_batch(batch, &names, "batch output")?;
        for row in 0..text.num_rows() {
            self.write_record(text.row(row))?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        self.out
            .into_inner()
            .map_err(|e| NetworkError::IoError(e.into_error()))
    }
}

impl<W: Write> PairSink for DelimitedWriter<W> {
    fn write_pair(&mut self, pair: &PairRow<'_>) -> Result<()> {
        self.write_record(pair.fields())
    }

    fn end_group(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Collects encoded rows in memory, used to render groups off the writer thread
#[derive(Debug)]
pub struct EncodedBuffer {
    encoder: RowEncoder,
    bytes: Vec<u8>,
    rows: u64,
}

impl EncodedBuffer {
    #[must_use]
    pub const fn new(encoder: RowEncoder) -> Self {
        Self {
            encoder,
            bytes: Vec::new(),
            rows: 0,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }
}

impl PairSink for EncodedBuffer {
    fn write_pair(&mut self, pair: &PairRow<'_>) -> Result<()> {
        self.encoder.encode_row(&mut self.bytes, pair.fields());
        self.rows += 1;
        Ok(())
    }
}

/// Keeps owned pair rows, one `Vec` per group
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    groups: Vec<Vec<Vec<String>>>,
    current: Vec<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed groups, in emission order
    #[must_use]
    pub fn groups(&self) -> &[Vec<Vec<String>>] {
        &self.groups
    }

    /// All rows of completed groups
    pub fn rows(&self) -> impl Iterator<Item = &Vec<String>> {
        self.groups.iter().flatten()
    }
}

impl PairSink for MemorySink {
    fn write_pair(&mut self, pair: &PairRow<'_>) -> Result<()> {
        self.current.push(pair.fields().map(str::to_string).collect());
        Ok(())
    }

    fn end_group(&mut self) -> Result<()> {
        self.groups.push(std::mem::take(&mut self.current));
        Ok(())
    }
}
