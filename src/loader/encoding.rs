//! Text encoding of delimited extracts
//!
//! Older extracts are written in Latin-1. Arrow's CSV reader only accepts UTF-8,
//! so a file is passed through while it is valid UTF-8 and transcoded from
//! Latin-1 from its first invalid sequence on.

use std::io::{self, BufRead, Read};

/// Bytes read from the underlying reader at a time
const CHUNK_LEN: usize = 64 * 1024;

/// Encoding a [`TextDecoder`] is currently reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

/// Append Latin-1 `bytes` to `out` as UTF-8
pub fn latin1_to_utf8(bytes: &[u8], out: &mut Vec<u8>) {
    out.reserve(bytes.len());
    for &byte in bytes {
        if byte < 0x80 {
            out.push(byte);
        } else {
            out.push(0xC0 | (byte >> 6));
            out.push(0x80 | (byte & 0x3F));
        }
    }
}

/// Reader producing UTF-8 from a UTF-8 or Latin-1 source
///
/// Reading starts as UTF-8. The first byte sequence that is not valid UTF-8, at
/// any position in the stream, switches the decoder to Latin-1 for the rest of
/// the input. A multi-byte sequence split across reads is held back until it
/// completes.
pub struct TextDecoder<R> {
    inner: R,
    source: String,
    encoding: Encoding,
    raw: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    read_total: u64,
}

impl<R: Read> TextDecoder<R> {
    /// Wrap `inner`; `source` names it in the log line written on a switch
    pub fn new(inner: R, source: impl Into<String>) -> Self {
        Self {
            inner,
            source: source.into(),
            encoding: Encoding::Utf8,
            raw: Vec::with_capacity(CHUNK_LEN),
            out: Vec::with_capacity(CHUNK_LEN),
            pos: 0,
            read_total: 0,
        }
    }

    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Decode the next chunk into `out`; false once the source is exhausted
    fn refill(&mut self) -> io::Result<bool> {
        self.out.clear();
        self.pos = 0;

        let carried = self.raw.len();
        self.raw.resize(carried + CHUNK_LEN, 0);
        let n = loop {
            match self.inner.read(&mut self.raw[carried..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.raw.truncate(carried);
                    return Err(e);
                }
            }
        };
        self.raw.truncate(carried + n);
        let base = self.read_total - carried as u64;
        self.read_total += n as u64;
        if self.raw.is_empty() {
            return Ok(false);
        }

        match self.encoding {
            Encoding::Latin1 => {
                latin1_to_utf8(&self.raw, &mut self.out);
                self.raw.clear();
            }
            Encoding::Utf8 => match std::str::from_utf8(&self.raw) {
                Ok(_) => {
                    std::mem::swap(&mut self.raw, &mut self.out);
                    self.raw.clear();
                }
                // Incomplete sequence at the end of the chunk
                Err(e) if e.error_len().is_none() && n > 0 => {
                    let valid = e.valid_up_to();
                    self.out.extend_from_slice(&self.raw[..valid]);
                    self.raw.drain(..valid);
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    log::info!(
                        "{} is not UTF-8 from byte {}, reading the rest as Latin-1",
                        self.source,
                        base + valid as u64
                    );
                    self.encoding = Encoding::Latin1;
                    self.out.extend_from_slice(&self.raw[..valid]);
                    latin1_to_utf8(&self.raw[valid..], &mut self.out);
                    self.raw.clear();
                }
            },
        }
        Ok(true)
    }
}

impl<R: Read> BufRead for TextDecoder<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos == self.out.len() {
            if !self.refill()? {
                break;
            }
        }
        Ok(&self.out[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.out.len());
    }
}

impl<R: Read> Read for TextDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}
