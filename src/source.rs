//! Blocking input sources for [`CsvReader`](crate::CsvReader).

use std::fs;
use std::io::BufRead;
use std::path::Path;

use tracing::trace;

use crate::options::Options;
use crate::splitter::{Cut, RecordScanner, ScanState};
use crate::{CsvError, CsvResult};

/// Where a reader pulls records from.
///
/// Records are cut quote-aware, blank lines are already dropped, and the
/// terminator is not included.
pub trait RecordSource {
    /// Append the next record to `buf` and return the line it starts on, or
    /// `None` at end of input.
    fn next_record(&mut self, buf: &mut Vec<u8>) -> CsvResult<Option<usize>>;

    /// Everything not yet consumed, as raw bytes.
    fn read_all(&mut self) -> CsvResult<Vec<u8>>;

    fn can_reset(&self) -> bool {
        false
    }

    fn reset(&mut self) -> CsvResult<()> {
        Err(CsvError::Unsupported("reset on a single-pass source"))
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn next_record(&mut self, buf: &mut Vec<u8>) -> CsvResult<Option<usize>> {
        (**self).next_record(buf)
    }

    fn read_all(&mut self) -> CsvResult<Vec<u8>> {
        (**self).read_all()
    }

    fn can_reset(&self) -> bool {
        (**self).can_reset()
    }

    fn reset(&mut self) -> CsvResult<()> {
        (**self).reset()
    }
}

/// Resettable source over any in-memory byte container.
#[derive(Debug, Clone)]
pub struct SliceSource<B> {
    data: B,
    scanner: RecordScanner,
    pos: usize,
    next_line: usize,
}

/// In-memory text, owned.
pub type MemorySource = SliceSource<Vec<u8>>;

impl<B: AsRef<[u8]>> SliceSource<B> {
    pub fn new(data: B, options: &Options) -> Self {
        Self {
            data,
            scanner: RecordScanner::new(options),
            pos: 0,
            next_line: 1,
        }
    }

    /// The whole underlying buffer, consumed or not.
    pub fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl MemorySource {
    pub fn from_text(text: impl Into<String>, options: &Options) -> Self {
        Self::new(text.into().into_bytes(), options)
    }

    /// Read a whole file before parsing.
    pub fn from_path(path: impl AsRef<Path>, options: &Options) -> CsvResult<Self> {
        Ok(Self::new(fs::read(path)?, options))
    }

    /// Drain another source into memory so it can be rewound.
    pub fn from_source<S: RecordSource + ?Sized>(
        source: &mut S,
        options: &Options,
    ) -> CsvResult<Self> {
        Ok(Self::new(source.read_all()?, options))
    }
}

impl<B: AsRef<[u8]>> RecordSource for SliceSource<B> {
    fn next_record(&mut self, buf: &mut Vec<u8>) -> CsvResult<Option<usize>> {
        loop {
            let rest = &self.data.as_ref()[self.pos..];
            match self.scanner.cut(rest, true) {
                Cut::Incomplete => return Ok(None),
                Cut::Blank {
                    consumed,
                    line_breaks,
                } => {
                    self.pos += consumed;
                    self.next_line += line_breaks;
                }
                Cut::Record {
                    len,
                    consumed,
                    line_breaks,
                } => {
                    buf.extend_from_slice(&rest[..len]);
                    let line = self.next_line;
                    self.pos += consumed;
                    self.next_line += line_breaks;
                    return Ok(Some(line));
                }
            }
        }
    }

    fn read_all(&mut self) -> CsvResult<Vec<u8>> {
        let rest = self.data.as_ref()[self.pos..].to_vec();
        self.pos = self.data.as_ref().len();
        Ok(rest)
    }

    fn can_reset(&self) -> bool {
        true
    }

    fn reset(&mut self) -> CsvResult<()> {
        self.pos = 0;
        self.next_line = 1;
        Ok(())
    }
}

/// Single-pass source over a buffered reader.
///
/// Reads physical lines and joins them until a record boundary outside quotes
/// is found. Scanning resumes where the previous read stopped, and consumed
/// bytes are dropped once per refill.
#[derive(Debug)]
pub struct StreamSource<R> {
    reader: R,
    scanner: RecordScanner,
    scan: ScanState,
    pending: Vec<u8>,
    start: usize,
    next_line: usize,
    eof: bool,
}

impl<R: BufRead> StreamSource<R> {
    pub fn new(reader: R, options: &Options) -> Self {
        Self {
            reader,
            scanner: RecordScanner::new(options),
            scan: ScanState::new(),
            pending: Vec::new(),
            start: 0,
            next_line: 1,
            eof: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.pending.drain(..self.start);
            self.start = 0;
        }
    }
}

impl<R: BufRead> RecordSource for StreamSource<R> {
    fn next_record(&mut self, buf: &mut Vec<u8>) -> CsvResult<Option<usize>> {
        loop {
            let rest = &self.pending[self.start..];
            match self.scanner.resume(rest, &mut self.scan, self.eof) {
                Cut::Incomplete if self.eof => return Ok(None),
                Cut::Incomplete => {
                    self.compact();
                    let n = self.reader.read_until(b'\n', &mut self.pending)?;
                    if n == 0 {
                        trace!(pending = self.pending.len(), "stream source reached eof");
                        self.eof = true;
                    }
                }
                Cut::Blank {
                    consumed,
                    line_breaks,
                } => {
                    self.start += consumed;
                    self.next_line += line_breaks;
                }
                Cut::Record {
                    len,
                    consumed,
                    line_breaks,
                } => {
                    buf.extend_from_slice(&rest[..len]);
                    self.start += consumed;
                    let line = self.next_line;
                    self.next_line += line_breaks;
                    return Ok(Some(line));
                }
            }
        }
    }

    fn read_all(&mut self) -> CsvResult<Vec<u8>> {
        self.compact();
        self.scan = ScanState::new();
        let mut out = std::mem::take(&mut self.pending);
        self.reader.read_to_end(&mut out)?;
        self.eof = true;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn no_header() -> Options {
        Options::builder().has_header(false).build().unwrap()
    }

    fn drain<S: RecordSource>(source: &mut S) -> Vec<(usize, String)> {
        let mut out = Vec::new();
        let mut buf = Vec::new();
        while let Some(line) = source.next_record(&mut buf).unwrap() {
            out.push((line, String::from_utf8(buf.clone()).unwrap()));
            buf.clear();
        }
        out
    }

    #[test]
    fn test_memory_source_reset() {
        let opts = no_header();
        let mut src = MemorySource::from_text("a\n\nb\n", &opts);
        assert_eq!(
            drain(&mut src),
            vec![(1, "a".to_string()), (3, "b".to_string())]
        );
        assert!(src.can_reset());
        src.reset().unwrap();
        assert_eq!(drain(&mut src).len(), 2);
    }

    #[test]
    fn test_stream_source_joins_quoted_lines() {
        let opts = no_header();
        let mut src = StreamSource::new(Cursor::new("x,\"1\n2\n3\"\r\ny,4"), &opts);
        assert_eq!(
            drain(&mut src),
            vec![(1, "x,\"1\n2\n3\"".to_string()), (4, "y,4".to_string())]
        );
    }

    #[test]
    fn test_stream_source_not_resettable() {
        let opts = no_header();
        let mut src = StreamSource::new(Cursor::new("a"), &opts);
        assert!(!src.can_reset());
        assert!(matches!(src.reset(), Err(CsvError::Unsupported(_))));
    }

    #[test]
    fn test_stream_source_custom_terminator_within_line() {
        let opts = Options::builder()
            .has_header(false)
            .line_terminator(";;")
            .build()
            .unwrap();
        let mut src = StreamSource::new(Cursor::new("a,b;;c,d;;e"), &opts);
        let got: Vec<_> = drain(&mut src).into_iter().map(|(_, s)| s).collect();
        assert_eq!(got, vec!["a,b", "c,d", "e"]);
    }

    #[test]
    fn test_read_all_into_memory() {
        let opts = no_header();
        let mut stream = StreamSource::new(Cursor::new("a\nb\nc"), &opts);
        let mut buf = Vec::new();
        stream.next_record(&mut buf).unwrap();
        let mut mem = MemorySource::from_source(&mut stream, &opts).unwrap();
        let got: Vec<_> = drain(&mut mem).into_iter().map(|(_, s)| s).collect();
        assert_eq!(got, vec!["b", "c"]);
    }
}
