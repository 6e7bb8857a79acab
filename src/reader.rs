//! Blocking reader façade.

use std::fmt;
use std::io::BufRead;
use std::path::Path;

use tracing::{debug, warn};

use crate::detect::FormatDetector;
use crate::options::Options;
use crate::pool::{PooledBuffer, DEFAULT_BUFFER_SIZE};
use crate::record::{RawRecord, Record};
use crate::source::{MemorySource, RecordSource, StreamSource};
use crate::tokenizer::FieldTokenizer;
use crate::validation::{ValidationError, ValidationResult};
use crate::{CsvError, CsvResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    NotStarted,
    Reading,
    Exhausted,
}

pub(crate) type ErrorCallback = Box<dyn FnMut(&ValidationError) + Send>;

/// Header handling, counters and validation shared by the blocking and async
/// readers. Knows nothing about where bytes come from.
pub(crate) struct ReaderCore {
    pub(crate) options: Options,
    pub(crate) state: ReaderState,
    line_number: usize,
    record_count: u64,
    headers: Option<Record>,
    header_pending: bool,
    expected_fields: Option<usize>,
    validation: ValidationResult,
    on_error: Option<ErrorCallback>,
}

impl ReaderCore {
    pub(crate) fn new(options: Options) -> Self {
        Self {
            header_pending: options.has_header(),
            expected_fields: options.expected_field_count(),
            options,
            state: ReaderState::NotStarted,
            line_number: 0,
            record_count: 0,
            headers: None,
            validation: ValidationResult::default(),
            on_error: None,
        }
    }

    pub(crate) fn set_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    pub(crate) fn buffer(&self) -> PooledBuffer {
        match self.options.buffer_pool() {
            Some(pool) => pool.rent(),
            None => PooledBuffer::detached(DEFAULT_BUFFER_SIZE),
        }
    }

    pub(crate) fn header_pending(&self) -> bool {
        self.header_pending
    }

    /// Store `text` as the header row.
    pub(crate) fn take_header(&mut self, text: &str, line_number: usize) {
        self.header_pending = false;
        let header = Record::parse(text, line_number, &self.options);
        debug!(line_number, fields = header.len(), "header consumed");
        self.headers = Some(header);
    }

    /// Count a data record and validate it.
    pub(crate) fn admit(&mut self, text: &str, line_number: usize) {
        self.state = ReaderState::Reading;
        self.line_number = line_number;
        self.record_count += 1;
        if self.options.validate() {
            self.inspect(text, line_number);
        }
    }

    /// Count a record without validating it. The first data record still
    /// sets the expected field count, even when skipped.
    pub(crate) fn skip(&mut self, bytes: &[u8], line_number: usize) -> CsvResult<()> {
        self.state = ReaderState::Reading;
        self.line_number = line_number;
        self.record_count += 1;
        if self.options.validate() && self.expected_fields.is_none() {
            let text = decode(bytes, line_number)?;
            let count = FieldTokenizer::new(text, &self.options).count_total_fields();
            self.expected_fields = Some(count);
        }
        Ok(())
    }

    pub(crate) fn exhaust(&mut self) {
        self.state = ReaderState::Exhausted;
    }

    fn inspect(&mut self, text: &str, line_number: usize) {
        let raw = RawRecord::new(text, line_number, &self.options);
        let mut tokenizer = raw.fields();
        let mut count = 0;
        let mut unterminated = None;
        while tokenizer.next_span().is_some() {
            if unterminated.is_none() && tokenizer.has_unterminated_quote() {
                unterminated = Some(count);
            }
            count += 1;
        }

        let expected = *self.expected_fields.get_or_insert(count);
        let mut errors = Vec::new();
        if count != expected {
            errors.push(ValidationError::field_count(expected, count, line_number));
        }
        if let Some(index) = unterminated {
            errors.push(ValidationError::unterminated_quote(index, line_number));
        }

        for err in &errors {
            warn!(line = err.line_number, "{}", err.message);
            if let Some(callback) = self.on_error.as_mut() {
                callback(err);
            }
        }
        self.validation.record(&errors);
    }

    pub(crate) fn column_indices(&self, names: &[&str]) -> CsvResult<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.headers
                    .as_ref()
                    .and_then(|h| h.iter().position(|col| col == *name))
                    .ok_or_else(|| CsvError::MissingHeader(name.to_string()))
            })
            .collect()
    }

    pub(crate) fn reset(&mut self) {
        self.state = ReaderState::NotStarted;
        self.line_number = 0;
        self.record_count = 0;
        self.headers = None;
        self.header_pending = self.options.has_header();
        self.expected_fields = self.options.expected_field_count();
        self.validation.clear();
        debug!("reader reset");
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    pub(crate) fn record_count(&self) -> u64 {
        self.record_count
    }

    pub(crate) fn headers(&self) -> Option<&Record> {
        self.headers.as_ref()
    }

    pub(crate) fn validation(&self) -> &ValidationResult {
        &self.validation
    }
}

pub(crate) fn decode(bytes: &[u8], line: usize) -> CsvResult<&str> {
    std::str::from_utf8(bytes).map_err(|_| CsvError::InvalidUtf8 { line })
}

/// Sequential cursor over the records of a [`RecordSource`].
///
/// Malformed data never stops the reader: field-count mismatches and
/// unterminated quotes are collected in [`validation`](Self::validation) and
/// handed to the [`on_error`](Self::on_error) callback.
///
/// ```
/// use csv_ingest::{CsvReader, Options};
///
/// let mut reader = CsvReader::from_text("Name,Age\r\nJohn,25\r\nJane,30", Options::default());
/// let records = reader.read_all().unwrap();
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].to_vec(), vec!["John", "25"]);
/// assert_eq!(reader.headers().unwrap().to_vec(), vec!["Name", "Age"]);
/// ```
pub struct CsvReader<S = MemorySource> {
    source: S,
    core: ReaderCore,
    buf: PooledBuffer,
    lookahead: PooledBuffer,
    peeked: Option<usize>,
}

impl CsvReader<MemorySource> {
    pub fn from_text(text: impl Into<String>, options: Options) -> Self {
        let source = MemorySource::from_text(text, &options);
        Self::new(source, options)
    }

    /// Read the whole file, then parse from memory. The reader can be reset.
    pub fn from_path(path: impl AsRef<Path>, options: Options) -> CsvResult<Self> {
        let source = MemorySource::from_path(path, &options)?;
        Ok(Self::new(source, options))
    }

    /// Detect delimiter and quoting from the start of `text`, then read it.
    pub fn from_text_auto(text: impl Into<String>) -> CsvResult<Self> {
        let text = text.into();
        let options = FormatDetector::default().detect(&text)?;
        Ok(Self::from_text(text, options))
    }
}

impl<R: BufRead> CsvReader<StreamSource<R>> {
    /// Single pass over a buffered reader; [`reset`](Self::reset) is unsupported.
    pub fn from_reader(reader: R, options: Options) -> Self {
        let source = StreamSource::new(reader, &options);
        Self::new(source, options)
    }
}

impl<S: RecordSource> CsvReader<S> {
    pub fn new(source: S, options: Options) -> Self {
        let core = ReaderCore::new(options);
        Self {
            buf: core.buffer(),
            lookahead: core.buffer(),
            source,
            core,
            peeked: None,
        }
    }

    /// Invoke `callback` once per validation error, as it is found.
    pub fn on_error(mut self, callback: impl FnMut(&ValidationError) + Send + 'static) -> Self {
        self.core.set_callback(Box::new(callback));
        self
    }

    pub fn options(&self) -> &Options {
        &self.core.options
    }

    pub fn state(&self) -> ReaderState {
        self.core.state
    }

    /// Line the most recently consumed record started on; 0 before any.
    pub fn line_number(&self) -> usize {
        self.core.line_number()
    }

    /// Data records consumed so far, read or skipped.
    pub fn record_count(&self) -> u64 {
        self.core.record_count()
    }

    /// Header row, once it has been consumed.
    pub fn headers(&self) -> Option<&Record> {
        self.core.headers()
    }

    pub fn validation(&self) -> &ValidationResult {
        self.core.validation()
    }

    /// Next record into `self.buf`, from the lookahead slot or the source.
    fn fetch(&mut self) -> CsvResult<Option<usize>> {
        self.buf.clear();
        if let Some(line) = self.peeked.take() {
            std::mem::swap(&mut self.buf, &mut self.lookahead);
            return Ok(Some(line));
        }
        self.source.next_record(&mut self.buf)
    }

    /// Fetch the next data record, consuming the header first if needed.
    fn fetch_data(&mut self) -> CsvResult<Option<usize>> {
        loop {
            let Some(line) = self.fetch()? else {
                self.core.exhaust();
                return Ok(None);
            };
            if self.core.header_pending() {
                let text = decode(&self.buf, line)?;
                self.core.take_header(text, line);
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn prime_header(&mut self) -> CsvResult<()> {
        if self.core.header_pending() && self.peeked.is_none() {
            if let Some(line) = self.fetch()? {
                let text = decode(&self.buf, line)?;
                self.core.take_header(text, line);
            }
        }
        Ok(())
    }

    /// Whether another data record follows. Reads ahead by one record.
    pub fn has_more(&mut self) -> CsvResult<bool> {
        if self.core.state == ReaderState::Exhausted {
            return Ok(false);
        }
        if self.peeked.is_some() {
            return Ok(true);
        }
        self.prime_header()?;
        self.lookahead.clear();
        self.peeked = self.source.next_record(&mut self.lookahead)?;
        if self.peeked.is_none() {
            self.core.exhaust();
        }
        Ok(self.peeked.is_some())
    }

    /// Next record as a borrowed view; valid until the reader advances.
    pub fn read_raw(&mut self) -> CsvResult<Option<RawRecord<'_>>> {
        let Some(line) = self.fetch_data()? else {
            return Ok(None);
        };
        let text = decode(&self.buf, line)?;
        self.core.admit(text, line);
        Ok(Some(RawRecord::new(text, line, &self.core.options)))
    }

    pub fn read_record(&mut self) -> CsvResult<Option<Record>> {
        Ok(self.read_raw()?.map(|raw| raw.to_record()))
    }

    /// Every remaining record.
    pub fn read_all(&mut self) -> CsvResult<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(record) = self.read_record()? {
            out.push(record);
        }
        Ok(out)
    }

    pub fn records(&mut self) -> Records<'_, S> {
        Records { reader: self }
    }

    /// Advance past one record without splitting it into fields.
    pub fn skip_record(&mut self) -> CsvResult<bool> {
        match self.fetch_data()? {
            Some(line) => {
                self.core.skip(&self.buf, line)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Skip up to `n` records; returns how many were skipped.
    pub fn skip_records(&mut self, n: usize) -> CsvResult<usize> {
        let mut skipped = 0;
        while skipped < n && self.skip_record()? {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Indices of the named header columns.
    pub fn require_columns(&mut self, names: &[&str]) -> CsvResult<Vec<usize>> {
        self.prime_header()?;
        self.core.column_indices(names)
    }

    /// Rewind to the start of input. Fails with [`CsvError::Unsupported`]
    /// when the source cannot rewind.
    pub fn reset(&mut self) -> CsvResult<()> {
        if !self.source.can_reset() {
            return Err(CsvError::Unsupported("reset on a single-pass source"));
        }
        self.source.reset()?;
        self.buf.clear();
        self.lookahead.clear();
        self.peeked = None;
        self.core.reset();
        Ok(())
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S> fmt::Debug for CsvReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvReader")
            .field("state", &self.core.state)
            .field("line_number", &self.core.line_number())
            .field("record_count", &self.core.record_count())
            .finish()
    }
}

/// Iterator returned by [`CsvReader::records`].
pub struct Records<'r, S> {
    reader: &'r mut CsvReader<S>,
}

impl<S: RecordSource> Iterator for Records<'_, S> {
    type Item = CsvResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}
