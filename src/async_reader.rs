//! Async reader over a tokio byte stream.
//!
//! Suspension only happens while waiting for more bytes; once a record is in
//! the read buffer it is cut, tokenized and validated without yielding.

use std::fmt;
use std::path::Path;

use futures::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{RecordCodec, RecordFrame};
use crate::io::{reader_from_path, BoxedAsyncRead};
use crate::options::Options;
use crate::reader::{decode, ReaderCore, ReaderState};
use crate::record::Record;
use crate::validation::{ValidationError, ValidationResult};
use crate::{CsvError, CsvResult};

const READ_CAPACITY: usize = 64 * 1024;

/// Async counterpart of [`CsvReader`](crate::CsvReader) for single-pass streams.
///
/// ```no_run
/// # async fn run() -> csv_ingest::CsvResult<()> {
/// use csv_ingest::{AsyncCsvReader, Options};
///
/// let mut reader = AsyncCsvReader::from_path("data.csv.gz", Options::default()).await?;
/// while let Some(record) = reader.next_record().await? {
///     println!("{:?}", record.get(0));
/// }
/// # Ok(())
/// # }
/// ```
pub struct AsyncCsvReader<R> {
    frames: FramedRead<R, RecordCodec>,
    core: ReaderCore,
    peeked: Option<RecordFrame>,
}

impl AsyncCsvReader<BoxedAsyncRead> {
    /// Open a local file; `.gz` and `.zst` are decompressed on the fly.
    pub async fn from_path(path: impl AsRef<Path>, options: Options) -> CsvResult<Self> {
        let (reader, meta) = reader_from_path(path.as_ref()).await?;
        debug!(content_type = %meta.content_type, "opened async csv source");
        Ok(Self::new(reader, options))
    }
}

impl<R: AsyncRead + Unpin> AsyncCsvReader<R> {
    pub fn new(reader: R, options: Options) -> Self {
        let codec = RecordCodec::new(&options);
        Self {
            frames: FramedRead::with_capacity(reader, codec, READ_CAPACITY),
            core: ReaderCore::new(options),
            peeked: None,
        }
    }

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

    pub fn line_number(&self) -> usize {
        self.core.line_number()
    }

    pub fn record_count(&self) -> u64 {
        self.core.record_count()
    }

    pub fn headers(&self) -> Option<&Record> {
        self.core.headers()
    }

    pub fn validation(&self) -> &ValidationResult {
        self.core.validation()
    }

    async fn next_frame(&mut self) -> CsvResult<Option<RecordFrame>> {
        if let Some(frame) = self.peeked.take() {
            return Ok(Some(frame));
        }
        loop {
            let Some(frame) = self.frames.next().await.transpose()? else {
                self.core.exhaust();
                return Ok(None);
            };
            if self.core.header_pending() {
                let text = decode(&frame.bytes, frame.line_number)?;
                self.core.take_header(text, frame.line_number);
                continue;
            }
            return Ok(Some(frame));
        }
    }

    pub async fn has_more(&mut self) -> CsvResult<bool> {
        if self.peeked.is_none() && self.core.state != ReaderState::Exhausted {
            self.peeked = self.next_frame().await?;
        }
        Ok(self.peeked.is_some())
    }

    pub async fn next_record(&mut self) -> CsvResult<Option<Record>> {
        let Some(frame) = self.next_frame().await? else {
            return Ok(None);
        };
        let text = decode(&frame.bytes, frame.line_number)?;
        self.core.admit(text, frame.line_number);
        Ok(Some(Record::parse(text, frame.line_number, &self.core.options)))
    }

    pub async fn read_all(&mut self) -> CsvResult<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(record) = self.next_record().await? {
            out.push(record);
        }
        Ok(out)
    }

    /// Like [`read_all`](Self::read_all), but stops between records once
    /// `token` is cancelled and returns what was read so far.
    pub async fn read_all_cancellable(
        &mut self,
        token: &CancellationToken,
    ) -> CsvResult<Vec<Record>> {
        let mut out = Vec::new();
        while !token.is_cancelled() {
            match self.next_record().await? {
                Some(record) => out.push(record),
                None => break,
            }
        }
        if token.is_cancelled() {
            debug!(records = out.len(), "read cancelled");
        }
        Ok(out)
    }

    pub async fn skip_records(&mut self, n: usize) -> CsvResult<usize> {
        let mut skipped = 0;
        while skipped < n {
            let Some(frame) = self.next_frame().await? else {
                break;
            };
            self.core.skip(&frame.bytes, frame.line_number)?;
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Reads the header if it has not been seen yet, then resolves `names`.
    pub async fn require_columns(&mut self, names: &[&str]) -> CsvResult<Vec<usize>> {
        if self.core.header_pending() {
            self.has_more().await?;
        }
        self.core.column_indices(names)
    }

    /// Streams cannot rewind.
    pub fn reset(&mut self) -> CsvResult<()> {
        Err(CsvError::Unsupported("reset on an async stream"))
    }

    pub fn into_stream(self) -> impl Stream<Item = CsvResult<Record>> {
        futures::stream::unfold(self, |mut reader| async move {
            match reader.next_record().await {
                Ok(Some(record)) => Some((Ok(record), reader)),
                Ok(None) => None,
                Err(e) => Some((Err(e), reader)),
            }
        })
    }
}

impl<R> fmt::Debug for AsyncCsvReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCsvReader")
            .field("state", &self.core.state)
            .field("line_number", &self.core.line_number())
            .field("record_count", &self.core.record_count())
            .finish()
    }
}
