//! CSV tokenizing and reading with minimal copying.
//!
//! - Tokenizer: borrowed field ranges per record, quotes kept until unescaped.
//! - Splitter: quote-aware record boundaries, blank lines skipped, header once.
//! - Pools: shared buffer and string pools to cut allocation volume.
//! - Readers: blocking [`CsvReader`] over any [`RecordSource`], and
//!   [`AsyncCsvReader`] over tokio streams (gzip/zstd by extension).
//! - Fast local path: feature `fast_local`, mmap + parallel record counting.
//!
//! Data shape:
//! - [`Record`]: owned, unescaped fields plus the line the record starts on
//! - [`RawRecord`]: the same record borrowed from the reader's buffer
//! - [`ValidationResult`]: field-count and quoting problems, never fatal
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod async_reader;
mod codec;
mod detect;
#[cfg(feature = "fast_local")]
mod fast;
mod io;
mod options;
mod pool;
mod reader;
mod record;
mod source;
mod splitter;
mod tokenizer;
mod validation;
mod writer;

pub use crate::async_reader::AsyncCsvReader;
pub use crate::codec::{RecordCodec, RecordFrame};
pub use crate::detect::{FormatDetector, DEFAULT_SAMPLE_SIZE};
#[cfg(feature = "fast_local")]
pub use crate::fast::{fast_local_count, MmapSource};
pub use crate::io::{build_csv_reader, reader_from_path, BoxedAsyncRead, CsvMeta};
pub use crate::options::{Options, OptionsBuilder};
pub use crate::pool::{BufferPool, PooledBuffer, StringPool};
pub use crate::reader::{CsvReader, ReaderState, Records};
pub use crate::record::{RawRecord, Record};
pub use crate::source::{MemorySource, RecordSource, SliceSource, StreamSource};
pub use crate::splitter::{Line, LineSplitter};
pub use crate::tokenizer::{unescape, FieldTokenizer};
pub use crate::validation::{ValidationError, ValidationErrorKind, ValidationResult};
pub use crate::writer::{encode_record, CsvWriter};

use thiserror::Error;
use tokio::io::AsyncRead;

/// Result summary (keep it simple/minimal)
#[derive(Debug)]
pub struct CsvSummary {
    pub row_count: usize,
    pub headers: Vec<String>,
}

/// Error type returned by this crate when not using `anyhow`.
///
/// Bad data is not an error here; it ends up in [`ValidationResult`].
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Missing required header: {0}")]
    MissingHeader(String),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("Buffer was not rented from this pool")]
    ForeignBuffer,
    #[error("Invalid UTF-8 in record starting at line {line}")]
    InvalidUtf8 { line: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CsvResult<T> = std::result::Result<T, CsvError>;

/// Streaming parse with required header validation.
///
/// Counts data records and checks every required column exists in the header
/// and in each record.
pub async fn process_csv_stream<R>(
    reader: R,
    options: Options,
    required_headers: &[&str],
) -> CsvResult<CsvSummary>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut rdr = AsyncCsvReader::new(reader, options);
    let required_indices = rdr.require_columns(required_headers).await?;

    let mut row_count = 0usize;
    while let Some(record) = rdr.next_record().await? {
        row_count += 1;

        for (i, &idx) in required_indices.iter().enumerate() {
            if record.get(idx).is_none() {
                return Err(CsvError::MissingHeader(
                    required_headers[i].to_string(),
                ));
            }
        }
    }

    Ok(CsvSummary {
        row_count,
        headers: rdr.headers().map(Record::to_vec).unwrap_or_default(),
    })
}
