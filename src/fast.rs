use crate::options::Options;
use crate::record::Record;
use crate::source::{RecordSource, SliceSource};
use crate::{CsvError, CsvResult, CsvSummary};
use memchr::memchr_iter;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::debug;

/// Zero-copy, resettable source over a memory-mapped file.
pub type MmapSource = SliceSource<Mmap>;

impl MmapSource {
    pub fn open(path: &Path, options: &Options) -> CsvResult<Self> {
        let file = File::open(path)?;
        // SAFETY: the map is read-only; callers must not truncate the file while reading.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(SliceSource::new(mmap, options))
    }
}

impl crate::CsvReader<MmapSource> {
    pub fn open_mmap(path: impl AsRef<Path>, options: Options) -> CsvResult<Self> {
        let source = MmapSource::open(path.as_ref(), &options)?;
        Ok(Self::new(source, options))
    }
}

/// Count records of a local uncompressed UTF-8 file using mmap and parallel chunking.
/// Assumptions: newline terminators, no line breaks inside quoted fields.
pub fn fast_local_count(path: &Path, options: &Options) -> CsvResult<CsvSummary> {
    if !matches!(options.line_terminator(), "\n" | "\r\n") {
        return Err(CsvError::Unsupported(
            "fast path only handles newline terminators",
        ));
    }
    let mut source = MmapSource::open(path, options)?;

    // Header is the first non-blank record; the source already skips blanks.
    let mut headers = Vec::new();
    let mut header_line = None;
    if options.has_header() {
        let mut buf = Vec::new();
        if let Some(line) = source.next_record(&mut buf)? {
            let text = std::str::from_utf8(&buf).map_err(|_| CsvError::InvalidUtf8 { line })?;
            headers = Record::parse(text, line, options).to_vec();
            header_line = Some(line);
        }
    }

    let data = source.bytes();
    let len = data.len();
    let body_start = match header_line {
        Some(line) => memchr_iter(b'\n', data)
            .nth(line - 1)
            .map(|nl| nl + 1)
            .unwrap_or(len),
        None => 0,
    };

    let cores = num_cpus::get().max(1);
    let approx = (len - body_start) / cores;
    let mut starts = Vec::with_capacity(cores + 1);
    starts.push(body_start);
    let mut pos = body_start + approx;
    while starts.len() < cores && approx > 0 {
        if pos >= len {
            break;
        }
        let next = memchr_iter(b'\n', &data[pos..])
            .next()
            .map(|off| pos + off + 1)
            .unwrap_or(len);
        starts.push(next.min(len));
        pos = body_start + starts.len() * approx;
    }
    starts.push(len);
    debug!(chunks = starts.len() - 1, bytes = len - body_start, "fast local count");

    let total = AtomicUsize::new(0);
    thread::scope(|s| {
        let total_ref = &total;
        for w in starts.windows(2) {
            let slice = &data[w[0]..w[1]];
            s.spawn(move || {
                let mut count = 0usize;
                let mut cursor = 0usize;
                for nl in memchr_iter(b'\n', slice) {
                    if !is_blank(&slice[cursor..nl]) {
                        count += 1;
                    }
                    cursor = nl + 1;
                }
                // last line without a trailing newline
                if cursor < slice.len() && !is_blank(&slice[cursor..]) {
                    count += 1;
                }
                total_ref.fetch_add(count, Ordering::Relaxed);
            });
        }
    });

    Ok(CsvSummary {
        row_count: total.load(Ordering::Relaxed),
        headers,
    })
}

fn is_blank(line: &[u8]) -> bool {
    line.is_empty() || line == b"\r"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fast_count_matches_reader() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\nsku,qty").unwrap();
        for i in 0..1_000 {
            writeln!(file, "SKU{i:04},{i}").unwrap();
            if i % 100 == 0 {
                writeln!(file).unwrap();
            }
        }
        write!(file, "LAST,1").unwrap();
        file.flush().unwrap();

        let opts = Options::default();
        let summary = fast_local_count(file.path(), &opts).unwrap();
        assert_eq!(summary.headers, vec!["sku", "qty"]);
        assert_eq!(summary.row_count, 1_001);

        let mut reader = crate::CsvReader::open_mmap(file.path(), opts).unwrap();
        assert_eq!(reader.read_all().unwrap().len(), 1_001);
        reader.reset().unwrap();
        assert_eq!(reader.skip_records(usize::MAX).unwrap(), 1_001);
    }

    #[test]
    fn test_custom_terminator_unsupported() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let opts = Options::builder().line_terminator("||").build().unwrap();
        assert!(matches!(
            fast_local_count(file.path(), &opts),
            Err(CsvError::Unsupported(_))
        ));
    }
}
