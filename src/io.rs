use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};

use crate::CsvResult;

/// Boxed byte stream handed to [`AsyncCsvReader`](crate::AsyncCsvReader).
pub type BoxedAsyncRead = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone, Default)]
pub struct CsvMeta {
    /// e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// just the key/filename (used for extension fallback)
    pub name_hint: String,
}

impl CsvMeta {
    pub fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || self.name_hint.ends_with(".gz")
    }

    pub fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type.eq_ignore_ascii_case("application/zstd")
            || self.name_hint.ends_with(".zst")
    }
}

/// Wrap a raw byte stream with decompression chosen from `meta`.
/// Returns the decoded stream plus the meta we used.
pub fn build_csv_reader<R>(raw: R, meta: CsvMeta) -> (BoxedAsyncRead, CsvMeta)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Use a larger buffer for fewer syscalls (1 MiB)
    let buf = BufReader::with_capacity(1 << 20, raw);
    let decompressed: BoxedAsyncRead = if meta.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if meta.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };
    (decompressed, meta)
}

/// Build a reader from a local file path (lightweight meta from extension).
pub async fn reader_from_path(path: &Path) -> CsvResult<(BoxedAsyncRead, CsvMeta)> {
    let file = File::open(path).await?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut meta = CsvMeta {
        name_hint: name,
        ..Default::default()
    };

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match ext {
        "gz" => {
            meta.content_type = "application/gzip".into();
            meta.content_encoding = "gzip".into();
        }
        "zst" => {
            meta.content_type = "application/zstd".into();
            meta.content_encoding = "zstd".into();
        }
        _ => {
            meta.content_type = "text/csv".into();
        }
    }

    Ok(build_csv_reader(file, meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_detection() {
        let gz = CsvMeta {
            content_encoding: "identity, GZIP".into(),
            ..Default::default()
        };
        assert!(gz.is_gzip());
        assert!(!gz.is_zstd());

        let zst = CsvMeta {
            name_hint: "rows.csv.zst".into(),
            ..Default::default()
        };
        assert!(zst.is_zstd());
        assert!(!CsvMeta::default().is_gzip());
    }
}
