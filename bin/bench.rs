use clap::{Arg, ArgAction, Command};
use crc32fast::Hasher as Crc32;
use csv_ingest::{
    process_csv_stream, reader_from_path, CsvReader, CsvSummary, FormatDetector, Options,
};
use std::path::PathBuf;
use std::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("bench")
        .arg(Arg::new("path").long("path").value_parser(clap::value_parser!(PathBuf)).required(true))
        .arg(Arg::new("required").long("required").action(clap::ArgAction::Append))
        .arg(Arg::new("verify").long("verify").help("Enable strict verification: field-count validation and CRC32 over fields").action(ArgAction::SetTrue))
        .arg(Arg::new("limit").long("limit").help("Stop after N rows (for faster verify)").value_parser(clap::value_parser!(u64)))
        .arg(Arg::new("detect").long("detect").help("Detect delimiter and quoting from the first 4 KiB").action(ArgAction::SetTrue))
        .arg(Arg::new("async").long("async").help("Use the async streaming reader (gzip/zstd by extension)").action(ArgAction::SetTrue))
        .arg(Arg::new("fast-local").long("fast-local").help("Use mmap+parallel fast path for local uncompressed UTF-8 files (feature: fast_local)").action(ArgAction::SetTrue))
        .get_matches();

    let path = matches.get_one::<PathBuf>("path").unwrap();
    let required: Vec<String> = matches
        .get_many::<String>("required")
        .map(|vals| vals.map(|s| s.to_string()).collect())
        .unwrap_or_default();
    let required_refs: Vec<&str> = required.iter().map(|s| s.as_str()).collect();

    let options = if matches.get_flag("detect") {
        FormatDetector::default().detect_path(path)?
    } else {
        Options::default()
    };

    let start = Instant::now();

    #[cfg(feature = "fast_local")]
    if matches.get_flag("fast-local") && path.extension().and_then(|s| s.to_str()) == Some("csv")
    {
        let res = csv_ingest::fast_local_count(path, &options)?;
        report(path, &res, start.elapsed().as_secs_f64());
        return Ok(());
    }

    let summary = if matches.get_flag("async") {
        let (reader, _meta) = reader_from_path(path).await?;
        process_csv_stream(reader, options, &required_refs).await?
    } else {
        let validate = matches.get_flag("verify");
        let options = options.to_builder().validate(validate).build()?;
        let (summary, crc, invalid) = verify_and_count(
            CsvReader::from_path(path, options)?,
            &required_refs,
            matches.get_one::<u64>("limit").copied(),
            validate,
        )?;
        if validate {
            println!("crc=0x{crc:08x} invalid_records={invalid}");
        }
        summary
    };

    report(path, &summary, start.elapsed().as_secs_f64());
    Ok(())
}

fn report(path: &std::path::Path, summary: &CsvSummary, elapsed: f64) {
    let rps = (summary.row_count as f64) / elapsed;
    println!(
        "source={} rows={} headers={:?}\nelapsed={:.1}s rows/sec={:.0}",
        path.display(),
        summary.row_count,
        summary.headers,
        elapsed,
        rps
    );
}

fn verify_and_count(
    mut rdr: CsvReader,
    required_headers: &[&str],
    limit: Option<u64>,
    verify: bool,
) -> anyhow::Result<(CsvSummary, u32, u64)> {
    let required_indices = rdr.require_columns(required_headers)?;

    let mut row_count: u64 = 0;
    let mut crc = Crc32::new();
    while let Some(raw) = rdr.read_raw()? {
        row_count += 1;
        for (i, &idx) in required_indices.iter().enumerate() {
            if idx >= raw.field_count() {
                return Err(anyhow::anyhow!(
                    "Row {} missing required field '{}'",
                    raw.line_number(),
                    required_headers[i]
                ));
            }
        }
        if verify {
            // accumulate CRC32 over all fields separated by '\x1f' (unit separator)
            for (fi, field) in raw.fields().enumerate() {
                if fi > 0 {
                    crc.update(&[0x1f]);
                }
                crc.update(field.as_bytes());
            }
        }
        if let Some(lim) = limit {
            if row_count >= lim {
                break;
            }
        }
    }

    let headers = rdr.headers().map(|h| h.to_vec()).unwrap_or_default();
    let invalid = rdr.validation().invalid_records();
    Ok((
        CsvSummary {
            row_count: row_count as usize,
            headers,
        },
        crc.finalize(),
        invalid,
    ))
}
