use csv_ingest::{reader_from_path, AsyncCsvReader, Options};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = Path::new("./data/sample.csv.gz");
    let (reader, meta) = reader_from_path(path).await?;

    let mut rdr = AsyncCsvReader::new(reader, Options::default())
        .on_error(|err| eprintln!("skipping check: {err}"));
    let idxs = rdr.require_columns(&["sku"]).await?;

    let mut skus = 0usize;
    while let Some(record) = rdr.next_record().await? {
        if record.get(idxs[0]).is_some_and(|sku| !sku.is_empty()) {
            skus += 1;
        }
    }

    println!(
        "{} ({}): {} records, {} with sku, {} invalid",
        path.display(),
        meta.content_type,
        rdr.record_count(),
        skus,
        rdr.validation().invalid_records()
    );
    Ok(())
}
