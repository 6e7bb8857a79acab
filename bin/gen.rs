use clap::{Arg, Command};
use csv_ingest::{CsvWriter, Options};
use std::io;

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quoted")
                .long("quoted")
                .help("Every tenth row carries delimiters, quotes and line breaks inside fields")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(Arg::new("cols").long("cols").default_value("3"))
        .arg(Arg::new("delim").long("delim").default_value(","))
        .get_matches();

    let rows: u64 = *matches.get_one("rows").unwrap();
    let with_header = matches.get_flag("with_header");
    let quoted = matches.get_flag("quoted");
    let cols: usize = matches.get_one::<String>("cols").unwrap().parse()?;
    let delim = matches
        .get_one::<String>("delim")
        .unwrap()
        .chars()
        .next()
        .ok_or_else(|| anyhow::anyhow!("--delim must not be empty"))?;

    let options = Options::builder().delimiter(delim).build()?;
    let out = io::BufWriter::new(io::stdout().lock());
    let mut writer = CsvWriter::new(out, options);

    if with_header {
        let mut header = vec!["sku".to_string()];
        header.extend((1..cols).map(|i| format!("col{i}")));
        writer.write_record(&header)?;
    }

    // Very simple deterministic data: sku, col1, col2, ...
    let mut row = Vec::with_capacity(cols);
    for i in 0..rows {
        row.clear();
        row.push(format!("SKU{:010}", i));
        for c in 1..cols {
            if quoted && i % 10 == 0 {
                row.push(format!("v{c}{delim} \"{i}\"\nnext"));
            } else {
                row.push(format!("v{c}_{i}"));
            }
        }
        writer.write_record(&row)?;
        if i % 10_000 == 0 {
            writer.flush()?;
        } // keep buffers moving on huge runs
    }

    writer.flush()?;
    Ok(())
}
