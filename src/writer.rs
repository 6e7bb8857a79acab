//! CSV output with the same quoting rules the tokenizer reads back.

use std::io::Write;

use crate::options::Options;
use crate::CsvResult;

/// Append one encoded record (without terminator) to `out`.
///
/// A field is quoted when it contains the delimiter, the quote, a line break
/// or the terminator. An empty last field is written as `""` so that neither
/// the trailing-delimiter rule nor blank-line skipping drops it.
pub fn encode_record<I, T>(fields: I, options: &Options, out: &mut String)
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut fields = fields.into_iter().peekable();
    let mut first = true;
    while let Some(field) = fields.next() {
        let field = field.as_ref();
        if !first {
            out.push(options.delimiter());
        }
        first = false;
        let last = fields.peek().is_none();
        if needs_quoting(field, options) || (last && field.is_empty()) {
            let quote = options.quote();
            out.push(quote);
            for c in field.chars() {
                if c == quote {
                    out.push(quote);
                }
                out.push(c);
            }
            out.push(quote);
        } else {
            out.push_str(field);
        }
    }
}

fn needs_quoting(field: &str, options: &Options) -> bool {
    field
        .chars()
        .any(|c| c == options.delimiter() || c == options.quote() || c == '\n' || c == '\r')
        || field.contains(options.line_terminator())
}

/// Writes records to any `io::Write`, one terminator after each.
#[derive(Debug)]
pub struct CsvWriter<W: Write> {
    inner: W,
    options: Options,
    line: String,
    records_written: u64,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W, options: Options) -> Self {
        Self {
            inner,
            options,
            line: String::with_capacity(1024),
            records_written: 0,
        }
    }

    pub fn write_record<I, T>(&mut self, fields: I) -> CsvResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.line.clear();
        encode_record(fields, &self.options, &mut self.line);
        self.line.push_str(self.options.line_terminator());
        self.inner.write_all(self.line.as_bytes())?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn flush(&mut self) -> CsvResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
