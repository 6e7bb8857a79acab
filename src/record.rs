use std::ops::Index;
use std::sync::Arc;

use crate::options::Options;
use crate::tokenizer::{unescape, FieldTokenizer};

/// An owned record: unescaped field values plus the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Arc<str>>,
    line_number: usize,
}

impl Record {
    pub fn new(fields: Vec<Arc<str>>, line_number: usize) -> Self {
        Self {
            fields,
            line_number,
        }
    }

    /// Materialize a raw record line according to `options`.
    ///
    /// Fields are trimmed, then unescaped, then dropped when empty and
    /// `skip_empty_fields` is set. Values go through the string pool when one
    /// is configured.
    pub fn parse(line: &str, line_number: usize, options: &Options) -> Self {
        let quote = options.active_quote();
        let mut fields = Vec::new();
        for raw in FieldTokenizer::new(line, options) {
            let raw = if options.trim_whitespace() {
                raw.trim()
            } else {
                raw
            };
            let value = match quote {
                Some(q) => unescape(raw, q),
                None => raw.into(),
            };
            if options.skip_empty_fields() && value.is_empty() {
                continue;
            }
            fields.push(match options.string_pool() {
                Some(pool) => pool.get_or_add(&value),
                None => Arc::from(value.as_ref()),
            });
        }
        Self::new(fields, line_number)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 1-based line the record starts on.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.as_ref())
    }

    /// The shared values, as handed out by the string pool.
    pub fn fields(&self) -> &[Arc<str>] {
        &self.fields
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

impl Index<usize> for Record {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.fields[index]
    }
}

/// A record borrowed from the reader's buffer.
///
/// Fields are raw (quotes intact); nothing is allocated until
/// [`to_record`](Self::to_record). The borrow ends when the reader advances.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    text: &'a str,
    line_number: usize,
    options: &'a Options,
}

impl<'a> RawRecord<'a> {
    pub fn new(text: &'a str, line_number: usize, options: &'a Options) -> Self {
        Self {
            text,
            line_number,
            options,
        }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn fields(&self) -> FieldTokenizer<'a> {
        FieldTokenizer::new(self.text, self.options)
    }

    /// Raw field at `index`; `""` when out of range.
    pub fn field(&self, index: usize) -> &'a str {
        self.fields().field_by_index(index)
    }

    pub fn field_count(&self) -> usize {
        self.fields().count_total_fields()
    }

    pub fn to_record(&self) -> Record {
        Record::parse(self.text, self.line_number, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::StringPool;

    #[test]
    fn test_parse_unescapes() {
        let rec = Record::parse(r#"a,"b,c","d""e""#, 7, &Options::default());
        assert_eq!(rec.to_vec(), vec!["a", "b,c", "d\"e"]);
        assert_eq!(rec.line_number(), 7);
        assert_eq!(&rec[1], "b,c");
        assert_eq!(rec.get(3), None);
    }

    #[test]
    fn test_trim_and_skip_empty() {
        let opts = Options::builder()
            .trim_whitespace(true)
            .skip_empty_fields(true)
            .build()
            .unwrap();
        let rec = Record::parse(" a , ,\"\", b ", 1, &opts);
        assert_eq!(rec.to_vec(), vec!["a", "b"]);
    }

    #[test]
    fn test_quoting_disabled_keeps_quotes() {
        let opts = Options::builder().quoting(false).build().unwrap();
        let rec = Record::parse("\"x\",y", 1, &opts);
        assert_eq!(rec.to_vec(), vec!["\"x\"", "y"]);
    }

    #[test]
    fn test_string_pool_shares_values() {
        let pool = Arc::new(StringPool::new());
        let opts = Options::builder()
            .string_pool(Some(Arc::clone(&pool)))
            .build()
            .unwrap();
        let a = Record::parse("NYC,1", 1, &opts);
        let b = Record::parse("NYC,2", 2, &opts);
        assert!(Arc::ptr_eq(&a.fields()[0], &b.fields()[0]));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_raw_record() {
        let opts = Options::default();
        let raw = RawRecord::new("\"q\",r,", 3, &opts);
        assert_eq!(raw.field_count(), 2);
        assert_eq!(raw.field(0), "\"q\"");
        assert_eq!(raw.field(5), "");
        assert_eq!(raw.to_record().to_vec(), vec!["q", "r"]);
    }
}
