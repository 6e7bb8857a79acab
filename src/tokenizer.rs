//! Field tokenizer over a single record.
//!
//! Yields borrowed field ranges; quote markers stay in the raw range and are
//! only removed by [`unescape`].

use std::borrow::Cow;
use std::ops::Range;

use memchr::memchr;

use crate::options::Options;

/// A single `char` in UTF-8 form, matched against byte slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Needle {
    bytes: [u8; 4],
    len: u8,
}

impl Needle {
    pub(crate) fn new(c: char) -> Self {
        let mut bytes = [0u8; 4];
        let len = c.encode_utf8(&mut bytes).len() as u8;
        Self { bytes, len }
    }

    #[inline]
    pub(crate) fn first(&self) -> u8 {
        self.bytes[0]
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    #[inline]
    pub(crate) fn is_at(&self, hay: &[u8], at: usize) -> bool {
        hay.get(at..).is_some_and(|rest| rest.starts_with(self.as_bytes()))
    }

    /// Position of the next full match at or after `from`.
    pub(crate) fn find(&self, hay: &[u8], from: usize) -> Option<usize> {
        let mut i = from;
        while i < hay.len() {
            let j = i + memchr(self.first(), &hay[i..])?;
            if self.is_at(hay, j) {
                return Some(j);
            }
            i = j + 1;
        }
        None
    }
}

/// Splits one record into fields.
///
/// A quote only opens a quoted section at the start of a field. Inside it a
/// doubled quote is a literal; anything after the closing quote belongs to
/// the same field up to the next delimiter. A quoted section that never
/// closes runs to the end of the record and sets
/// [`has_unterminated_quote`](Self::has_unterminated_quote).
///
/// An empty record has one empty field. A trailing delimiter does not expose
/// a trailing empty field: `A,B,` has two fields.
///
/// ```
/// use csv_ingest::{FieldTokenizer, Options};
///
/// let opts = Options::default();
/// let mut tok = FieldTokenizer::new("a,\"b,c\",d", &opts);
/// assert_eq!(tok.next_field(), Some("a"));
/// assert_eq!(tok.next_field(), Some("\"b,c\""));
/// assert_eq!(tok.next_field(), Some("d"));
/// assert_eq!(tok.next_field(), None);
/// ```
#[derive(Debug, Clone)]
pub struct FieldTokenizer<'a> {
    line: &'a str,
    delimiter: Needle,
    quote: Option<Needle>,
    pos: usize,
    started: bool,
    unterminated: bool,
}

impl<'a> FieldTokenizer<'a> {
    pub fn new(line: &'a str, options: &Options) -> Self {
        Self::with_chars(line, options.delimiter(), options.active_quote())
    }

    /// Tokenize with an explicit delimiter; `quote == None` disables quoting.
    pub fn with_chars(line: &'a str, delimiter: char, quote: Option<char>) -> Self {
        Self {
            line,
            delimiter: Needle::new(delimiter),
            quote: quote.map(Needle::new),
            pos: 0,
            started: false,
            unterminated: false,
        }
    }

    /// The record being tokenized.
    pub fn line(&self) -> &'a str {
        self.line
    }

    /// Byte range of the next raw field, or `None` once every field is consumed.
    pub fn next_span(&mut self) -> Option<Range<usize>> {
        let bytes = self.line.as_bytes();
        if self.started && self.pos >= bytes.len() {
            return None;
        }
        self.started = true;
        let start = self.pos;
        let mut i = start;

        if let Some(q) = self.quote.filter(|q| q.is_at(bytes, start)) {
            i += q.len();
            loop {
                match q.find(bytes, i) {
                    None => {
                        self.unterminated = true;
                        self.pos = bytes.len();
                        return Some(start..bytes.len());
                    }
                    Some(j) if q.is_at(bytes, j + q.len()) => i = j + 2 * q.len(),
                    Some(j) => {
                        i = j + q.len();
                        break;
                    }
                }
            }
        }

        match self.delimiter.find(bytes, i) {
            Some(end) => {
                self.pos = end + self.delimiter.len();
                Some(start..end)
            }
            None => {
                self.pos = bytes.len();
                Some(start..bytes.len())
            }
        }
    }

    /// Next raw field. Keeps returning `None` after exhaustion.
    pub fn next_field(&mut self) -> Option<&'a str> {
        let line = self.line;
        self.next_span().map(|span| &line[span])
    }

    /// Raw field at `index`, scanning from the start. Out of range gives `""`.
    pub fn field_by_index(&self, index: usize) -> &'a str {
        self.restarted().nth(index).unwrap_or("")
    }

    /// Number of fields in the record, without materializing any of them.
    pub fn count_total_fields(&self) -> usize {
        let mut tok = self.restarted();
        let mut count = 0;
        while tok.next_span().is_some() {
            count += 1;
        }
        count
    }

    /// True once a quoted field ran to the end of the record without closing.
    pub fn has_unterminated_quote(&self) -> bool {
        self.unterminated
    }

    fn restarted(&self) -> Self {
        Self {
            pos: 0,
            started: false,
            unterminated: false,
            ..self.clone()
        }
    }
}

impl<'a> Iterator for FieldTokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_field()
    }
}

/// Materialize a raw field: drop the enclosing quotes and collapse doubled ones.
///
/// Fields that do not start with `quote` are returned as is. Borrows whenever
/// nothing has to be collapsed.
///
/// ```
/// use csv_ingest::unescape;
///
/// assert_eq!(unescape("\"say \"\"hi\"\"\"", '"'), "say \"hi\"");
/// assert_eq!(unescape("plain", '"'), "plain");
/// ```
pub fn unescape(raw: &str, quote: char) -> Cow<'_, str> {
    let Some(body) = raw.strip_prefix(quote) else {
        return Cow::Borrowed(raw);
    };
    if let Some(inner) = body.strip_suffix(quote) {
        if !inner.contains(quote) {
            return Cow::Borrowed(inner);
        }
    }

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    let mut closed = false;
    while let Some(c) = chars.next() {
        if !closed && c == quote {
            if chars.peek() == Some(&quote) {
                out.push(quote);
                chars.next();
            } else {
                closed = true;
            }
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(line: &str) -> Vec<&str> {
        FieldTokenizer::new(line, &Options::default()).collect()
    }

    #[test]
    fn test_simple() {
        assert_eq!(fields("A,B,C"), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_trailing_delimiter_is_not_a_field() {
        assert_eq!(fields("A,B,"), vec!["A", "B"]);
        let tok = FieldTokenizer::new("A,B,", &Options::default());
        assert_eq!(tok.count_total_fields(), 2);
    }

    #[test]
    fn test_empty_record_has_one_empty_field() {
        assert_eq!(fields(""), vec![""]);
    }

    #[test]
    fn test_inner_empty_fields() {
        assert_eq!(fields("a,,c"), vec!["a", "", "c"]);
        assert_eq!(fields(",b"), vec!["", "b"]);
    }

    #[test]
    fn test_escaped_quotes_stay_raw() {
        let line = "\"field with \"\"escaped\"\" quotes\",normal";
        let got = fields(line);
        assert_eq!(got, vec!["\"field with \"\"escaped\"\" quotes\"", "normal"]);
        assert_eq!(unescape(got[0], '"'), "field with \"escaped\" quotes");
    }

    #[test]
    fn test_unterminated_quote() {
        let mut tok = FieldTokenizer::new("\"unterminated", &Options::default());
        assert_eq!(tok.next_field(), Some("\"unterminated"));
        assert!(tok.has_unterminated_quote());
        assert_eq!(tok.next_field(), None);
        assert_eq!(tok.next_field(), None);
    }

    #[test]
    fn test_quoted_delimiter_and_newline() {
        assert_eq!(fields("\"a,b\",\"x\ny\""), vec!["\"a,b\"", "\"x\ny\""]);
    }

    #[test]
    fn test_quote_mid_field_is_literal() {
        assert_eq!(fields("ab\"c,d"), vec!["ab\"c", "d"]);
    }

    #[test]
    fn test_text_after_closing_quote() {
        assert_eq!(fields("\"ab\"cd,e"), vec!["\"ab\"cd", "e"]);
        assert_eq!(unescape("\"ab\"cd", '"'), "abcd");
    }

    #[test]
    fn test_quoting_disabled() {
        let mut tok = FieldTokenizer::with_chars("\"a,b\"", ',', None);
        assert_eq!(tok.next_field(), Some("\"a"));
        assert_eq!(tok.next_field(), Some("b\""));
        assert!(!tok.has_unterminated_quote());
    }

    #[test]
    fn test_field_by_index() {
        let tok = FieldTokenizer::new("x,y,z", &Options::default());
        assert_eq!(tok.field_by_index(0), "x");
        assert_eq!(tok.field_by_index(2), "z");
        assert_eq!(tok.field_by_index(3), "");
        assert_eq!(tok.field_by_index(usize::MAX), "");
    }

    #[test]
    fn test_count_matches_iteration() {
        let lines = [
            "",
            ",",
            ",,",
            "a",
            "a,",
            "\"a,\",b,",
            "\"open",
            "x,\"y\"\"\",z",
            "1;2;3",
        ];
        for line in lines {
            let tok = FieldTokenizer::new(line, &Options::default());
            let counted = tok.count_total_fields();
            let mut iter = tok.clone();
            let mut seen = 0;
            while iter.next_field().is_some() {
                seen += 1;
            }
            assert_eq!(counted, seen, "line {line:?}");
        }
    }

    #[test]
    fn test_multibyte_delimiter() {
        let mut tok = FieldTokenizer::with_chars("α§β§γ", '§', Some('"'));
        assert_eq!(tok.next_field(), Some("α"));
        assert_eq!(tok.next_field(), Some("β"));
        assert_eq!(tok.next_field(), Some("γ"));
        assert_eq!(tok.next_field(), None);
    }

    #[test]
    fn test_spans_cover_raw_text() {
        let mut tok = FieldTokenizer::new("ab,cd", &Options::default());
        assert_eq!(tok.next_span(), Some(0..2));
        assert_eq!(tok.next_span(), Some(3..5));
        assert_eq!(tok.next_span(), None);
    }

    #[test]
    fn test_unescape_variants() {
        assert_eq!(unescape("\"\"", '"'), "");
        assert!(matches!(unescape("\"abc\"", '"'), Cow::Borrowed("abc")));
        assert_eq!(unescape("\"a\"\"", '"'), "a\"");
        assert_eq!(unescape("\"unterminated", '"'), "unterminated");
        assert_eq!(unescape("'it''s'", '\''), "it's");
    }
}
