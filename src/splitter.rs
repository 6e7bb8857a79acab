//! Quote-aware record boundaries.
//!
//! [`RecordScanner`] finds where a logical record ends in a byte buffer; it is
//! shared by the in-memory [`LineSplitter`], the blocking sources and the
//! async codec so all of them agree on boundaries and line numbers.

use memchr::memchr2;

use crate::options::Options;
use crate::tokenizer::Needle;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminator {
    /// `\n`, with one preceding `\r` folded into the terminator.
    Newline,
    Sequence(Vec<u8>),
}

impl Terminator {
    fn parse(s: &str) -> Self {
        match s {
            "\n" | "\r\n" => Terminator::Newline,
            other => Terminator::Sequence(other.as_bytes().to_vec()),
        }
    }

    fn first(&self) -> u8 {
        match self {
            Terminator::Newline => b'\n',
            Terminator::Sequence(seq) => seq[0],
        }
    }

    /// Length of the terminator at `at`, if one starts there.
    fn match_len(&self, data: &[u8], at: usize) -> Option<usize> {
        match self {
            Terminator::Newline => (data.get(at) == Some(&b'\n')).then_some(1),
            Terminator::Sequence(seq) => data[at..].starts_with(seq).then_some(seq.len()),
        }
    }

    /// End of the record content when its terminator starts at `at`.
    fn content_end(&self, data: &[u8], at: usize) -> usize {
        match self {
            Terminator::Newline if at > 0 && data[at - 1] == b'\r' => at - 1,
            _ => at,
        }
    }
}

/// Outcome of [`RecordScanner::cut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cut {
    /// A record of `len` bytes; `consumed` includes its terminator.
    Record {
        len: usize,
        consumed: usize,
        line_breaks: usize,
    },
    /// An empty physical line to drop.
    Blank { consumed: usize, line_breaks: usize },
    /// No complete record yet (or nothing left at end of input).
    Incomplete,
}

/// Progress through a record that is not complete yet.
///
/// Offsets are relative to the start of the record. Reset after every
/// [`Cut::Record`] and [`Cut::Blank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanState {
    pos: usize,
    in_quotes: bool,
    field_start: bool,
    quoted_breaks: usize,
}

impl ScanState {
    pub(crate) fn new() -> Self {
        Self {
            pos: 0,
            in_quotes: false,
            field_start: true,
            quoted_breaks: 0,
        }
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordScanner {
    delimiter: Needle,
    quote: Option<Needle>,
    terminator: Terminator,
}

impl RecordScanner {
    pub(crate) fn new(options: &Options) -> Self {
        Self {
            delimiter: Needle::new(options.delimiter()),
            quote: options.active_quote().map(Needle::new),
            terminator: Terminator::parse(options.line_terminator()),
        }
    }

    /// True when the bytes at `at` could still turn into a quote, doubled
    /// quote, delimiter or terminator once more input arrives.
    fn undecided(&self, data: &[u8], at: usize, in_quotes: bool) -> bool {
        let rest = &data[at..];
        let cut_short = |pattern: &[u8], repeat: usize| {
            rest.len() < pattern.len() * repeat
                && rest
                    .iter()
                    .enumerate()
                    .all(|(k, b)| *b == pattern[k % pattern.len()])
        };
        let quote = self
            .quote
            .is_some_and(|q| cut_short(q.as_bytes(), if in_quotes { 2 } else { 1 }));
        let terminator = match &self.terminator {
            Terminator::Newline => false,
            Terminator::Sequence(seq) => cut_short(seq.as_slice(), 1),
        };
        quote || terminator || (!in_quotes && cut_short(self.delimiter.as_bytes(), 1))
    }

    /// Advance `state` through `data` and return `(content_end, next_start)`
    /// of the first record boundary outside quotes.
    ///
    /// Without `eof`, scanning stops before any position whose meaning depends
    /// on bytes not yet seen, so a later call with more data picks up there.
    fn scan(&self, data: &[u8], state: &mut ScanState, eof: bool) -> Option<(usize, usize)> {
        let term = self.terminator.first();
        let mut i = state.pos;

        let boundary = loop {
            if i >= data.len() {
                break None;
            }
            if state.in_quotes {
                let Some(q) = self.quote else { break None };
                let Some(off) = memchr2(q.first(), term, &data[i..]) else {
                    i = data.len();
                    break None;
                };
                i += off;
                if !eof && self.undecided(data, i, true) {
                    break None;
                }
                if q.is_at(data, i) {
                    if q.is_at(data, i + q.len()) {
                        i += 2 * q.len();
                    } else {
                        state.in_quotes = false;
                        i += q.len();
                    }
                } else if let Some(len) = self.terminator.match_len(data, i) {
                    state.quoted_breaks += 1;
                    i += len;
                } else {
                    i += 1;
                }
                continue;
            }

            if state.field_start {
                if let Some(q) = self.quote {
                    if !eof && self.undecided(data, i, false) {
                        break None;
                    }
                    if q.is_at(data, i) {
                        state.in_quotes = true;
                        state.field_start = false;
                        i += q.len();
                        continue;
                    }
                }
            }
            state.field_start = false;

            let Some(off) = memchr2(self.delimiter.first(), term, &data[i..]) else {
                i = data.len();
                break None;
            };
            i += off;
            if !eof && self.undecided(data, i, false) {
                break None;
            }
            if let Some(len) = self.terminator.match_len(data, i) {
                let end = self.terminator.content_end(data, i);
                break Some((end, i + len));
            }
            if self.delimiter.is_at(data, i) {
                state.field_start = true;
                i += self.delimiter.len();
            } else {
                i += 1;
            }
        };
        state.pos = i;
        boundary
    }

    /// Cut the next record off the front of `data`, scanning from scratch.
    pub(crate) fn cut(&self, data: &[u8], eof: bool) -> Cut {
        self.resume(data, &mut ScanState::new(), eof)
    }

    /// Cut the next record off the front of `data`, continuing from `state`.
    ///
    /// `data` must start where the record started on the previous call and
    /// only have grown since. Without `eof`, a record is only reported once
    /// its terminator has been seen. With `eof`, whatever remains is the final
    /// record, even inside an open quote.
    pub(crate) fn resume(&self, data: &[u8], state: &mut ScanState, eof: bool) -> Cut {
        if data.is_empty() {
            return Cut::Incomplete;
        }
        let (len, consumed) = match self.scan(data, state, eof) {
            Some((end, next)) => {
                state.quoted_breaks += 1;
                (end, next)
            }
            None if !eof => return Cut::Incomplete,
            None => {
                let end = match self.terminator {
                    Terminator::Newline if data.ends_with(b"\r") => data.len() - 1,
                    _ => data.len(),
                };
                (end, data.len())
            }
        };
        let line_breaks = state.quoted_breaks;
        *state = ScanState::new();
        if len == 0 {
            Cut::Blank {
                consumed,
                line_breaks,
            }
        } else {
            Cut::Record {
                len,
                consumed,
                line_breaks,
            }
        }
    }
}

/// One logical record and the 1-based line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub text: &'a str,
    pub number: usize,
}

/// Forward iterator over the records of in-memory text.
///
/// Blank lines are skipped. With a header configured, the first non-blank
/// line is held back once per pass and exposed through
/// [`header`](Self::header).
///
/// ```
/// use csv_ingest::{LineSplitter, Options};
///
/// let opts = Options::default();
/// let lines: Vec<_> = LineSplitter::new("h1,h2\n\"a\nb\",c\n\nd,e", &opts)
///     .map(|l| (l.number, l.text))
///     .collect();
/// assert_eq!(lines, vec![(2, "\"a\nb\",c"), (5, "d,e")]);
/// ```
#[derive(Debug, Clone)]
pub struct LineSplitter<'a> {
    text: &'a str,
    scanner: RecordScanner,
    pos: usize,
    next_line: usize,
    has_header: bool,
    header: Option<Line<'a>>,
    header_taken: bool,
}

impl<'a> LineSplitter<'a> {
    pub fn new(text: &'a str, options: &Options) -> Self {
        Self {
            text,
            scanner: RecordScanner::new(options),
            pos: 0,
            next_line: 1,
            has_header: options.has_header(),
            header: None,
            header_taken: false,
        }
    }

    /// The discarded header line, once iteration has passed it.
    pub fn header(&self) -> Option<Line<'a>> {
        self.header
    }

    /// Rewind to the start; the header is skipped again on the next pass.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.next_line = 1;
        self.header = None;
        self.header_taken = false;
    }

    fn next_physical(&mut self) -> Option<Line<'a>> {
        loop {
            let rest = &self.text.as_bytes()[self.pos..];
            match self.scanner.cut(rest, true) {
                Cut::Incomplete => return None,
                Cut::Blank {
                    consumed,
                    line_breaks,
                } => {
                    self.pos += consumed;
                    self.next_line += line_breaks;
                }
                Cut::Record {
                    len,
                    consumed,
                    line_breaks,
                } => {
                    let line = Line {
                        text: &self.text[self.pos..self.pos + len],
                        number: self.next_line,
                    };
                    self.pos += consumed;
                    self.next_line += line_breaks;
                    return Some(line);
                }
            }
        }
    }
}

impl<'a> Iterator for LineSplitter<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_header && !self.header_taken {
            self.header_taken = true;
            self.header = Some(self.next_physical()?);
        }
        self.next_physical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_header() -> Options {
        Options::builder().has_header(false).build().unwrap()
    }

    fn lines(text: &str, opts: &Options) -> Vec<(usize, String)> {
        LineSplitter::new(text, opts)
            .map(|l| (l.number, l.text.to_string()))
            .collect()
    }

    #[test]
    fn test_crlf_and_header() {
        let got = lines("Name,Age\r\nJohn,25\r\nJane,30", &Options::default());
        assert_eq!(
            got,
            vec![(2, "John,25".to_string()), (3, "Jane,30".to_string())]
        );
    }

    #[test]
    fn test_header_exposed() {
        let opts = Options::default();
        let mut split = LineSplitter::new("\n\nh\nv", &opts);
        assert_eq!(split.next().map(|l| l.text), Some("v"));
        assert_eq!(split.header(), Some(Line { text: "h", number: 3 }));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let got = lines("a\n\n\r\nb\n", &no_header());
        assert_eq!(got, vec![(1, "a".to_string()), (4, "b".to_string())]);
    }

    #[test]
    fn test_quoted_newline_kept() {
        let got = lines("\"x\r\ny\",1\nz,2", &no_header());
        assert_eq!(
            got,
            vec![(1, "\"x\r\ny\",1".to_string()), (3, "z,2".to_string())]
        );
    }

    #[test]
    fn test_custom_terminator() {
        let opts = Options::builder()
            .has_header(false)
            .line_terminator("||")
            .build()
            .unwrap();
        let got = lines("a,b||\"c||d\",e||||f", &opts);
        assert_eq!(
            got,
            vec![
                (1, "a,b".to_string()),
                (2, "\"c||d\",e".to_string()),
                (5, "f".to_string())
            ]
        );
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        let got = lines("a\n\"open\nstill", &no_header());
        assert_eq!(
            got,
            vec![(1, "a".to_string()), (2, "\"open\nstill".to_string())]
        );
    }

    #[test]
    fn test_reset_reapplies_header() {
        let opts = Options::default();
        let mut split = LineSplitter::new("h\n1\n2", &opts);
        assert_eq!(split.by_ref().count(), 2);
        split.reset();
        assert_eq!(split.next().map(|l| l.text), Some("1"));
    }

    #[test]
    fn test_cut_incomplete_until_terminator() {
        let scanner = RecordScanner::new(&no_header());
        assert_eq!(scanner.cut(b"a,b", false), Cut::Incomplete);
        assert_eq!(scanner.cut(b"\"a\nb", false), Cut::Incomplete);
        assert_eq!(
            scanner.cut(b"a,b\r\nc", false),
            Cut::Record {
                len: 3,
                consumed: 5,
                line_breaks: 1
            }
        );
        assert_eq!(
            scanner.cut(b"a,b", true),
            Cut::Record {
                len: 3,
                consumed: 3,
                line_breaks: 0
            }
        );
        assert_eq!(scanner.cut(b"", true), Cut::Incomplete);
    }

    #[test]
    fn test_resume_waits_on_quote_at_chunk_end() {
        let scanner = RecordScanner::new(&no_header());
        let mut state = ScanState::new();
        let full = b"\"a\"\"b\",c\nrest";
        assert_eq!(scanner.resume(&full[..3], &mut state, false), Cut::Incomplete);
        assert_eq!(
            scanner.resume(&full[..9], &mut state, false),
            Cut::Record {
                len: 8,
                consumed: 9,
                line_breaks: 1
            }
        );
        assert_eq!(state, ScanState::new());
    }

    #[test]
    fn test_resume_split_terminator() {
        let opts = Options::builder()
            .has_header(false)
            .line_terminator("||")
            .build()
            .unwrap();
        let scanner = RecordScanner::new(&opts);
        let mut state = ScanState::new();
        assert_eq!(scanner.resume(b"a,b|", &mut state, false), Cut::Incomplete);
        assert_eq!(
            scanner.resume(b"a,b||c", &mut state, false),
            Cut::Record {
                len: 3,
                consumed: 5,
                line_breaks: 1
            }
        );
    }

    #[test]
    fn test_resume_keeps_quoted_line_breaks() {
        let scanner = RecordScanner::new(&no_header());
        let mut state = ScanState::new();
        assert_eq!(scanner.resume(b"\"x\ny", &mut state, false), Cut::Incomplete);
        assert_eq!(
            scanner.resume(b"\"x\ny\nz\",1\n", &mut state, false),
            Cut::Record {
                len: 9,
                consumed: 10,
                line_breaks: 3
            }
        );
    }

    #[test]
    fn test_quoting_disabled_splits_inside_quotes() {
        let opts = Options::builder()
            .has_header(false)
            .quoting(false)
            .build()
            .unwrap();
        assert_eq!(lines("\"a\nb\"", &opts).len(), 2);
    }
}
