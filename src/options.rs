use std::sync::Arc;

use crate::pool::{BufferPool, StringPool};
use crate::{CsvError, CsvResult};

/// Immutable parser configuration shared by the tokenizer, splitter and readers.
///
/// Built through [`OptionsBuilder`]; a changed copy is produced with
/// [`Options::to_builder`].
#[derive(Debug, Clone)]
pub struct Options {
    delimiter: char,
    quote: char,
    quoting: bool,
    has_header: bool,
    trim_whitespace: bool,
    skip_empty_fields: bool,
    line_terminator: String,
    validate: bool,
    expected_field_count: Option<usize>,
    string_pool: Option<Arc<StringPool>>,
    buffer_pool: Option<BufferPool>,
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Start a builder seeded with these values.
    pub fn to_builder(&self) -> OptionsBuilder {
        OptionsBuilder {
            inner: self.clone(),
        }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn quote(&self) -> char {
        self.quote
    }

    /// Whether quote characters at the start of a field open a quoted section.
    pub fn quoting(&self) -> bool {
        self.quoting
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    pub fn trim_whitespace(&self) -> bool {
        self.trim_whitespace
    }

    pub fn skip_empty_fields(&self) -> bool {
        self.skip_empty_fields
    }

    pub fn line_terminator(&self) -> &str {
        &self.line_terminator
    }

    pub fn validate(&self) -> bool {
        self.validate
    }

    pub fn expected_field_count(&self) -> Option<usize> {
        self.expected_field_count
    }

    pub fn string_pool(&self) -> Option<&Arc<StringPool>> {
        self.string_pool.as_ref()
    }

    pub fn buffer_pool(&self) -> Option<&BufferPool> {
        self.buffer_pool.as_ref()
    }

    /// The quote character when quoting is enabled.
    pub(crate) fn active_quote(&self) -> Option<char> {
        self.quoting.then_some(self.quote)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            quoting: true,
            has_header: true,
            trim_whitespace: false,
            skip_empty_fields: false,
            line_terminator: "\n".to_string(),
            validate: true,
            expected_field_count: None,
            string_pool: None,
            buffer_pool: None,
        }
    }
}

/// Mutable accumulator for [`Options`].
///
/// Nothing is checked until [`OptionsBuilder::build`], so intermediate states
/// never reach a tokenizer.
///
/// ```
/// use csv_ingest::Options;
///
/// let opts = Options::builder()
///     .delimiter(';')
///     .has_header(false)
///     .build()
///     .unwrap();
/// assert_eq!(opts.delimiter(), ';');
/// ```
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    inner: Options,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.inner.delimiter = delimiter;
        self
    }

    pub fn quote(mut self, quote: char) -> Self {
        self.inner.quote = quote;
        self
    }

    pub fn quoting(mut self, enabled: bool) -> Self {
        self.inner.quoting = enabled;
        self
    }

    pub fn has_header(mut self, has: bool) -> Self {
        self.inner.has_header = has;
        self
    }

    pub fn trim_whitespace(mut self, trim: bool) -> Self {
        self.inner.trim_whitespace = trim;
        self
    }

    pub fn skip_empty_fields(mut self, skip: bool) -> Self {
        self.inner.skip_empty_fields = skip;
        self
    }

    /// `"\n"` and `"\r\n"` both accept either convention; anything else is
    /// matched literally.
    pub fn line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.inner.line_terminator = terminator.into();
        self
    }

    pub fn validate(mut self, enabled: bool) -> Self {
        self.inner.validate = enabled;
        self
    }

    pub fn expected_field_count(mut self, count: Option<usize>) -> Self {
        self.inner.expected_field_count = count;
        self
    }

    pub fn string_pool(mut self, pool: Option<Arc<StringPool>>) -> Self {
        self.inner.string_pool = pool;
        self
    }

    pub fn buffer_pool(mut self, pool: Option<BufferPool>) -> Self {
        self.inner.buffer_pool = pool;
        self
    }

    pub fn build(self) -> CsvResult<Options> {
        let opts = self.inner;
        if opts.delimiter == opts.quote {
            return Err(CsvError::InvalidOptions(format!(
                "delimiter and quote must differ (both {:?})",
                opts.delimiter
            )));
        }
        if opts.line_terminator.is_empty() {
            return Err(CsvError::InvalidOptions(
                "line terminator must not be empty".to_string(),
            ));
        }
        if opts.line_terminator.contains(opts.delimiter) || opts.line_terminator.contains(opts.quote)
        {
            return Err(CsvError::InvalidOptions(format!(
                "line terminator {:?} overlaps the delimiter or quote",
                opts.line_terminator
            )));
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.delimiter(), ',');
        assert_eq!(opts.quote(), '"');
        assert!(opts.quoting());
        assert!(opts.has_header());
        assert!(opts.validate());
        assert_eq!(opts.line_terminator(), "\n");
        assert!(opts.string_pool().is_none());
    }

    #[test]
    fn test_delimiter_equal_to_quote_rejected() {
        let err = Options::builder().delimiter('"').build().unwrap_err();
        assert!(matches!(err, CsvError::InvalidOptions(_)));
    }

    #[test]
    fn test_terminator_checks() {
        assert!(Options::builder().line_terminator("").build().is_err());
        assert!(Options::builder().line_terminator(",\n").build().is_err());
        assert!(Options::builder().line_terminator("\r\n").build().is_ok());
    }

    #[test]
    fn test_to_builder_leaves_original_untouched() {
        let base = Options::default();
        let changed = base.to_builder().delimiter('\t').build().unwrap();
        assert_eq!(base.delimiter(), ',');
        assert_eq!(changed.delimiter(), '\t');
        assert_eq!(changed.quote(), base.quote());
    }

    #[test]
    fn test_active_quote_follows_quoting() {
        let opts = Options::builder().quoting(false).build().unwrap();
        assert_eq!(opts.active_quote(), None);
        assert_eq!(Options::default().active_quote(), Some('"'));
    }
}
