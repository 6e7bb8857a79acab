//! Delimiter and quoting detection from a data sample.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::options::Options;
use crate::CsvResult;

pub const DEFAULT_SAMPLE_SIZE: usize = 4096;

/// Checked in this order; a later candidate wins a tie.
const CANDIDATES: [char; 4] = [',', ';', '\t', '|'];

/// Picks the most frequent candidate delimiter in a sample prefix.
///
/// The count is a plain character count; quoting is not taken into account.
/// Quoting is switched on when the sample contains the quote character.
/// Everything else is copied from the base options.
///
/// ```
/// use csv_ingest::FormatDetector;
///
/// let opts = FormatDetector::default().detect("a;b;c\n1;2,5;3\n").unwrap();
/// assert_eq!(opts.delimiter(), ';');
/// assert!(!opts.quoting());
/// ```
#[derive(Debug, Clone)]
pub struct FormatDetector {
    base: Options,
    sample_size: usize,
}

impl FormatDetector {
    pub fn new(base: Options) -> Self {
        Self {
            base,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    /// Number of characters inspected.
    pub fn sample_size(mut self, chars: usize) -> Self {
        self.sample_size = chars;
        self
    }

    /// Candidates that equal the quote or occur in the line terminator are
    /// never chosen; the result always passes [`OptionsBuilder::build`].
    ///
    /// [`OptionsBuilder::build`]: crate::OptionsBuilder::build
    pub fn detect(&self, sample: &str) -> CsvResult<Options> {
        let quote = self.base.quote();
        let usable = |d: char| d != quote && !self.base.line_terminator().contains(d);

        let mut counts = [0usize; CANDIDATES.len()];
        let mut saw_quote = false;
        for c in sample.chars().take(self.sample_size) {
            if c == quote {
                saw_quote = true;
            } else if let Some(slot) = CANDIDATES.iter().position(|&d| d == c && usable(d)) {
                counts[slot] += 1;
            }
        }

        let mut picked = None;
        let mut best = 0;
        for (&candidate, &count) in CANDIDATES.iter().zip(&counts) {
            if count > 0 && count >= best {
                best = count;
                picked = Some(candidate);
            }
        }
        let delimiter = picked.unwrap_or(if usable(CANDIDATES[0]) {
            CANDIDATES[0]
        } else {
            self.base.delimiter()
        });
        debug!(?delimiter, occurrences = best, quoting = saw_quote, "format detected");

        self.base
            .to_builder()
            .delimiter(delimiter)
            .quoting(saw_quote)
            .build()
    }

    /// Detect from the first bytes of a file.
    pub fn detect_path(&self, path: impl AsRef<Path>) -> CsvResult<Options> {
        // up to four bytes per character
        let limit = (self.sample_size as u64).saturating_mul(4);
        let mut bytes = Vec::new();
        File::open(path)?.take(limit).read_to_end(&mut bytes)?;
        let sample = match std::str::from_utf8(&bytes) {
            Ok(s) => s,
            // the cut may split a character
            Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        };
        self.detect(sample)
    }
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_semicolons_win() {
        let opts = FormatDetector::default().detect("a;b;c\n1,5;2;3\n").unwrap();
        assert_eq!(opts.delimiter(), ';');
    }

    #[test]
    fn test_tie_goes_to_later_candidate() {
        assert_eq!(FormatDetector::default().detect("a,b;c").unwrap().delimiter(), ';');
        assert_eq!(FormatDetector::default().detect("a\tb|c").unwrap().delimiter(), '|');
    }

    #[test]
    fn test_no_candidates_keeps_comma() {
        assert_eq!(FormatDetector::default().detect("abc").unwrap().delimiter(), ',');
    }

    #[test]
    fn test_quote_presence_toggles_quoting() {
        let detector = FormatDetector::default();
        assert!(detector.detect("\"a\",b").unwrap().quoting());
        assert!(!detector.detect("a,b").unwrap().quoting());
        assert_eq!(detector.detect("\"a\",b").unwrap().quote(), '"');
    }

    #[test]
    fn test_sample_is_bounded() {
        let sample = format!("{}{}", ",".repeat(3), "|".repeat(10));
        let opts = FormatDetector::default().sample_size(5).detect(&sample).unwrap();
        assert_eq!(opts.delimiter(), ',');
    }

    #[test]
    fn test_base_options_carried_over() {
        let base = Options::builder().has_header(false).build().unwrap();
        let opts = FormatDetector::new(base).detect("1\t2\t3").unwrap();
        assert_eq!(opts.delimiter(), '\t');
        assert!(!opts.has_header());
    }

    #[test]
    fn test_terminator_characters_never_chosen() {
        let base = Options::builder().line_terminator("\t\t").build().unwrap();
        let opts = FormatDetector::new(base)
            .detect("a\tb\tc\t\t1\t2\t3")
            .unwrap();
        assert_eq!(opts.delimiter(), ',');
        assert_eq!(opts.line_terminator(), "\t\t");
        assert!(opts.to_builder().build().is_ok());

        let base = Options::builder().line_terminator("|\n").build().unwrap();
        let opts = FormatDetector::new(base).detect("a|b;c|d").unwrap();
        assert_eq!(opts.delimiter(), ';');
    }

    #[test]
    fn test_quote_candidate_falls_back_to_base() {
        let base = Options::builder()
            .delimiter(';')
            .quote(',')
            .build()
            .unwrap();
        let opts = FormatDetector::new(base).detect(",a,,b,").unwrap();
        assert_eq!(opts.delimiter(), ';');
        assert!(opts.quoting());
    }

    #[test]
    fn test_detect_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "x|y|z\n1|2|3\n").unwrap();
        let opts = FormatDetector::default().detect_path(file.path()).unwrap();
        assert_eq!(opts.delimiter(), '|');
    }
}
