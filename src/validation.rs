use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    FieldCountMismatch { expected: usize, actual: usize },
    UnterminatedQuote,
}

/// A data-quality problem found in one record. Never aborts the parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line_number}: {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub line_number: usize,
    pub field_index: Option<usize>,
    pub message: String,
}

impl ValidationError {
    pub fn field_count(expected: usize, actual: usize, line_number: usize) -> Self {
        Self {
            kind: ValidationErrorKind::FieldCountMismatch { expected, actual },
            line_number,
            field_index: None,
            message: format!("expected {expected} fields, found {actual}"),
        }
    }

    pub fn unterminated_quote(field_index: usize, line_number: usize) -> Self {
        Self {
            kind: ValidationErrorKind::UnterminatedQuote,
            line_number,
            field_index: Some(field_index),
            message: format!("field {field_index} has an unterminated quote"),
        }
    }
}

/// Errors collected over one pass, plus counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
    records_checked: u64,
    invalid_records: u64,
}

impl ValidationResult {
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn records_checked(&self) -> u64 {
        self.records_checked
    }

    pub fn invalid_records(&self) -> u64 {
        self.invalid_records
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn record(&mut self, errors: &[ValidationError]) {
        self.records_checked += 1;
        if !errors.is_empty() {
            self.invalid_records += 1;
            self.errors.extend_from_slice(errors);
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ValidationError::field_count(3, 2, 9);
        assert_eq!(err.to_string(), "line 9: expected 3 fields, found 2");
        assert_eq!(err.field_index, None);
    }

    #[test]
    fn test_counts() {
        let mut result = ValidationResult::default();
        result.record(&[]);
        result.record(&[
            ValidationError::field_count(2, 1, 2),
            ValidationError::unterminated_quote(0, 2),
        ]);
        assert_eq!(result.records_checked(), 2);
        assert_eq!(result.invalid_records(), 1);
        assert_eq!(result.error_count(), 2);
        assert!(!result.is_valid());
        result.clear();
        assert!(result.is_valid());
        assert_eq!(result.records_checked(), 0);
    }
}
