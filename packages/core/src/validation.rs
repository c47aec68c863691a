// ABOUTME: Validation report shared by every entity validator
// ABOUTME: Errors block execution, warnings are informational

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another report into this one, prefixing each message with `scope`
    pub fn absorb(&mut self, scope: &str, other: ValidationReport) {
        for error in other.errors {
            self.error(format!("{}: {}", scope, error));
        }
        for warning in other.warnings {
            self.warning(format!("{}: {}", scope, warning));
        }
    }

    /// Add an error when a required text field is blank
    pub fn require_text(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.error(format!("{} is required", field));
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Single-line summary used in error messages
    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_valid() {
        let report = ValidationReport::default();
        assert!(report.is_valid);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_warning_keeps_report_valid() {
        let mut report = ValidationReport::new();
        report.warning("max_iter outside recommended range");
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_absorb_prefixes_and_invalidates() {
        let mut inner = ValidationReport::new();
        inner.error("role is required");
        inner.warning("verbose");

        let mut outer = ValidationReport::new();
        outer.absorb("agent A_1", inner);

        assert!(!outer.is_valid);
        assert_eq!(outer.errors, vec!["agent A_1: role is required".to_string()]);
        assert_eq!(outer.warnings, vec!["agent A_1: verbose".to_string()]);
    }

    #[test]
    fn test_require_text_rejects_whitespace() {
        let mut report = ValidationReport::new();
        report.require_text("goal", "   ");
        assert_eq!(report.summary(), "goal is required");
    }
}
