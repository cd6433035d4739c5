//! Configurable validator for tests and behavioural specs.

use std::path::Path;
use std::time::Duration;

use super::{ContentValidator, ValidationFailure, ValidationResult};
use crate::error::UpdateError;

/// Validator whose verdict is fixed at construction.
///
/// Allows test scenarios to specify exact pass/fail behaviour, to simulate
/// an unavailable backend, or to hold the updater inside its critical
/// section for a while.
#[derive(Debug, Default, Clone)]
pub struct ConfigurableValidator {
    failures: Vec<ValidationFailure>,
    error: Option<String>,
    delay: Duration,
}

impl ConfigurableValidator {
    /// Creates a validator that always passes.
    #[must_use]
    pub fn passing() -> Self {
        Self::default()
    }

    /// Creates a validator that fails with the specified failures.
    #[must_use]
    pub fn failing(failures: Vec<ValidationFailure>) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    /// Creates a validator that returns an error (backend unavailable).
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sleeps for `delay` before answering.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ContentValidator for ConfigurableValidator {
    fn validate(
        &self,
        _path: &Path,
        _original: &str,
        _modified: &str,
    ) -> Result<ValidationResult, UpdateError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(ref message) = self.error {
            return Err(UpdateError::validator_unavailable(message.clone()));
        }
        if self.failures.is_empty() {
            Ok(ValidationResult::Passed)
        } else {
            Ok(ValidationResult::Failed {
                failures: self.failures.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Instant;

    use super::*;

    #[test]
    fn failing_validator_reports_its_failures() {
        let failures = vec![ValidationFailure::new(PathBuf::from("page.html"), "broken")];
        let validator = ConfigurableValidator::failing(failures.clone());
        let result = validator
            .validate(Path::new("page.html"), "", "")
            .expect("runs");
        assert_eq!(result.failures(), Some(failures.as_slice()));
    }

    #[test]
    fn unavailable_validator_errors() {
        let validator = ConfigurableValidator::unavailable("checker crashed");
        let error = validator
            .validate(Path::new("page.html"), "", "")
            .expect_err("unavailable");
        assert!(error.is_transient());
    }

    #[test]
    fn delayed_validator_waits() {
        let validator = ConfigurableValidator::passing().delayed(Duration::from_millis(20));
        let started = Instant::now();
        let result = validator.validate(Path::new("page.html"), "", "").expect("runs");
        assert!(result.passed());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
