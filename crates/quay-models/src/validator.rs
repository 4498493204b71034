//! Aggregating validation errors.
//!
//! Domain types never short-circuit: a single `validate()` call reports
//! every problem, joined by `", "` in the rendered message. Callers rely on
//! being able to test whether the message names a particular field.

use std::fmt;

/// Trait implemented by every domain type with structural validation.
pub trait Validate {
    /// Checks the value, reporting every violation at once.
    ///
    /// # Errors
    ///
    /// Returns the aggregate of all field-level violations.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// An accumulating collection of field-level validation messages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<String>,
}

impl ValidationError {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation message.
    pub fn append(&mut self, message: impl Into<String>) {
        self.violations.push(message.into());
    }

    /// Records a violation for a named field.
    pub fn invalid_field(&mut self, field: &str) {
        self.violations.push(format!("invalid field: {field}"));
    }

    /// Merges another aggregate into this one, flattening its members.
    pub fn extend(&mut self, other: ValidationError) {
        self.violations.extend(other.violations);
    }

    /// True when no violations have accrued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Converts the aggregate into a result: `Ok(())` when empty.
    ///
    /// # Errors
    ///
    /// Returns `self` when any violation accrued.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

// Guids travel in URLs and store keys; the charset is deliberately narrow.
pub(crate) fn valid_guid(guid: &str) -> bool {
    !guid.is_empty()
        && guid
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub(crate) fn valid_absolute_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok()
}

// Root filesystem references are opaque location URLs; a fragment has no
// meaning there and is rejected.
pub(crate) fn valid_rootfs_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|url| url.fragment().is_none())
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.violations.join(", "))
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_aggregate_is_ok() {
        assert!(ValidationError::new().into_result().is_ok());
    }

    #[test]
    fn test_message_joins_violations_with_comma() {
        let mut err = ValidationError::new();
        err.invalid_field("domain");
        err.invalid_field("rootfs");
        assert_eq!(err.to_string(), "invalid field: domain, invalid field: rootfs");
    }

    #[test]
    fn test_extend_flattens_nested_aggregates() {
        let mut inner = ValidationError::new();
        inner.invalid_field("ports");

        let mut outer = ValidationError::new();
        outer.invalid_field("protocol");
        outer.extend(inner);

        assert_eq!(
            outer.to_string(),
            "invalid field: protocol, invalid field: ports"
        );
    }

    #[test]
    fn test_all_violations_surface_not_just_the_first() {
        let mut err = ValidationError::new();
        err.invalid_field("a");
        err.invalid_field("b");
        err.invalid_field("c");
        let rendered = err.to_string();
        assert!(rendered.contains('a') && rendered.contains('b') && rendered.contains('c'));
    }
}
