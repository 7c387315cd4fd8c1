//! Per-field validation errors and the checks shared by request handlers.
//!
//! Validation always runs on sanitized values, never on the raw request input.

use std::fmt::Display;

use email_address::EmailAddress;
use serde::Serialize;

/// Why a field was rejected.
///
/// These describe the caller's own input and are safe to send back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    /// The value is shorter than allowed.
    TooShort,
    /// The value is longer than allowed.
    TooLong,
    /// The password is too easy to guess.
    TooWeak,
    /// Two values that must match do not.
    Mismatch,
    /// The value is not in the expected format.
    InvalidFormat,
    /// The sanitizer scored the value above the rejection threshold.
    Suspicious,
}

/// A validation failure for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// The name of the request field.
    pub field: String,
    /// The kind of failure.
    pub reason: ValidationError,
    /// A human readable explanation.
    pub message: String,
}

impl FieldError {
    /// Create a field error.
    pub fn new(field: &str, reason: ValidationError, message: impl Into<String>) -> Self {
        Self {
            field: field.to_owned(),
            reason,
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All the field errors found in a request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    /// Record an error.
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Keep the value of `result`, or record its error and return `None`.
    pub fn collect<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }

    /// Whether no errors were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The errors recorded for `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> {
        self.0.iter().filter(move |error| error.field == field)
    }

    /// Return `Ok(())` if no errors were recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` if any error was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<FieldError> for FieldErrors {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Check that a trimmed value has between `min` and `max` characters.
///
/// # Errors
///
/// Returns [ValidationError::TooShort] or [ValidationError::TooLong] with `label`
/// used in the message.
pub fn validate_length(
    field: &str,
    label: &str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), FieldError> {
    let length = value.chars().count();

    if length == 0 {
        Err(FieldError::new(
            field,
            ValidationError::TooShort,
            format!("{label} cannot be empty"),
        ))
    } else if length < min {
        Err(FieldError::new(
            field,
            ValidationError::TooShort,
            format!("{label} must be at least {min} characters long"),
        ))
    } else if length > max {
        Err(FieldError::new(
            field,
            ValidationError::TooLong,
            format!("{label} cannot exceed {max} characters"),
        ))
    } else {
        Ok(())
    }
}

/// Check that `email` looks like `local@domain.tld` and is plain ASCII.
///
/// # Errors
///
/// Returns [ValidationError::InvalidFormat] if the email is not valid.
pub fn validate_email(field: &str, email: &str) -> Result<(), FieldError> {
    let has_tld = email
        .rsplit_once('@')
        .and_then(|(_, domain)| domain.rsplit_once('.'))
        .is_some_and(|(host, tld)| {
            !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
        });

    if email.is_ascii()
        && !email.contains(char::is_whitespace)
        && has_tld
        && EmailAddress::is_valid(email)
    {
        Ok(())
    } else {
        Err(FieldError::new(
            field,
            ValidationError::InvalidFormat,
            "Please enter a valid email address",
        ))
    }
}
