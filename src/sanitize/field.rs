//! Maps semantic field names to sanitization policies.

use super::{SanitizationPolicy, SpecialCharMode};

/// The class of a request field, which decides how strictly it is sanitized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldClass {
    /// Human names and titles: unicode allowed, punctuation kept to a minimum.
    Name,
    /// Email addresses and usernames: ASCII only.
    Identifier,
    /// Passwords: special characters are part of the value.
    Password,
    /// Anything else.
    Default,
}

impl FieldClass {
    /// Classify a field by its name, ignoring ASCII case.
    ///
    /// Unrecognised names fall back to [FieldClass::Default], never to a less
    /// strict class.
    pub fn from_name(field_name: &str) -> Self {
        match field_name.to_ascii_lowercase().as_str() {
            "full_name" | "name" | "display_name" | "title" => FieldClass::Name,
            "email" | "username" => FieldClass::Identifier,
            "password" | "confirm_password" => FieldClass::Password,
            _ => FieldClass::Default,
        }
    }

    /// The sanitization policy for this class of field.
    pub fn policy(self) -> SanitizationPolicy {
        match self {
            FieldClass::Name => SanitizationPolicy {
                allow_unicode: true,
                escape_html: false,
                special_char_mode: SpecialCharMode::Strict,
                log_suspicious: true,
            },
            FieldClass::Identifier => SanitizationPolicy {
                allow_unicode: false,
                escape_html: false,
                special_char_mode: SpecialCharMode::Balanced,
                log_suspicious: true,
            },
            FieldClass::Password => SanitizationPolicy {
                allow_unicode: false,
                escape_html: false,
                special_char_mode: SpecialCharMode::None,
                log_suspicious: true,
            },
            FieldClass::Default => SanitizationPolicy {
                allow_unicode: true,
                escape_html: true,
                special_char_mode: SpecialCharMode::Balanced,
                log_suspicious: true,
            },
        }
    }
}

/// Get the sanitization policy for the field called `field_name`.
pub fn policy_for(field_name: &str) -> SanitizationPolicy {
    FieldClass::from_name(field_name).policy()
}
