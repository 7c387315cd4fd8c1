//! This file defines types that handle password validation and hashing.
//! `ValidatedPassword` wraps a string and ensures it is a strong enough password.
//! `PasswordHash` converts a `ValidatedPassword` into a salted and hashed password.

use std::fmt::{Debug, Display};

use bcrypt::{hash, verify};

use crate::{
    Error,
    validation::{FieldError, ValidationError},
};

/// The minimum number of characters in a password.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Passwords that pass the character class checks but are guessed first.
const COMMON_PASSWORDS: [&str; 7] = [
    "password", "12345678", "qwertyui", "letmein", "password1", "iloveyou", "abc12345",
];

/// A password that has been validated, but not yet hashed.
///
/// This struct can be used to construct a [PasswordHash].
#[derive(Clone, PartialEq)]
pub struct ValidatedPassword(String);

impl ValidatedPassword {
    /// Create and validate a new password from a sanitized string.
    ///
    /// # Errors
    ///
    /// This function will return a field error for the `password` field if:
    /// - the password is shorter than [PASSWORD_MIN_LENGTH] ([ValidationError::TooShort]),
    /// - the password is missing a lowercase letter, an uppercase letter or a
    ///   digit, or is a well-known password ([ValidationError::TooWeak]).
    pub fn new(password: &str) -> Result<Self, FieldError> {
        let too_weak = |message: &str| {
            Err(FieldError::new(
                "password",
                ValidationError::TooWeak,
                message,
            ))
        };

        if password.chars().count() < PASSWORD_MIN_LENGTH {
            return Err(FieldError::new(
                "password",
                ValidationError::TooShort,
                format!("Password must be at least {PASSWORD_MIN_LENGTH} characters long"),
            ));
        }

        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return too_weak("Password must contain at least one lowercase letter");
        }

        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return too_weak("Password must contain at least one uppercase letter");
        }

        if !password.chars().any(|c| c.is_ascii_digit()) {
            return too_weak("Password must contain at least one number");
        }

        let lowercase = password.to_lowercase();
        if COMMON_PASSWORDS.contains(&lowercase.as_str()) {
            return too_weak("Password is too common");
        }

        Ok(Self(password.to_owned()))
    }

    /// Create a new `ValidatedPassword` without any validation.
    ///
    /// The caller should ensure that `password` is a valid and secure password.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if an invalid password is provided it may cause incorrect behaviour but will not affect memory safety.
    pub fn new_unchecked(password: &str) -> Self {
        Self(password.to_owned())
    }
}

impl Display for ValidatedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", str::repeat("*", 8))
    }
}

impl Debug for ValidatedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ValidatedPassword({self})")
    }
}

/// A salted and hashed password.
///
/// The hash is never displayed or logged; `Debug` prints a placeholder.
#[derive(Clone, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// An alias for the default encryption cost for hashing passwords.
    pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

    /// Create a hashed password from a validated password with the specified `cost`.
    ///
    /// `cost` increases the rounds of hashing and therefore the time needed to verify a password.
    /// A value of at least 12 is recommended. Pass in [PasswordHash::DEFAULT_COST] to use the recommended cost.
    ///
    /// # Errors
    ///
    /// This function will return an error if the password could not be hashed.
    pub fn new(password: ValidatedPassword, cost: u32) -> Result<Self, Error> {
        match hash(&password.0, cost) {
            Ok(password_hash) => Ok(Self(password_hash)),
            Err(e) => Err(Error::HashingError(e.to_string())),
        }
    }

    /// Create a hash that no user password is expected to match.
    ///
    /// Log-in checks unknown identities against this hash so that they take as
    /// long as checking a wrong password for a known identity.
    ///
    /// # Errors
    ///
    /// This function will return an error if the password could not be hashed.
    pub fn dummy(cost: u32) -> Result<Self, Error> {
        Self::new(
            ValidatedPassword::new_unchecked("dummy-password-for-unknown-accounts"),
            cost,
        )
    }

    /// Create a new `PasswordHash` without any validation.
    ///
    /// The caller should ensure that `raw_password_hash` is a valid password hash.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if an invalid hash is provided it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(raw_password_hash: &str) -> Self {
        Self(raw_password_hash.to_owned())
    }

    /// Check that `raw_password` matches the stored password.
    ///
    /// The comparison is done by bcrypt in constant time.
    ///
    /// # Errors
    ///
    /// Returns [Error::HashingError] if the stored hash is malformed.
    pub fn verify(&self, raw_password: &str) -> Result<bool, Error> {
        verify(raw_password, &self.0).map_err(|error| Error::HashingError(error.to_string()))
    }
}

impl AsRef<str> for PasswordHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(********)")
    }
}
