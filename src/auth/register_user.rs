//! The registration endpoint for creating a new account.
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    auth::{NewUser, PasswordHash, ValidatedPassword, create_user},
    sanitize::Sanitizer,
    validation::{FieldError, FieldErrors, ValidationError, validate_email, validate_length},
};

/// The shortest full name that is accepted.
pub const FULL_NAME_MIN_LENGTH: usize = 2;

/// The longest full name that is accepted.
pub const FULL_NAME_MAX_LENGTH: usize = 100;

/// The state needed for creating a new user.
#[derive(Debug, Clone)]
pub struct RegistrationState {
    /// Cleans each form field before it is validated.
    pub sanitizer: Sanitizer,
    /// The bcrypt cost new passwords are hashed with.
    pub password_cost: u32,
    /// The database where new users are stored.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            sanitizer: state.sanitizer.clone(),
            password_cost: state.password_cost,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The raw data entered by the user in the registration form.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterForm {
    /// The name the user wants to be known by.
    pub full_name: String,
    /// The email used to log in.
    pub email: String,
    /// The new password.
    pub password: String,
    /// Must be identical to `password`.
    pub confirm_password: String,
}

/// Registration data that has been sanitized and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    /// Trimmed full name.
    pub full_name: String,
    /// Lowercase email.
    pub email: String,
    /// The password, checked against the strength rules.
    pub password: ValidatedPassword,
}

/// Sanitize every field of `form` and check the cleaned values.
///
/// Every field is checked so that the client gets all of the problems at once.
///
/// # Errors
///
/// Returns the field errors if any field scored above the rejection threshold
/// or failed validation.
pub fn validate_registration(
    sanitizer: &Sanitizer,
    form: &RegisterForm,
) -> Result<ValidRegistration, FieldErrors> {
    let mut errors = FieldErrors::default();

    let full_name = errors
        .collect(sanitizer.clean("full_name", &form.full_name))
        .map(|full_name| full_name.trim().to_owned())
        .and_then(|full_name| {
            errors
                .collect(validate_length(
                    "full_name",
                    "Full name",
                    &full_name,
                    FULL_NAME_MIN_LENGTH,
                    FULL_NAME_MAX_LENGTH,
                ))
                .map(|_| full_name)
        });

    let email = errors
        .collect(sanitizer.clean("email", &form.email))
        .map(|email| email.trim().to_lowercase())
        .and_then(|email| {
            errors
                .collect(validate_email("email", &email))
                .map(|_| email)
        });

    let password = errors
        .collect(sanitizer.clean("password", &form.password))
        .and_then(|password| errors.collect(ValidatedPassword::new(&password)));

    if errors
        .collect(sanitizer.clean("confirm_password", &form.confirm_password))
        .is_some()
        && form.password != form.confirm_password
    {
        errors.push(FieldError::new(
            "confirm_password",
            ValidationError::Mismatch,
            "Passwords do not match",
        ));
    }

    match (full_name, email, password) {
        (Some(full_name), Some(email), Some(password)) if errors.is_empty() => {
            Ok(ValidRegistration {
                full_name,
                email,
                password,
            })
        }
        _ => Err(errors),
    }
}

/// The public part of a newly registered account.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    /// The cleaned full name.
    pub full_name: String,
    /// The normalized email the account was stored under.
    pub email: String,
}

/// The body of a successful registration response.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    /// A confirmation message for the client.
    pub message: &'static str,
    /// The account that was created.
    pub user: RegisteredUser,
}

/// A route handler for creating a new user.
///
/// # Errors
///
/// Returns:
/// - [Error::Validation] if any field failed sanitization or validation,
/// - [Error::DuplicateEmail] if the email is already registered,
/// - an internal error if the password could not be hashed or the user stored.
pub async fn register_user(
    State(state): State<RegistrationState>,
    Json(form): Json<RegisterForm>,
) -> Result<(StatusCode, Json<RegistrationResponse>), Error> {
    let registration =
        validate_registration(&state.sanitizer, &form).map_err(Error::Validation)?;

    let password_hash = PasswordHash::new(registration.password, state.password_cost)?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let user = create_user(
        NewUser {
            email: registration.email,
            full_name: registration.full_name,
            password_hash,
        },
        &connection,
    )?;

    tracing::info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            message: "User registered successfully",
            user: RegisteredUser {
                full_name: user.full_name,
                email: user.email,
            },
        }),
    ))
}
