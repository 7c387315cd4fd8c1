//! Defines the app level error type and its conversion to JSON responses.
use axum::{
    Json,
    http::{StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::validation::FieldErrors;

/// The message sent for log-in attempts with an unknown email or wrong password.
pub const INVALID_CREDENTIALS_MSG: &str = "Incorrect email or password";

/// The message sent for any request to a protected route that fails authentication.
pub const UNAUTHORIZED_MSG: &str = "Could not validate credentials";

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The email or the password given at log-in was wrong.
    ///
    /// Which of the two was wrong is never revealed to the client.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The request to a protected route had no valid bearer token, or the
    /// token's identity no longer exists.
    #[error("could not validate credentials")]
    Unauthorized,

    /// One or more request fields failed sanitization or validation.
    #[error("invalid input: {0}")]
    Validation(FieldErrors),

    /// The email used to register already belongs to an account.
    #[error("the email is already registered")]
    DuplicateEmail,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// A token could not be signed.
    #[error("could not create token: {0}")]
    TokenCreation(String),

    /// An error occurred while serializing a struct as JSON
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// The query string of a request could not be parsed or rebuilt.
    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    /// The account store could not be reached while authenticating a request.
    #[error("the account store is unavailable")]
    StoreUnavailable,

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

fn detail(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "detail": message })),
    )
        .into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::InvalidCredentials => unauthorized(INVALID_CREDENTIALS_MSG),
            Error::Unauthorized => unauthorized(UNAUTHORIZED_MSG),
            Error::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": errors })),
            )
                .into_response(),
            Error::DuplicateEmail => detail(StatusCode::BAD_REQUEST, "Email already registered"),
            Error::NotFound => detail(StatusCode::NOT_FOUND, "Not found"),
            Error::InvalidQuery(_) => detail(StatusCode::BAD_REQUEST, "Invalid query string"),
            Error::StoreUnavailable => {
                detail(StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable")
            }
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
