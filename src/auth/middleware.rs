//! Authentication middleware that validates bearer tokens and resolves them to users.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::{AuthError, TokenService, User, get_user_by_email},
};

/// The state needed for the auth middleware
#[derive(Debug, Clone)]
pub struct AuthState {
    /// Verifies the bearer tokens.
    pub token_service: TokenService,
    /// The account store the token identities are looked up in.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            token_service: state.token_service.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Why the auth guard turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The request had no bearer token.
    Missing,
    /// The token failed verification or its identity has no account.
    InvalidToken,
    /// The account store could not be queried.
    Unavailable,
}

impl From<AuthError> for Rejection {
    fn from(error: AuthError) -> Self {
        tracing::debug!("Rejecting bearer token: {error}");

        match error {
            AuthError::Missing => Rejection::Missing,
            AuthError::Malformed | AuthError::BadSignature | AuthError::Expired => {
                Rejection::InvalidToken
            }
        }
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Missing | Rejection::InvalidToken => Error::Unauthorized,
            Rejection::Unavailable => Error::StoreUnavailable,
        }
    }
}

/// Find the user that the bearer token in `headers` was issued to.
///
/// # Errors
///
/// Returns a [Rejection] if the token is missing or invalid, if its identity
/// has no account, or if the account store is unavailable.
pub fn authenticate(headers: &HeaderMap, state: &AuthState) -> Result<User, Rejection> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AuthError::Missing)?;

    let identity = state.token_service.verify(bearer.token())?;

    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("Could not acquire database lock: {error}");
        Rejection::Unavailable
    })?;

    match get_user_by_email(identity.as_str(), &connection) {
        Ok(user) => Ok(user),
        Err(Error::NotFound) => {
            tracing::debug!("Rejecting bearer token: no account for its identity");
            Err(Rejection::InvalidToken)
        }
        Err(error) => {
            tracing::error!("Could not look up token identity: {error}");
            Err(Rejection::Unavailable)
        }
    }
}

/// Middleware function that checks for a valid bearer token.
///
/// The [User] is placed into the request and the request executed normally if
/// the token is valid, otherwise an error response is returned. Missing and
/// invalid tokens get the same 401 response.
///
/// **Note**: Route handlers can use the function argument `Extension(user): Extension<User>` to receive the user.
pub async fn auth_guard(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &state) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(rejection) => Error::from(rejection).into_response(),
    }
}
