//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::Connection;
use time::Duration;

use crate::{
    Error,
    auth::{DEFAULT_TOKEN_TTL, PasswordHash, TokenService},
    db::initialize,
    sanitize::{SanitizeConfig, Sanitizer},
};

/// Settings for issuing tokens and hashing passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    /// How long an access token is valid for.
    pub token_ttl: Duration,
    /// The bcrypt cost used for new password hashes and the dummy hash.
    pub password_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: DEFAULT_TOKEN_TTL,
            password_cost: PasswordHash::DEFAULT_COST,
        }
    }
}

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Signs and verifies access tokens.
    pub token_service: TokenService,

    /// Cleans untrusted request fields.
    pub sanitizer: Sanitizer,

    /// The bcrypt cost for new password hashes.
    pub password_cost: u32,

    /// The hash checked at log-in when the email has no account.
    pub dummy_hash: PasswordHash,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// `secret` is used to derive the token signing key.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized or the dummy
    /// password hash cannot be created.
    pub fn new(
        db_connection: Connection,
        secret: &str,
        auth_config: AuthConfig,
        sanitize_config: SanitizeConfig,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));

        Ok(Self {
            token_service: TokenService::new(secret, auth_config.token_ttl),
            sanitizer: Sanitizer::new(sanitize_config),
            password_cost: auth_config.password_cost,
            dummy_hash: PasswordHash::dummy(auth_config.password_cost)?,
            db_connection: connection,
        })
    }
}

impl FromRef<AppState> for Sanitizer {
    fn from_ref(state: &AppState) -> Self {
        state.sanitizer.clone()
    }
}
