//! Issues and verifies the signed, time-limited bearer tokens used for authentication.

use std::fmt::{Debug, Display};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use time::{Duration, OffsetDateTime};

use crate::Error;

/// How long a token is valid for if no other duration is configured.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::minutes(30);

/// The subject of a token: the normalized email of an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from an already normalized email.
    pub fn new(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The contents of a JSON Web Token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// The identity the token was issued to.
    sub: Identity,
    /// When the token was issued, in Unix seconds.
    iat: i64,
    /// When the token expires, in Unix seconds.
    exp: i64,
}

/// A signed bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// The encoded token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(********)")
    }
}

/// Why a token was not accepted.
///
/// These are only ever logged. Clients see the same rejection for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No bearer token was sent.
    #[error("no bearer token in the request")]
    Missing,

    /// The token could not be decoded, used the wrong algorithm or is missing claims.
    #[error("the token is malformed")]
    Malformed,

    /// The signature does not match the header and claims.
    #[error("the token signature does not match")]
    BadSignature,

    /// The token was used after its expiry time.
    #[error("the token has expired")]
    Expired,
}

/// Signs and verifies tokens with a key derived from the server secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
}

impl TokenService {
    /// Create a token service whose signing key is derived from `secret`.
    ///
    /// `default_ttl` is the lifetime of tokens issued at log-in.
    pub fn new(secret: &str, default_ttl: Duration) -> Self {
        let key = Sha512::digest(secret);

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked in `verify_at` against an explicit time.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(key.as_slice()),
            decoding_key: DecodingKey::from_secret(key.as_slice()),
            validation,
            default_ttl,
        }
    }

    /// The lifetime of tokens issued at log-in.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for `identity` that expires `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns [Error::TokenCreation] if the token could not be signed.
    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<Token, Error> {
        self.issue_at(identity, ttl, OffsetDateTime::now_utc())
    }

    /// Issue a token for `identity` as if the current time was `now`.
    ///
    /// # Errors
    ///
    /// Returns [Error::TokenCreation] if the expiry time is out of range or the
    /// token could not be signed.
    pub fn issue_at(
        &self,
        identity: &Identity,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<Token, Error> {
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            Error::TokenCreation(format!("token lifetime {ttl} is out of range"))
        })?;

        let claims = Claims {
            sub: identity.clone(),
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map(Token)
            .map_err(|error| Error::TokenCreation(error.to_string()))
    }

    /// Check the signature and expiry of `token` and return its identity.
    ///
    /// # Errors
    ///
    /// Returns [AuthError::Malformed], [AuthError::BadSignature] or
    /// [AuthError::Expired].
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Verify `token` as if the current time was `now`.
    ///
    /// A token is still valid at the exact second it expires.
    ///
    /// # Errors
    ///
    /// Returns [AuthError::Malformed], [AuthError::BadSignature] or
    /// [AuthError::Expired].
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Identity, AuthError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |error| match error.kind() {
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            },
        )?;

        if now.unix_timestamp() > token_data.claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(token_data.claims.sub)
    }
}

impl Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
