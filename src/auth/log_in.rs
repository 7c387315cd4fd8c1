//! This file defines the route for handling log-in requests.
//! The token module handles the lower level token signing and verification.

use std::sync::{Arc, Mutex};

use axum::{
    Form, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    auth::{Identity, PasswordHash, TokenService, get_user_by_email},
    sanitize::Sanitizer,
};

/// The token type sent with every access token.
pub const TOKEN_TYPE: &str = "bearer";

/// The state needed to perform a login.
#[derive(Debug, Clone)]
pub struct LogInState {
    /// Signs the access token returned on success.
    pub token_service: TokenService,
    /// Cleans the username and password.
    pub sanitizer: Sanitizer,
    /// Checked instead of a real hash when the email is unknown.
    pub dummy_hash: PasswordHash,
    /// The database users are looked up in.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LogInState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            token_service: state.token_service.clone(),
            sanitizer: state.sanitizer.clone(),
            dummy_hash: state.dummy_hash.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The raw data entered by the user in the log-in form.
///
/// The password is stored as a plain string. There is no need for validation here since
/// it will be compared against the password in the database, which has been verified.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogInForm {
    /// The email of the account.
    pub username: String,
    /// Password entered during log-in.
    pub password: String,
}

/// The body of a successful log-in response.
#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    /// The signed bearer token.
    pub access_token: String,
    /// Always [TOKEN_TYPE].
    pub token_type: &'static str,
}

/// Handler for log-in requests via the POST method.
///
/// On a successful log-in request a bearer token is returned for the account.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - The email or password is not correct ([Error::InvalidCredentials]), in
///   which case the client is not told which one.
/// - An input field scored above the rejection threshold.
/// - An internal error occurred when verifying the password or signing the token.
pub async fn post_log_in(
    State(state): State<LogInState>,
    Form(form): Form<LogInForm>,
) -> Result<Json<AccessTokenResponse>, Error> {
    let username = state
        .sanitizer
        .clean("username", &form.username)
        .map_err(|error| Error::Validation(error.into()))?;
    let password = state
        .sanitizer
        .clean("password", &form.password)
        .map_err(|error| Error::Validation(error.into()))?;

    let email = username.trim().to_lowercase();

    let user = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        match get_user_by_email(&email, &connection) {
            Ok(user) => Some(user),
            Err(Error::NotFound) => None,
            Err(error) => return Err(error),
        }
    };

    let password_hash = match &user {
        Some(user) => &user.password_hash,
        None => &state.dummy_hash,
    };

    let is_password_valid = password_hash.verify(&password)?;

    let user = match user {
        Some(user) if is_password_valid => user,
        _ => {
            tracing::info!("Failed log-in attempt");
            return Err(Error::InvalidCredentials);
        }
    };

    let token = state.token_service.issue(
        &Identity::new(user.email),
        state.token_service.default_ttl(),
    )?;

    Ok(Json(AccessTokenResponse {
        access_token: token.as_str().to_owned(),
        token_type: TOKEN_TYPE,
    }))
}

#[cfg(test)]
mod log_in_tests {
    use axum::{Router, http::StatusCode, http::header::WWW_AUTHENTICATE, routing::post};
    use axum_test::TestServer;
    use serde_json::Value;

    use crate::{
        AppState,
        test_utils::{get_test_app_state, insert_test_user},
    };

    use super::post_log_in;

    const LOG_IN_ROUTE: &str = "/log_in";

    fn get_test_server() -> (TestServer, AppState) {
        let state = get_test_app_state();
        insert_test_user(&state, "jane@example.com", "Abcdef12");

        let app = Router::new()
            .route(LOG_IN_ROUTE, post(post_log_in))
            .with_state(state.clone());

        (
            TestServer::new(app).expect("Could not create test server."),
            state,
        )
    }

    #[tokio::test]
    async fn log_in_succeeds_with_valid_credentials() {
        let (server, state) = get_test_server();

        let response = server
            .post(LOG_IN_ROUTE)
            .form(&[("username", "jane@example.com"), ("password", "Abcdef12")])
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().unwrap();
        assert_eq!(
            state.token_service.verify(token).unwrap().as_str(),
            "jane@example.com"
        );
    }

    #[tokio::test]
    async fn log_in_normalizes_email_case() {
        let (server, _) = get_test_server();

        let response = server
            .post(LOG_IN_ROUTE)
            .form(&[("username", "Jane@Example.COM"), ("password", "Abcdef12")])
            .await;

        response.assert_status_ok();
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (server, _) = get_test_server();

        let wrong_password = server
            .post(LOG_IN_ROUTE)
            .form(&[("username", "jane@example.com"), ("password", "Wrong123")])
            .await;
        let unknown_email = server
            .post(LOG_IN_ROUTE)
            .form(&[("username", "ghost@example.com"), ("password", "Abcdef12")])
            .await;

        for response in [&wrong_password, &unknown_email] {
            response.assert_status(StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.headers().get(WWW_AUTHENTICATE).unwrap(),
                "Bearer"
            );
            response.assert_json(&serde_json::json!({"detail": "Incorrect email or password"}));
        }
        assert_eq!(wrong_password.as_bytes(), unknown_email.as_bytes());
    }

    #[tokio::test]
    async fn suspicious_username_is_rejected_before_lookup() {
        let (server, _) = get_test_server();

        let response = server
            .post(LOG_IN_ROUTE)
            .form(&[
                ("username", "<script>' OR 1=1 --@example.com"),
                ("password", "Abcdef12"),
            ])
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["detail"][0]["field"], "username");
        assert_eq!(body["detail"][0]["reason"], "suspicious");
    }

    #[tokio::test]
    async fn non_ascii_credentials_are_rejected() {
        let (server, _) = get_test_server();

        for (username, password, field) in [
            ("jané@example.com", "Abcdef12", "username"),
            ("jane@example.com", "Abcdéf12", "password"),
        ] {
            let response = server
                .post(LOG_IN_ROUTE)
                .form(&[("username", username), ("password", password)])
                .await;

            response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
            let body: Value = response.json();
            assert_eq!(body["detail"][0]["field"], field);
            assert_eq!(body["detail"][0]["reason"], "invalid_format");
        }
    }

    #[tokio::test]
    async fn password_special_characters_are_not_stripped() {
        let state = get_test_app_state();
        insert_test_user(&state, "sam@example.com", "P@ss<w>rd{1}A");
        let app = Router::new()
            .route(LOG_IN_ROUTE, post(post_log_in))
            .with_state(state);
        let server = TestServer::new(app).expect("Could not create test server.");

        let response = server
            .post(LOG_IN_ROUTE)
            .form(&[("username", "sam@example.com"), ("password", "P@ss<w>rd{1}A")])
            .await;

        response.assert_status_ok();
    }
}
