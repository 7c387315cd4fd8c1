#![allow(missing_docs)]

use rusqlite::Connection;

use crate::{
    AppState, AuthConfig,
    auth::{NewUser, PasswordHash, User, ValidatedPassword, create_user},
    sanitize::SanitizeConfig,
};

/// The lowest cost bcrypt accepts, to keep the tests fast.
pub(crate) const TEST_PASSWORD_COST: u32 = 4;

pub(crate) fn get_test_app_state() -> AppState {
    let connection =
        Connection::open_in_memory().expect("Could not open in-memory SQLite database");

    AppState::new(
        connection,
        "nafstenoas",
        AuthConfig {
            password_cost: TEST_PASSWORD_COST,
            ..Default::default()
        },
        SanitizeConfig::default(),
    )
    .expect("Could not create app state")
}

/// Insert a user whose password is `password`, skipping the strength checks.
pub(crate) fn insert_test_user(state: &AppState, email: &str, password: &str) -> User {
    let password_hash = PasswordHash::new(
        ValidatedPassword::new_unchecked(password),
        TEST_PASSWORD_COST,
    )
    .expect("Could not hash password");

    let connection = state
        .db_connection
        .lock()
        .expect("Could not acquire database lock");

    create_user(
        NewUser {
            email: email.to_owned(),
            full_name: "Test User".to_owned(),
            password_hash,
        },
        &connection,
    )
    .expect("Could not create test user")
}

