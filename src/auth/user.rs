//! Code for creating the user table, fetching users from the database and
//! describing the current user.

use std::fmt::Display;

use axum::{Extension, Json};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Error, auth::PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application.
///
/// The caller should ensure that `id` and `email` are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's normalized email, which is also their token identity.
    pub email: String,
    /// The user's display name.
    pub full_name: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// When the account was registered.
    pub created_at: OffsetDateTime,
}

/// The data needed to insert a user.
///
/// All fields should already be sanitized and validated.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Lowercase email, unique across users.
    pub email: String,
    /// The cleaned full name.
    pub full_name: String,
    /// The bcrypt hash of the password.
    pub password_hash: PasswordHash,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                password TEXT NOT NULL,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// Returns:
/// - [Error::DuplicateEmail] if the email already belongs to a user,
/// - [Error::SqlError] if another SQL related error occurred.
pub fn create_user(new_user: NewUser, connection: &Connection) -> Result<User, Error> {
    let now = OffsetDateTime::now_utc();
    // Whole seconds so the value survives the round trip through SQLite unchanged.
    let created_at = now - Duration::nanoseconds(now.nanosecond().into());

    connection.execute(
        "INSERT INTO user (email, full_name, password, created_at) VALUES (?1, ?2, ?3, ?4)",
        (
            &new_user.email,
            &new_user.full_name,
            new_user.password_hash.as_ref(),
            created_at,
        ),
    )?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        email: new_user.email,
        full_name: new_user.full_name,
        password_hash: new_user.password_hash,
        created_at,
    })
}

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        email: row.get(1)?,
        full_name: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        created_at: row.get(4)?,
    })
}

/// Get the user whose normalized email is `email`.
///
/// # Errors
///
/// This function will return an error if:
/// - `email` does not belong to a registered user ([Error::NotFound]),
/// - there was an error trying to access the store.
pub fn get_user_by_email(email: &str, db_connection: &Connection) -> Result<User, Error> {
    db_connection
        .prepare(
            "SELECT id, email, full_name, password, created_at FROM user WHERE email = :email",
        )?
        .query_row(&[(":email", &email)], map_user_row)
        .map_err(|error| error.into())
}

/// The public view of a user, with the password hash left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    /// The ID of the user.
    pub id: i64,
    /// The email the user logs in with.
    pub email: String,
    /// The name of the user.
    pub full_name: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.as_i64(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            created_at: user
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| user.created_at.to_string()),
        }
    }
}

/// Return the account of the authenticated caller.
///
/// **Note**: this handler must sit behind the auth guard, which puts the [User] into the request.
pub async fn get_current_user(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

#[cfg(test)]
mod user_tests {
    use axum::Extension;
    use rusqlite::Connection;

    use crate::{Error, auth::PasswordHash};

    use super::{NewUser, create_user, create_user_table, get_current_user, get_user_by_email};

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        create_user_table(&conn).expect("Could not create user table");

        conn
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_owned(),
            full_name: "Jane Doe".to_owned(),
            password_hash: PasswordHash::new_unchecked("hunter2"),
        }
    }

    #[test]
    fn insert_user_succeeds() {
        let db_connection = get_db_connection();

        let inserted_user = create_user(new_user("jane@example.com"), &db_connection).unwrap();

        assert!(inserted_user.id.as_i64() > 0);
        assert_eq!(inserted_user.email, "jane@example.com");
        assert_eq!(
            inserted_user.password_hash,
            PasswordHash::new_unchecked("hunter2")
        );
    }

    #[test]
    fn insert_duplicate_email_fails() {
        let db_connection = get_db_connection();
        create_user(new_user("jane@example.com"), &db_connection).unwrap();

        let result = create_user(new_user("jane@example.com"), &db_connection);

        assert_eq!(result, Err(Error::DuplicateEmail));
    }

    #[test]
    fn get_user_fails_with_unknown_email() {
        let db_connection = get_db_connection();

        assert_eq!(
            get_user_by_email("nobody@example.com", &db_connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn get_user_succeeds_with_existing_email() {
        let db_connection = get_db_connection();
        let test_user = create_user(new_user("jane@example.com"), &db_connection).unwrap();

        let retrieved_user = get_user_by_email("jane@example.com", &db_connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[tokio::test]
    async fn current_user_response_has_no_password() {
        let db_connection = get_db_connection();
        let test_user = create_user(new_user("jane@example.com"), &db_connection).unwrap();

        let response = get_current_user(Extension(test_user.clone())).await;
        let json = serde_json::to_value(&response.0).unwrap();

        assert_eq!(json["id"], test_user.id.as_i64());
        assert_eq!(json["email"], "jane@example.com");
        assert_eq!(json["full_name"], "Jane Doe");
        assert!(json["created_at"].as_str().unwrap().contains('T'));
        assert!(json.get("password_hash").is_none());
    }
}
