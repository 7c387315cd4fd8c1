//! Per-user preferences: the display theme, the currency and free-form extras.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    AppState, Error,
    auth::{User, UserID},
    sanitize::Sanitizer,
    validation::{FieldError, FieldErrors, ValidationError, validate_length},
};

/// The theme new users start with.
pub const DEFAULT_THEME: &str = "light";

/// The currency new users start with.
pub const DEFAULT_CURRENCY_CODE: &str = "USD";

const THEME_MAX_LENGTH: usize = 20;

/// The preferences stored for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// The name of the display theme, e.g. "dark".
    pub theme: String,
    /// ISO 4217 code, e.g. "NZD".
    pub currency_code: String,
    /// Any other preferences the client wants to keep.
    pub extras: Map<String, Value>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_owned(),
            currency_code: DEFAULT_CURRENCY_CODE.to_owned(),
            extras: Map::new(),
        }
    }
}

/// A partial update to [UserSettings]. Fields that are `None` are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    /// The new theme.
    pub theme: Option<String>,
    /// The new currency code, in any letter case.
    pub currency_code: Option<String>,
    /// Replaces all of the stored extras.
    pub extras: Option<Map<String, Value>>,
}

/// Create the user settings table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_settings_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user_settings (
                user_id INTEGER PRIMARY KEY,
                theme TEXT NOT NULL,
                currency_code TEXT NOT NULL,
                extras TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

fn extras_to_json(extras: &Map<String, Value>) -> Result<String, Error> {
    serde_json::to_string(extras).map_err(|error| Error::JSONSerializationError(error.to_string()))
}

/// Get the settings for `user_id`, storing the defaults first if the user has none.
///
/// # Errors
///
/// Returns an error if the settings could not be read or written.
pub fn get_or_create_settings(
    user_id: UserID,
    connection: &Connection,
) -> Result<UserSettings, Error> {
    let existing = connection
        .query_row(
            "SELECT theme, currency_code, extras FROM user_settings WHERE user_id = ?1",
            (user_id.as_i64(),),
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    match existing {
        Some((theme, currency_code, raw_extras)) => {
            let extras = serde_json::from_str(&raw_extras).unwrap_or_else(|error| {
                tracing::warn!("Discarding unreadable settings extras for user {user_id}: {error}");
                Map::new()
            });

            Ok(UserSettings {
                theme,
                currency_code,
                extras,
            })
        }
        None => {
            let settings = UserSettings::default();
            save_settings(user_id, &settings, connection)?;

            Ok(settings)
        }
    }
}

/// Insert or replace the settings for `user_id`.
///
/// # Errors
///
/// Returns an error if the extras could not be serialized or the query failed.
pub fn save_settings(
    user_id: UserID,
    settings: &UserSettings,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO user_settings (user_id, theme, currency_code, extras)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
            theme = excluded.theme,
            currency_code = excluded.currency_code,
            extras = excluded.extras",
        (
            user_id.as_i64(),
            &settings.theme,
            &settings.currency_code,
            extras_to_json(&settings.extras)?,
        ),
    )?;

    Ok(())
}

/// Apply `update` to the stored settings for `user_id` and return the result.
///
/// # Errors
///
/// Returns an error if the settings could not be read or written.
pub fn update_settings(
    user_id: UserID,
    update: SettingsUpdate,
    connection: &Connection,
) -> Result<UserSettings, Error> {
    let mut settings = get_or_create_settings(user_id, connection)?;

    if let Some(theme) = update.theme {
        settings.theme = theme;
    }

    if let Some(currency_code) = update.currency_code {
        settings.currency_code = currency_code;
    }

    if let Some(extras) = update.extras {
        settings.extras = extras;
    }

    save_settings(user_id, &settings, connection)?;

    Ok(settings)
}

/// Sanitize and check each field that is present in `update`.
///
/// # Errors
///
/// Returns the field errors if any field scored above the rejection threshold
/// or failed validation.
pub fn validate_settings_update(
    sanitizer: &Sanitizer,
    update: SettingsUpdate,
) -> Result<SettingsUpdate, FieldErrors> {
    let mut errors = FieldErrors::default();

    let theme = update.theme.and_then(|theme| {
        let theme = errors.collect(sanitizer.clean("theme", &theme))?;
        let theme = theme.trim().to_owned();
        errors
            .collect(validate_length("theme", "Theme", &theme, 1, THEME_MAX_LENGTH))
            .map(|_| theme)
    });

    let currency_code = update.currency_code.and_then(|currency_code| {
        let currency_code = errors.collect(sanitizer.clean("currency_code", &currency_code))?;
        errors.collect(parse_currency_code(&currency_code))
    });

    let extras = update.extras.and_then(|extras| {
        match errors.collect(sanitizer.clean_json("extras", &Value::Object(extras)))? {
            Value::Object(extras) => Some(extras),
            _ => None,
        }
    });

    errors.into_result()?;

    Ok(SettingsUpdate {
        theme,
        currency_code,
        extras,
    })
}

fn parse_currency_code(currency_code: &str) -> Result<String, FieldError> {
    let currency_code = currency_code.trim();

    if currency_code.len() == 3 && currency_code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(currency_code.to_ascii_uppercase())
    } else {
        Err(FieldError::new(
            "currency_code",
            ValidationError::InvalidFormat,
            "Currency code must be three letters, e.g. USD",
        ))
    }
}

/// The state needed to read and change settings.
#[derive(Debug, Clone)]
pub struct SettingsState {
    /// Cleans each field of an update.
    pub sanitizer: Sanitizer,
    /// The database the settings are stored in.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for SettingsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            sanitizer: state.sanitizer.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Return the settings of the authenticated user.
pub async fn get_settings(
    State(state): State<SettingsState>,
    Extension(user): Extension<User>,
) -> Result<Json<UserSettings>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    get_or_create_settings(user.id, &connection).map(Json)
}

/// Change some of the settings of the authenticated user.
pub async fn patch_settings(
    State(state): State<SettingsState>,
    Extension(user): Extension<User>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<UserSettings>, Error> {
    let update = validate_settings_update(&state.sanitizer, update).map_err(Error::Validation)?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    update_settings(user.id, update, &connection).map(Json)
}
