/*! Creates the application's database schema. */

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{auth::create_user_table, settings::create_settings_table};

/// Create all of the tables used by the application.
///
/// Existing tables are left as they are, so this is safe to call on every start.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_settings_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
