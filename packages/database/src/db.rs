//! Database connection setup.

use switchy_database::Database;
use switchy_database_connection::Credentials;

/// Opens the primary database connection from `database_url`.
///
/// A `sqlite://` URL opens a local file-backed store (development); anything
/// else is treated as a Postgres connection string.
///
/// # Errors
///
/// Returns an error if the connection string is malformed or the connection
/// fails.
pub async fn connect(database_url: &str) -> Result<Box<dyn Database>, Box<dyn std::error::Error>> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        let db = switchy_database_connection::init_sqlite_rusqlite(Some(std::path::Path::new(path)))?;
        return Ok(db);
    }

    let creds = Credentials::from_url(database_url)?;
    let db = switchy_database_connection::init_postgres_raw_native_tls(creds).await?;
    Ok(db)
}
