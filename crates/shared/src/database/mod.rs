//! Live database handles the agent queries through.
//!
//! [`SqlDatabase`] is the toolkit surface (table listing, schema with sample rows,
//! raw query execution). [`DatabaseConnector`] builds a handle for a validated
//! [`BackendSelection`]; [`SqlxConnector`] is the production implementation.

mod mysql;
mod render;
mod sqlite;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::backend::BackendSelection;

pub use mysql::MySqlDatabase;
pub use sqlite::SqliteDatabase;

pub const SAMPLE_ROWS_IN_TABLE_INFO: u32 = 3;

pub type DatabaseFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, DatabaseError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    MySql,
}

impl SqlDialect {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
        }
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{0}")]
    Driver(#[from] sqlx::Error),
    #[error("table_names {0:?} not found in database")]
    UnknownTables(Vec<String>),
    #[error("invalid connection settings: {0}")]
    InvalidConnection(String),
}

pub trait SqlDatabase: Send + Sync {
    fn dialect(&self) -> SqlDialect;

    /// Usable table names, sorted.
    fn list_tables(&self) -> DatabaseFuture<'_, Vec<String>>;

    /// `CREATE TABLE` statement of each table followed by a few sample rows.
    fn table_info<'a>(&'a self, tables: &'a [String]) -> DatabaseFuture<'a, String>;

    /// Runs `sql` and renders the result rows as a list of tuples.
    fn run<'a>(&'a self, sql: &'a str) -> DatabaseFuture<'a, String>;
}

pub trait DatabaseConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        selection: &'a BackendSelection,
    ) -> DatabaseFuture<'a, Arc<dyn SqlDatabase>>;
}

#[derive(Debug, Clone)]
pub struct SqlxConnector {
    local_database_path: PathBuf,
    max_connections: u32,
}

impl SqlxConnector {
    pub fn new(local_database_path: PathBuf, max_connections: u32) -> Self {
        Self {
            local_database_path,
            max_connections,
        }
    }
}

impl DatabaseConnector for SqlxConnector {
    fn connect<'a>(
        &'a self,
        selection: &'a BackendSelection,
    ) -> DatabaseFuture<'a, Arc<dyn SqlDatabase>> {
        Box::pin(async move {
            match selection {
                BackendSelection::Local => {
                    info!(
                        path = %self.local_database_path.display(),
                        "opening local sqlite database read-only"
                    );
                    let database = SqliteDatabase::open_read_only(
                        &self.local_database_path,
                        self.max_connections,
                    )
                    .await?;
                    Ok(Arc::new(database) as Arc<dyn SqlDatabase>)
                }
                BackendSelection::Remote(remote) => {
                    info!(
                        host = %remote.host,
                        database = %remote.database,
                        "connecting to remote mysql database"
                    );
                    let database = MySqlDatabase::connect(remote, self.max_connections).await?;
                    Ok(Arc::new(database) as Arc<dyn SqlDatabase>)
                }
            }
        })
    }
}

/// Splits a comma separated table list, dropping blanks and surrounding quotes.
pub fn parse_table_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '`' || c == '\''))
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub(crate) fn ensure_known_tables(
    requested: &[String],
    known: &[String],
) -> Result<(), DatabaseError> {
    let missing = requested
        .iter()
        .filter(|table| !known.iter().any(|known| known == *table))
        .cloned()
        .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DatabaseError::UnknownTables(missing))
    }
}
