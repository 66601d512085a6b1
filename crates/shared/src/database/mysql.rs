use std::str::FromStr;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Row, TypeInfo, ValueRef};

use super::render::{CellValue, render_rows, render_table_info};
use super::{
    DatabaseError, DatabaseFuture, SAMPLE_ROWS_IN_TABLE_INFO, SqlDatabase, SqlDialect,
    ensure_known_tables,
};
use crate::backend::RemoteConnection;

const NUMERIC_TYPE_PREFIXES: &[&str] = &[
    "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "BIGINT", "DECIMAL", "FLOAT", "DOUBLE", "YEAR",
    "BOOLEAN",
];

/// Remote MySQL database. Statements go through the text protocol (`raw_sql`) so any
/// column type can be rendered from its wire text.
#[derive(Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    pub async fn connect(
        remote: &RemoteConnection,
        max_connections: u32,
    ) -> Result<Self, DatabaseError> {
        let url = remote
            .connection_url()
            .map_err(DatabaseError::InvalidConnection)?;
        let options = MySqlConnectOptions::from_str(url.as_str())?;

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    async fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::raw_sql("SHOW TABLES").fetch_all(&self.pool).await?;
        let mut names = rows
            .iter()
            .map(|row| text_at(row, 0))
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }

    async fn describe_table(&self, table: &str) -> Result<String, DatabaseError> {
        let quoted = quote_identifier(table);

        let ddl_sql = format!("SHOW CREATE TABLE {quoted}");
        let ddl_rows = sqlx::raw_sql(&ddl_sql).fetch_all(&self.pool).await?;
        let ddl = match ddl_rows.first() {
            Some(row) => text_at(row, 1)?,
            None => format!("CREATE TABLE {quoted} ()"),
        };

        let columns_sql = format!("SHOW COLUMNS FROM {quoted}");
        let columns = sqlx::raw_sql(&columns_sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| text_at(row, 0))
            .collect::<Result<Vec<_>, _>>()?;

        let sample_sql = format!("SELECT * FROM {quoted} LIMIT {SAMPLE_ROWS_IN_TABLE_INFO}");
        let rows = sqlx::raw_sql(&sample_sql).fetch_all(&self.pool).await?;
        let cells = rows
            .iter()
            .map(row_cells)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(render_table_info(&ddl, table, &columns, &cells))
    }
}

impl SqlDatabase for MySqlDatabase {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySql
    }

    fn list_tables(&self) -> DatabaseFuture<'_, Vec<String>> {
        Box::pin(self.table_names())
    }

    fn table_info<'a>(&'a self, tables: &'a [String]) -> DatabaseFuture<'a, String> {
        Box::pin(async move {
            let known = self.table_names().await?;
            ensure_known_tables(tables, &known)?;

            let mut sections = Vec::with_capacity(tables.len());
            for table in tables {
                sections.push(self.describe_table(table).await?);
            }
            Ok(sections.join("\n\n"))
        })
    }

    fn run<'a>(&'a self, sql: &'a str) -> DatabaseFuture<'a, String> {
        Box::pin(async move {
            let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
            let cells = rows
                .iter()
                .map(row_cells)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(render_rows(&cells))
        })
    }
}

fn row_cells(row: &MySqlRow) -> Result<Vec<CellValue>, sqlx::Error> {
    (0..row.columns().len())
        .map(|index| cell_at(row, index))
        .collect()
}

fn cell_at(row: &MySqlRow, index: usize) -> Result<CellValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;

    if is_numeric_type(&type_name) {
        return Ok(CellValue::Number(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }

    Ok(match String::from_utf8(bytes) {
        Ok(text) => CellValue::Text(text),
        Err(err) => CellValue::Bytes(err.into_bytes()),
    })
}

fn text_at(row: &MySqlRow, index: usize) -> Result<String, sqlx::Error> {
    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_numeric_type(type_name: &str) -> bool {
    NUMERIC_TYPE_PREFIXES
        .iter()
        .any(|prefix| type_name.starts_with(prefix))
}

fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}
