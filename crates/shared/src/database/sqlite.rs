use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};

use super::render::{CellValue, render_rows, render_table_info};
use super::{
    DatabaseError, DatabaseFuture, SAMPLE_ROWS_IN_TABLE_INFO, SqlDatabase, SqlDialect,
    ensure_known_tables,
};

/// Local file database. The pool is opened with `SQLITE_OPEN_READONLY`, so any write
/// statement is refused by SQLite itself.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn open_read_only(path: &Path, max_connections: u32) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    async fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn describe_table(&self, table: &str) -> Result<String, DatabaseError> {
        let ddl = sqlx::query_scalar::<_, Option<String>>(
            "SELECT sql FROM sqlite_master WHERE name = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?
        .flatten()
        .unwrap_or_else(|| format!("CREATE TABLE {} ()", quote_identifier(table)));

        let columns = sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let sample_sql = format!(
            "SELECT * FROM {} LIMIT {SAMPLE_ROWS_IN_TABLE_INFO}",
            quote_identifier(table)
        );
        let rows = sqlx::raw_sql(&sample_sql).fetch_all(&self.pool).await?;
        let cells = rows
            .iter()
            .map(row_cells)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(render_table_info(&ddl, table, &columns, &cells))
    }
}

impl SqlDatabase for SqliteDatabase {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
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

fn row_cells(row: &SqliteRow) -> Result<Vec<CellValue>, sqlx::Error> {
    (0..row.columns().len())
        .map(|index| cell_at(row, index))
        .collect()
}

fn cell_at(row: &SqliteRow, index: usize) -> Result<CellValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let storage_class = raw.type_info().name().to_ascii_uppercase();

    let cell = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => CellValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => CellValue::Real(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => CellValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => CellValue::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(cell)
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
