use std::fmt::Write as _;

const MAX_STRING_LENGTH: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    /// Numeric value already in its textual wire form (MySQL DECIMAL, UNSIGNED BIGINT, ...).
    Number(String),
    Text(String),
    Bytes(Vec<u8>),
}

impl CellValue {
    fn literal(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => render_real(*value),
            Self::Number(value) => value.clone(),
            Self::Text(value) => quote_text(&truncate(value)),
            Self::Bytes(value) => format!("b'<{} bytes>'", value.len()),
        }
    }

    fn plain(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Text(value) => truncate(value),
            other => other.literal(),
        }
    }
}

/// `[(1, 'Krish', 90), (2, 'Sudhanshu', 100)]`, or an empty string for no rows.
pub(crate) fn render_rows(rows: &[Vec<CellValue>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let rendered = rows
        .iter()
        .map(|row| {
            let cells = row.iter().map(CellValue::literal).collect::<Vec<_>>();
            if cells.len() == 1 {
                format!("({},)", cells[0])
            } else {
                format!("({})", cells.join(", "))
            }
        })
        .collect::<Vec<_>>();

    format!("[{}]", rendered.join(", "))
}

/// DDL followed by a commented block of sample rows, tab separated.
pub(crate) fn render_table_info(
    ddl: &str,
    table: &str,
    columns: &[String],
    rows: &[Vec<CellValue>],
) -> String {
    let mut out = String::new();
    out.push_str(ddl.trim_end());
    out.push_str("\n\n/*\n");
    let _ = writeln!(out, "{} rows from {table} table:", rows.len());
    if !columns.is_empty() {
        out.push_str(&columns.join("\t"));
        out.push('\n');
    }
    for row in rows {
        let cells = row.iter().map(CellValue::plain).collect::<Vec<_>>();
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    out.push_str("*/");
    out
}

fn render_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn quote_text(value: &str) -> String {
    if value.contains('\'') && !value.contains('"') {
        format!("\"{value}\"")
    } else {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

fn truncate(value: &str) -> String {
    if value.chars().count() <= MAX_STRING_LENGTH {
        return value.to_string();
    }
    let mut truncated = value.chars().take(MAX_STRING_LENGTH).collect::<String>();
    truncated.push_str("...");
    truncated
}
