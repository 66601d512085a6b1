use std::path::{Path, PathBuf};

use shared::config::{ApiConfig, ConfigError, load_dotenv};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;
use tracing::{error, info};

const STUDENT_SQL: &str = include_str!("../../../../data/student.sql");

const USAGE: &str = "usage: seed-student-db [--path <file>] [--force]";

#[derive(Debug, Clone, PartialEq, Eq)]
struct SeedOptions {
    path: Option<PathBuf>,
    force: bool,
}

#[derive(Debug, Error)]
enum SeedError {
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error("missing value for argument: {0}")]
    MissingValue(String),
    #[error("help requested")]
    HelpRequested,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to replace {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl SeedOptions {
    fn parse<I>(args: I) -> Result<Self, SeedError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self {
            path: None,
            force: false,
        };

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => return Err(SeedError::HelpRequested),
                "--path" => {
                    let value = iter.next().ok_or(SeedError::MissingValue(arg.clone()))?;
                    options.path = Some(PathBuf::from(value));
                }
                "--force" => options.force = true,
                unknown => return Err(SeedError::UnknownArgument(unknown.to_string())),
            }
        }

        Ok(options)
    }
}

#[tokio::main]
async fn main() {
    let dotenv_result = load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "seed_student_db=info".to_string()),
        )
        .init();

    if let Err(err) = dotenv_result {
        error!("failed to load .env: {err}");
        std::process::exit(1);
    }

    let options = match SeedOptions::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(SeedError::HelpRequested) => {
            println!("{USAGE}");
            return;
        }
        Err(err) => {
            error!("{err}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(options).await {
        error!("failed to seed student database: {err}");
        std::process::exit(1);
    }
}

async fn run(options: SeedOptions) -> Result<(), SeedError> {
    let path = match options.path {
        Some(path) => path,
        None => ApiConfig::from_env()?.local_database_path,
    };

    if path.exists() {
        if !options.force {
            info!(
                path = %path.display(),
                "student database already exists; pass --force to recreate it"
            );
            return Ok(());
        }
        std::fs::remove_file(&path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
    }

    seed(&path).await?;
    info!(path = %path.display(), "student database created");
    Ok(())
}

async fn seed(path: &Path) -> Result<(), SeedError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::raw_sql(STUDENT_SQL).execute(&pool).await?;
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{SeedError, SeedOptions, run};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_path_and_force() {
        let options =
            SeedOptions::parse(args(&["--path", "/tmp/student.db", "--force"])).expect("parses");
        assert_eq!(options.path, Some(PathBuf::from("/tmp/student.db")));
        assert!(options.force);
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        assert!(matches!(
            SeedOptions::parse(args(&["--verbose"])),
            Err(SeedError::UnknownArgument(arg)) if arg == "--verbose"
        ));
        assert!(matches!(
            SeedOptions::parse(args(&["--path"])),
            Err(SeedError::MissingValue(_))
        ));
    }

    #[tokio::test]
    async fn seeding_twice_without_force_keeps_existing_rows() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("student.db");

        for _ in 0..2 {
            run(SeedOptions {
                path: Some(path.clone()),
                force: false,
            })
            .await
            .expect("seed should succeed");
        }

        let pool = sqlx::SqlitePool::connect(&format!("sqlite://{}", path.display()))
            .await
            .expect("pool should open");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM STUDENT")
            .fetch_one(&pool)
            .await
            .expect("count should run");
        assert_eq!(count, 5);
    }
}
