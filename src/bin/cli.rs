use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Role id seeded by the initial migration; holds one all-grant rule of
/// every kind at the broadest scope.
const SUPERUSER_ROLE_ID: &str = "00000000-0000-0000-0000-000000000001";

#[derive(Parser, Debug)]
#[command(author, version, about = "warden admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create a user (if missing) and bind it to the superuser role
    SeedAdmin {
        login: String,
        /// Display name; defaults to the login
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::SeedAdmin { login, name } => {
            let pool = get_pool().await?;
            seed_admin(&pool, &login, name.as_deref()).await?;
            println!("{} now holds the superuser role", login);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let dir = migrations_dir();
    sqlx::migrate::Migrator::new(dir.as_path())
        .await
        .context("failed to read migrations directory")
}

fn migrations_dir() -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let dir = migrations_dir();
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{stamp}_{slug}.sql"));
    fs::write(&path, "-- write your migration here\n")?;
    Ok(path)
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied: Vec<i64> = sqlx::query("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map(|rows| rows.iter().map(|r| r.get::<i64, _>("version")).collect())
        .unwrap_or_default();

    for migration in migrator.iter() {
        let state = if applied.contains(&migration.version) { "applied" } else { "pending" };
        println!("{:>14}  {}  {}", migration.version, state, migration.description);
    }
    Ok(())
}

async fn seed_admin(pool: &SqlitePool, login: &str, name: Option<&str>) -> anyhow::Result<()> {
    let now = Utc::now();

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE login = ?")
        .bind(login)
        .fetch_optional(pool)
        .await?;

    let user_id = match existing {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO users (id, login, name, disabled, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
            )
            .bind(&id)
            .bind(login)
            .bind(name.unwrap_or(login))
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
            id
        }
    };

    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(&user_id)
        .bind(SUPERUSER_ROLE_ID)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(())
}
