//! Migration runner CLI.
//!
//! `migrate` applies pending migrations (default), `migrate status` reports
//! per-version applied/pending, `migrate --dry-run` previews without
//! executing. Exits 0 on success, 1 on failure.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitflow_backend::db::Db;
use gitflow_backend::migrate::{Migrator, DEFAULT_MIGRATIONS_DIR};

#[derive(Parser, Debug)]
#[command(name = "migrate")]
#[command(about = "Apply or inspect database schema migrations", version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Preview pending migrations without executing them
    #[arg(long)]
    dry_run: bool,

    /// Migrations directory
    #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
    dir: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report applied/pending state for each migration file
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("error: DATABASE_URL is required");
            return ExitCode::FAILURE;
        }
    };

    let db = match Db::connect(&gitflow_backend::config::DatabaseConfig {
        url: database_url,
        pool_min: 1,
        pool_max: 2,
    })
    .await
    {
        Ok(db) => db,
        Err(e) => {
            eprintln!("error: could not connect to the database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let migrator = Migrator::new(db, &args.dir);

    match args.command {
        Some(Command::Status) => match migrator.status().await {
            Ok(entries) => {
                for entry in entries {
                    let mark = if entry.applied { "applied" } else { "pending" };
                    let when = entry
                        .applied_at
                        .map(|t| format!(" at {}", t.format("%Y-%m-%d %H:%M:%S UTC")))
                        .unwrap_or_default();
                    println!("{:<8} {} ({mark}{when})", entry.version, entry.name);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        None => match migrator.run(args.dry_run).await {
            Ok(applied) if applied.is_empty() => {
                println!("nothing to apply");
                ExitCode::SUCCESS
            }
            Ok(applied) => {
                let verb = if args.dry_run { "would apply" } else { "applied" };
                println!("{verb} {} migration(s): {}", applied.len(), applied.join(", "));
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}
