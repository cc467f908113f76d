//! One-time backfill of legacy news/events/resources rows into the unified
//! post model. Each record migrates in its own transaction; failures are
//! logged and skipped, and the run reports migrated vs failed counts.

use clap::{Parser, Subcommand};
use dotenvy::dotenv;

use chamber::db;
use chamber::store::legacy::{self, MigrationReport};

#[derive(Parser, Debug)]
#[command(author, version, about = "chamber legacy content backfill", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Migrate legacy news rows
    News,
    /// Migrate legacy event rows
    Events,
    /// Migrate legacy resource rows
    Resources,
    /// Migrate everything
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pool = db::init().await?;

    let report = match cli.command {
        Commands::News => legacy::migrate_news(&pool).await?,
        Commands::Events => legacy::migrate_events(&pool).await?,
        Commands::Resources => legacy::migrate_resources(&pool).await?,
        Commands::All => legacy::migrate_all(&pool).await?,
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &MigrationReport) {
    println!("migrated: {}", report.migrated);
    println!("failed:   {}", report.failed);
}
