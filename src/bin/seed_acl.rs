//! Re-run the idempotent ACL seed against the configured database. Safe to
//! run after adding permissions: mappings are rebuilt, never duplicated.

use clap::Parser;
use dotenvy::dotenv;

use chamber::authz::seed;
use chamber::db;

#[derive(Parser, Debug)]
#[command(author, version, about = "chamber ACL catalog seeder", long_about = None)]
struct Cli {}

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

    let _cli = Cli::parse();
    let pool = db::init().await?;

    seed::seed(&pool).await?;

    println!(
        "seeded {} tiers, {} roles, {} permissions",
        seed::TIERS.len(),
        seed::ROLES.len(),
        seed::PERMISSIONS.len()
    );
    Ok(())
}
