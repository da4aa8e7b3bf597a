//! Load the built-in category taxonomy.
//!
//! Safe to run repeatedly: existing categories and subcategories are kept.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use bazaar::{
    app::{config_path, init_tracing},
    cache::create_cache,
    config::Config,
    db::{self, repositories::SqlxCategoryRepository},
    services::{CategoryService, TAXONOMY},
};

#[derive(Debug, Parser)]
#[command(name = "seed-categories", about = "Create the built-in categories and subcategories")]
struct Args {
    /// Configuration file (defaults to $BAZAAR_CONFIG or config.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = Config::load_with_env(&args.config.unwrap_or_else(config_path))?;
    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    let service = CategoryService::new(SqlxCategoryRepository::boxed(pool), create_cache(&config.cache));
    let report = service.seed(TAXONOMY).await?;

    println!(
        "Seeded {} categories and {} subcategories ({} categories in taxonomy)",
        report.categories_created,
        report.subcategories_created,
        TAXONOMY.len()
    );
    Ok(())
}
