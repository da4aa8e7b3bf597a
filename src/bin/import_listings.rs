//! Bulk-create listings from a JSON or YAML file.
//!
//! Rows whose seller, category or subcategory cannot be resolved are
//! skipped with a warning; image paths are relative to the input file.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use bazaar::{
    app::{config_path, init_tracing},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{SqlxCategoryRepository, SqlxListingImageRepository, SqlxListingRepository, SqlxUserRepository},
    },
    services::{image_store_from_config, read_rows, CategoryService, ListingImporter},
};

#[derive(Debug, Parser)]
#[command(name = "import-listings", about = "Import listings from a JSON or YAML file")]
struct Args {
    /// Rows to import (.json, .yaml or .yml)
    input: PathBuf,

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

    let rows = read_rows(&args.input)?;
    tracing::info!("Read {} rows from {:?}", rows.len(), args.input);

    let base_dir = args
        .input
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let categories = Arc::new(CategoryService::new(
        SqlxCategoryRepository::boxed(pool.clone()),
        create_cache(&config.cache),
    ));
    let importer = ListingImporter::new(
        SqlxUserRepository::boxed(pool.clone()),
        categories,
        SqlxListingRepository::boxed(pool.clone()),
        SqlxListingImageRepository::boxed(pool),
        image_store_from_config(&config.images)?,
        base_dir,
    );

    let report = importer.import(&rows).await;
    println!("Imported {} listings, skipped {}", report.imported, report.skipped);
    Ok(())
}
