//! Bazaar - a classifieds marketplace

use anyhow::Result;

use bazaar::{
    api,
    app::{build_state, config_path, init_tracing, spawn_background_tasks},
    config::Config,
    db,
    services::mailer_from_config,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let path = config_path();
    let config = Config::load_with_env(&path)?;
    tracing::info!(config = %path.display(), driver = ?config.database.driver, "Starting Bazaar");

    let pool = db::create_pool(&config.database).await?;
    if !db::migrations::is_up_to_date(&pool).await? {
        let applied = db::migrations::run_migrations(&pool).await?;
        tracing::info!("Schema upgraded ({} migrations)", applied);
    }

    let mailer = mailer_from_config(&config.email)?;
    let state = build_state(&config, pool, mailer)?;
    if state.category_service.list().await?.is_empty() {
        tracing::warn!("No categories yet, run `seed-categories` to load the taxonomy");
    }
    spawn_background_tasks(&state);

    let router = api::build_router(state, &config);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
