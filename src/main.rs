mod api;
mod app;
mod config;
mod messaging;
mod metrics;
mod models;
mod replication;
mod service;
mod store;
mod telemetry;
mod utils;

use app::App;
use config::AppConfig;
use telemetry::Logger;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the real environment still applies
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let config = AppConfig::from_env()?;
    let logger = Logger::new(&config.log_level)?;

    let app_logger = logger.clone();
    logger
        .attach(async move {
            tracing::info!(dotenv = dotenv_loaded, "🚀 Starting calendar service");
            App::build(config, app_logger).await?.run().await
        })
        .await
}
