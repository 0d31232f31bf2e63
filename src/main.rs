use std::path::PathBuf;

use texasfile_scraper::api;
use texasfile_scraper::config::ServerConfigLoader;

#[tokio::main]
async fn main() -> texasfile_scraper::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let loader = ServerConfigLoader::new(PathBuf::from("config.toml"));
    let config = loader.load()?;

    tracing::info!("Starting TexasFile scraper service");
    api::start_api_server(&config).await?;

    Ok(())
}
