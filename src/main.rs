use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tracuunnt_service::{server, ScraperConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tracuunnt_service=debug")),
        )
        .init();

    let config = ScraperConfig::from_env();
    info!("Starting taxpayer lookup service on {}", config.bind_addr);

    if let Err(e) = server::serve(config).await {
        error!("Service terminated: {}", e);
        std::process::exit(1);
    }
}
