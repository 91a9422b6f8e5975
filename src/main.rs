use anyhow::Result;
use presence_monitor::{app::runtime, config};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presence_monitor=info".into()),
        )
        .init();

    info!("Presence monitor starting...");

    let config = config::load_from_env()?;
    info!(
        feed = %config.feed.ws_url(),
        increment_ms = config.reconnect.increment_ms,
        max_delay_ms = config.reconnect.max_delay_ms,
        "Configuration loaded"
    );

    runtime::run(config).await
}
