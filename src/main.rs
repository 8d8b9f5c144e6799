/// COMETA: fiber-optic construction management API
///
/// Main entry point. Reads configuration from the environment (and a `.env`
/// file when present) and starts the HTTP server with:
/// - Resource API at /api/*
/// - Reminder trigger at /api/cron/notifications
/// - Health check at /healthz

use cometa::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    start_server(config).await?;

    Ok(())
}
