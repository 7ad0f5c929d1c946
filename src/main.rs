#![cfg(not(tarpaulin_include))]

use pcapdash::app;
use pcapdash::config::Config;

/// Main entry point for the dashboard server
///
/// Loads `.env`, initializes logging, reads the runtime configuration from
/// the environment and serves the dashboard on the fixed port.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    app::run(config).await
}
