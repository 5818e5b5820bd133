use anyhow::Result;
use colored::Colorize;
use sherlock::{config, init_tracing, server};
use tracing::info;

/// Execute the start command
///
/// Loads configuration, initializes logging from it and runs the server
/// until a shutdown signal arrives.
pub async fn execute() -> Result<()> {
    println!("{}", "Starting Sherlock...".green());

    let cfg = config::load_config()?;
    init_tracing(&cfg.app);

    info!(
        name = %cfg.app.name,
        profile = ?cfg.app.profile,
        "Starting Sherlock"
    );

    // Start the server (blocks until shutdown)
    server::start_server(cfg).await?;

    Ok(())
}
