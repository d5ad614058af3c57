use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::EnvFilter;

use gridfeed_proxy::{default_app_state, router, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env();
    info!(
        vendor = config.vendor.as_str(),
        addr = %config.bind_addr,
        durable = config.durable_store,
        "starting gridfeed proxy"
    );

    let state = default_app_state(&config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
