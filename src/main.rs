use rmcp::{ServiceExt, transport::stdio};

use gale::config::Config;
use gale::server::GaleServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the filter is built so DEBUG from the file counts.
    dotenvy::dotenv().ok();

    let default_level = if gale::config::env_bool("DEBUG", false) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("gale starting");

    let config = Config::from_env().inspect_err(|e| tracing::error!("invalid config: {e:#}"))?;
    let sweep_interval = config.sweep_interval;
    let server = GaleServer::new(config);
    let manager = server.manager();

    let sweeper = manager.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // the first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            sweeper.sweep().await;
        }
    });

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    tokio::select! {
        _ = service.waiting() => {
            tracing::info!("client disconnected");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; sweeping before exit");
            manager.sweep().await;
        }
    }

    tracing::info!("gale shutting down");
    Ok(())
}
