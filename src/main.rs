use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use voxgate::config::AppConfig;
use voxgate::relay::{self, AppState};
use voxgate::tools::ToolDispatcher;

#[derive(Parser, Debug)]
#[command(
    name = "voxgate",
    version,
    about = "Realtime voice relay between browser clients and the OpenAI Realtime API"
)]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxgate=info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config)?;
    let dispatcher =
        ToolDispatcher::from_config(&config.tools, &config.resilience, config.strict_tools)?;

    let state = AppState {
        config: Arc::new(config),
        dispatcher: Arc::new(dispatcher),
    };
    let app = relay::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.server.bind).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
}
