mod config;
mod lifecycle;

use anyhow::Result;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AgentConfig;
use lifecycle::AgentRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let config = AgentConfig::load()?;
    let runtime = AgentRuntime::new(config.clone())?;

    info!(
        source = config.ingest.path.as_deref().unwrap_or("stdin"),
        keyring = config.keyring_path.as_deref().unwrap_or("none"),
        patterns = config.patterns_path.as_deref().unwrap_or("none"),
        model = config.model_path.as_deref().unwrap_or("built-in"),
        "roadguard agent started"
    );

    let ingested = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(None)
        }
        ingest_result = runtime.ingest() => ingest_result.map(Some),
    };

    runtime.shutdown().await;
    if let Some(summary) = ingested? {
        info!(
            lines = summary.lines,
            malformed = summary.malformed,
            accepted = summary.accepted,
            rejected = summary.rejected,
            threats = summary.threats,
            clean = summary.clean,
            failed = summary.failed,
            unresolved = summary.unresolved,
            "input exhausted"
        );
    }
    info!("roadguard agent stopped");
    Ok(())
}
