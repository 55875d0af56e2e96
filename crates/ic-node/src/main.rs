//! # IC Node
//!
//! Entry point: install logging, load configuration, run the broker with a
//! live tick and replay the client notification round trip.

use anyhow::{Context, Result};
use ic_node::{NodeConfig, NodeRuntime};
use ic_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("Invalid configuration")?;
    info!(
        config = %serde_json::to_string(&config).context("Failed to encode configuration")?,
        "Configuration loaded"
    );

    let mut runtime = NodeRuntime::new(config).context("Failed to create runtime")?;
    runtime.start();

    let report = runtime.run_demo().await.context("Demo flow failed")?;
    println!(">>> Notification received.");
    println!("Sequence = {}", report.notification_text());
    info!(
        report = %serde_json::to_string(&report).context("Failed to encode report")?,
        "Demo complete"
    );

    if runtime.config().linger {
        info!("Node is running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
    }

    runtime.shutdown().await;
    Ok(())
}
