//! Proctoring Pipeline - Main Entry Point

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    api::init_logging();

    info!("=== Proctor Pipeline v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Starting proctoring audit server...");

    let addr = "0.0.0.0:8080";
    api::run_server(addr).await
}
