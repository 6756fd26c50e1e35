use std::net::SocketAddr;

use aw_telemetry::TelemetryOptions;
use aw_util::{init_tracing, worker_addr, DEFAULT_SERVICE_NAME};
use aw_worker::{build_router, AppState, ServiceInfo};
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "aw-worker", version, about = "AndroidWorld worker HTTP front door")]
struct Args {
    /// Bind address
    #[arg(long, default_value_t = worker_addr())]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    let args = Args::parse();

    let options = TelemetryOptions::from_env(DEFAULT_SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    let info = ServiceInfo::from_options(&options);
    let telemetry = aw_telemetry::init(options);
    let state = AppState::new(telemetry, info);

    let addr: SocketAddr = args.addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("aw-worker listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("aw-worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
