use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use usage_meter::AppState;
use usage_meter::api::create_router;
use usage_meter::config::Settings;
use usage_meter::observability::init_tracing;
use usage_meter::usage::MetricsRegistry;

#[derive(Parser)]
#[command(name = "usage-meter", about = "Per-request usage metrics for HTTP traffic")]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "USAGE_METER_CONFIG", default_value = "/etc/usage-meter/usage-meter.yaml")]
    config: PathBuf,

    /// Override listen address
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let settings = Settings::load(&cli.config)?;

    // Init logging
    init_tracing(&settings.observability)?;

    tracing::info!(
        config = %cli.config.display(),
        upstream = settings.upstream.as_ref().map(|u| u.url.as_str()).unwrap_or("none"),
        "starting usage-meter"
    );

    // One registry for the life of the process; reloads re-register into it
    let registry = MetricsRegistry::new();
    let state = AppState::new(settings, registry, Some(cli.config.clone()))?;

    let listen = cli
        .listen
        .unwrap_or_else(|| state.settings.http.listen.clone());

    let router = create_router(state.clone());
    start_server(&listen, router, state).await
}

async fn start_server(
    listen: &str,
    router: axum::Router,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind(listen).await?;
    tracing::info!(
        listen = %listen,
        metrics_path = %state.settings.metrics.path,
        "HTTP server starting"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state))
    .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let grace = state.settings.shutdown.grace_period_seconds;
    tracing::info!(
        grace_period_seconds = grace,
        "shutdown signal received, draining connections"
    );

    state.trigger_shutdown();

    // Bound the drain; in-flight requests past the grace period are dropped
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(grace)).await;
        tracing::warn!("grace period elapsed, exiting");
        std::process::exit(0);
    });
}
