use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gridwatch::orchestrator::JobContext;
use gridwatch::web::{create_router, AppState};
use gridwatch::{db, AppConfig};

#[derive(Debug, Parser)]
#[command(name = "gridwatch", about = "GPU cloud price ingestion pipeline")]
struct Cli {
    /// Override the configured HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Directory for rolling log files
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let file_appender = tracing_appender::rolling::daily(&cli.log_dir, "gridwatch.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridwatch=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    let mut config = AppConfig::from_env()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if config.metrics.enabled {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()?;
        info!(addr = %metrics_addr, "Prometheus metrics exporter listening");
    }

    info!("Starting Gridwatch...");

    if let Some(dir) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|p| std::path::Path::new(p).parent())
    {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let pool = db::init_pool(&config.database).await?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState {
        ctx: JobContext::new(pool, config),
    };
    let router = create_router(state);

    info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}
