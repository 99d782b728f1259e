mod collectors;
mod config;
mod http;
mod state;

use axum::serve;
use clap::Parser;
use collectors::gpu::detect_gpu;
use collectors::system::SysinfoHost;
use config::{Config, EnvOverrides};
use http::HttpAppState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hwmond")]
#[command(version)]
struct Cli {
    /// YAML config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    /// Skip NVML initialisation and report GPU fields as null.
    #[arg(long)]
    no_gpu: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load(cli.config.as_deref(), &EnvOverrides::from_process_env()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if cli.no_gpu {
        cfg.gpu.enabled = false;
    }

    let addr = match cfg.listen_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, "некорректный адрес для прослушивания");
            std::process::exit(1);
        }
    };

    let gpu = detect_gpu(&cfg.gpu);
    info!(
        listen = %addr,
        disk_path = %cfg.disk_path.display(),
        gpu_available = gpu.is_available(),
        "запуск hwmond"
    );

    let app = http::build_router(HttpAppState {
        host: Arc::new(SysinfoHost),
        gpu,
        disk_path: Arc::new(cfg.disk_path.clone()),
    });

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %addr, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let http_task = tokio::spawn(async move {
        let server = serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            error!(error = %err, "ошибка HTTP-сервера");
        }
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
