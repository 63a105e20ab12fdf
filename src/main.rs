use std::sync::Arc;

use dns_rule_sync::config::{load_config, Config};
use dns_rule_sync::observability::init_tracing;
use dns_rule_sync::observer::{ShutdownSignal, StateObserver};
use dns_rule_sync::transport::UpstreamClient;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn main() {
    let config = load_config(DEFAULT_CONFIG_PATH).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to '{DEFAULT_CONFIG_PATH}' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.log_level);
    let runtime = build_runtime();

    let exit_code = runtime.block_on(run(config));
    std::process::exit(exit_code);
}

fn build_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        })
}

async fn run(config: Config) -> i32 {
    let client = match UpstreamClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::error!(error = %err, "failed to build upstream HTTP client");
            return 1;
        }
    };

    tracing::info!(upstream = %config.upstream_api_url, "checking connectivity to upstream router");
    if !client.check_connectivity().await {
        tracing::error!("health check failed, upstream router is unreachable");
        return 1;
    }
    tracing::info!("connectivity check passed");

    let shutdown = ShutdownSignal::new();
    spawn_signal_wiring(shutdown.clone());

    let observer = Arc::new(StateObserver::new(client, &config));
    tracing::info!(
        polling_interval = config.polling_interval,
        debounce_interval = config.debounce_interval,
        "starting state observer"
    );
    observer.run(shutdown).await;

    tracing::info!("shutdown complete");
    0
}

fn spawn_signal_wiring(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::info!("termination signal received, starting graceful shutdown");
        shutdown.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
