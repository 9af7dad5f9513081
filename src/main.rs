//! Gateway binary entry point.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use veil_gateway::config::{ConfigLoader, GatewayConfig, LogFormat};
use veil_gateway::modules::proxy::ProxyManager;
use veil_gateway::provider::{ConfigProvider, MemoryProvider};

fn init_tracing(config: &GatewayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_string()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gateway.toml".to_string());

    let config = match ConfigLoader::new().load_or_default(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    info!(
        name = %config.gateway.name,
        version = env!("CARGO_PKG_VERSION"),
        "starting gateway"
    );

    let provider = match MemoryProvider::load(&config.gateway.seed_file) {
        Ok(provider) => Arc::new(provider),
        Err(err) => {
            error!(path = %config.gateway.seed_file.display(), error = %err, "failed to load seed");
            return std::process::ExitCode::FAILURE;
        }
    };

    let manager = ProxyManager::new(provider.clone(), config.gateway.drain_grace());

    for service in provider.services() {
        if let Err(err) = manager.add_service(service.id).await {
            error!(service_id = service.id, error = %err, "failed to publish service");
        }
    }

    info!("gateway running, press Ctrl-C to stop");
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }

    info!("shutting down");
    manager.shutdown().await;
    std::process::ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    // Each configured log format must have a subscriber behind it; building
    // them (without installing) catches a missing formatter at test time.
    #[test]
    fn test_every_log_format_builds() {
        let _ = tracing_subscriber::fmt().json();
        let _ = tracing_subscriber::fmt().pretty();
        let _ = tracing_subscriber::fmt().compact();
    }
}
