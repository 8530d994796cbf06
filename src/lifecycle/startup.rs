//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, metrics and the gateway in dependency order
//! - Start background tasks (config watcher, admin API)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - Reloads never rebind listeners; server/admin address changes need a restart

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, ConfigStore, SystemConfig};
use crate::gateway::{Gateway, GatewayError};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{init_logging, metrics};

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub config_path: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl StartupOptions {
    fn apply(&self, config: &mut SystemConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging: {0}")]
    Logging(String),

    #[error("metrics: {0}")]
    Metrics(String),

    #[error("config watcher: {0}")]
    Watcher(#[from] notify::Error),
}

/// Start every subsystem and serve until a shutdown signal arrives.
pub async fn run(options: StartupOptions) -> Result<(), StartupError> {
    let store = Arc::new(ConfigStore::new(options.config_path.clone()));
    let mut config = store.load().await?;
    options.apply(&mut config);

    init_logging(&config.observability).map_err(|e| StartupError::Logging(e.to_string()))?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %store.path().display(),
        routes = config.routes.len(),
        "secure-proxy-gateway starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e: std::net::AddrParseError| StartupError::Metrics(e.to_string()))?;
        metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    }

    let gateway = Arc::new(Gateway::new(config.clone())?);

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    // The watcher stops when this handle is dropped at the end of `run`
    let (watcher, mut updates) = ConfigWatcher::new(store.path());
    let _watcher = watcher.run()?;
    {
        let gateway = gateway.clone();
        let options = options.clone();
        tokio::spawn(async move {
            while let Some(mut next) = updates.recv().await {
                options.apply(&mut next);
                if let Err(e) = gateway.apply(next).await {
                    tracing::error!(error = %e, "Reloaded config rejected, keeping current snapshot");
                }
            }
        });
    }

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let app = setup_admin_router(AdminState {
            gateway: gateway.clone(),
            store: store.clone(),
        });
        let stop = shutdown.wait();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stop).await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    HttpServer::new(gateway).run(listener, shutdown.wait()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_server_address() {
        let options = StartupOptions {
            config_path: PathBuf::from("gateway.toml"),
            host: Some("0.0.0.0".into()),
            port: Some(9000),
        };
        let mut config = SystemConfig::default();
        options.apply(&mut config);
        assert_eq!(config.server.bind_address(), "0.0.0.0:9000");

        let mut untouched = SystemConfig::default();
        StartupOptions::default().apply(&mut untouched);
        assert_eq!(untouched.server, SystemConfig::default().server);
    }
}
