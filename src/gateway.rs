//! Process-wide gateway handle.
//!
//! # Responsibilities
//! - Bundle config, compiled routes, pipeline and upstream client into a `Snapshot`
//! - Hand every request the current snapshot without locking
//! - Rebuild and swap the snapshot when configuration changes
//!
//! # Design Decisions
//! - `ArcSwap` for lock-free reads; in-flight requests finish on their old snapshot
//! - A single reload lock serializes writers
//! - The upstream client (and its pool) survives reloads unless timeouts or pool limits change
//! - A rejected config leaves the current snapshot untouched

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::config::{PoolConfig, ProxySettings, RateLimitConfig, SystemConfig, TimeoutConfig};
use crate::pipeline::units::{
    AccessLogger, ContentMasker, Forwarder, HeaderTransform, ParamTransform, RateLimiter, UrlBuilder,
};
use crate::pipeline::Pipeline;
use crate::routing::{RouteError, Router};
use crate::upstream::{HttpUpstream, UpstreamClient, UpstreamError};

/// Error raised while building a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("route compilation failed: {0}")]
    Route(#[from] RouteError),

    #[error("upstream client: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Settings that require a new upstream client when they change.
#[derive(Debug, Clone, PartialEq)]
struct ClientSignature {
    timeout: TimeoutConfig,
    pool: PoolConfig,
}

impl ClientSignature {
    fn of(settings: &ProxySettings) -> Self {
        Self {
            timeout: settings.timeout,
            pool: settings.pool,
        }
    }
}

/// Everything a request needs, frozen at load time.
pub struct Snapshot {
    pub config: Arc<SystemConfig>,
    pub router: Router,
    pub pipeline: Pipeline,
    client: Arc<dyn UpstreamClient>,
    signature: ClientSignature,
}

/// Assemble the built-in units.
pub fn build_pipeline(
    settings: &ProxySettings,
    rate_limit: &RateLimitConfig,
    client: Arc<dyn UpstreamClient>,
) -> Pipeline {
    let mut pipeline = Pipeline::new()
        .with_unit(UrlBuilder::new())
        .with_unit(HeaderTransform::new(&settings.strip_headers))
        .with_unit(ParamTransform::new())
        .with_unit(Forwarder::new(client, settings))
        .with_unit(ContentMasker::new())
        .with_unit(AccessLogger::new());
    if rate_limit.enabled {
        pipeline.register(Arc::new(RateLimiter::new(rate_limit)));
    }
    pipeline
}

impl Snapshot {
    fn build(
        config: SystemConfig,
        client: Arc<dyn UpstreamClient>,
        signature: ClientSignature,
    ) -> Result<Self, GatewayError> {
        let router = Router::from_config(&config.routes)?;
        let pipeline = build_pipeline(&config.proxy, &config.rate_limit, client.clone());
        Ok(Self {
            config: Arc::new(config),
            router,
            pipeline,
            client,
            signature,
        })
    }
}

pub struct Gateway {
    current: ArcSwap<Snapshot>,
    /// Fixed client used instead of building one from settings.
    client_override: Option<Arc<dyn UpstreamClient>>,
    reload_lock: Mutex<()>,
}

impl Gateway {
    pub fn new(config: SystemConfig) -> Result<Self, GatewayError> {
        Self::build(config, None)
    }

    /// Gateway whose snapshots always use `client`.
    pub fn with_client(config: SystemConfig, client: Arc<dyn UpstreamClient>) -> Result<Self, GatewayError> {
        Self::build(config, Some(client))
    }

    fn build(config: SystemConfig, client_override: Option<Arc<dyn UpstreamClient>>) -> Result<Self, GatewayError> {
        let signature = ClientSignature::of(&config.proxy);
        let client = match &client_override {
            Some(client) => client.clone(),
            None => Arc::new(HttpUpstream::new(&config.proxy)?) as Arc<dyn UpstreamClient>,
        };
        let snapshot = Snapshot::build(config, client, signature)?;
        tracing::info!(
            routes = snapshot.router.len(),
            units = ?snapshot.pipeline.unit_names(),
            "Gateway initialized"
        );

        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            client_override,
            reload_lock: Mutex::new(()),
        })
    }

    /// Current snapshot; hold it for the whole request.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn config(&self) -> Arc<SystemConfig> {
        self.current.load().config.clone()
    }

    /// Build a snapshot for `config` and swap it in.
    pub async fn apply(&self, config: SystemConfig) -> Result<(), GatewayError> {
        let _guard = self.reload_lock.lock().await;
        let previous = self.current.load_full();

        let signature = ClientSignature::of(&config.proxy);
        let client = match &self.client_override {
            Some(client) => client.clone(),
            None if signature == previous.signature => previous.client.clone(),
            None => {
                tracing::info!("Upstream settings changed, rebuilding client");
                Arc::new(HttpUpstream::new(&config.proxy)?) as Arc<dyn UpstreamClient>
            }
        };

        let snapshot = Snapshot::build(config, client, signature)?;
        tracing::info!(
            routes = snapshot.router.len(),
            units = ?snapshot.pipeline.unit_names(),
            "Configuration applied"
        );
        self.current.store(Arc::new(snapshot));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    #[tokio::test]
    async fn test_apply_swaps_snapshot() {
        let gateway = Gateway::new(SystemConfig::default()).unwrap();
        let before = gateway.snapshot();
        assert!(before.router.is_empty());

        let mut config = SystemConfig::default();
        config.routes.push(RouteConfig::new("api", "/api", "http://127.0.0.1:9"));
        gateway.apply(config).await.unwrap();

        assert_eq!(gateway.snapshot().router.len(), 1);
        // Holders of the old snapshot are unaffected
        assert!(before.router.is_empty());
        // Same timeouts and pool: client is reused
        assert!(Arc::ptr_eq(&before.client, &gateway.snapshot().client));
    }

    #[tokio::test]
    async fn test_changed_timeouts_rebuild_client() {
        let gateway = Gateway::new(SystemConfig::default()).unwrap();
        let before = gateway.snapshot();

        let mut config = SystemConfig::default();
        config.proxy.timeout.read_secs = 1.0;
        gateway.apply(config).await.unwrap();
        assert!(!Arc::ptr_eq(&before.client, &gateway.snapshot().client));
    }

    #[tokio::test]
    async fn test_rate_limiter_registered_when_enabled() {
        let mut config = SystemConfig::default();
        assert!(!Gateway::new(config.clone())
            .unwrap()
            .snapshot()
            .pipeline
            .unit_names()
            .contains(&"rate_limiter"));

        config.rate_limit.enabled = true;
        let names = Gateway::new(config).unwrap().snapshot().pipeline.unit_names();
        assert_eq!(names.first(), Some(&"rate_limiter"));
        assert_eq!(
            names,
            vec![
                "rate_limiter",
                "url_builder",
                "header_transform",
                "param_transform",
                "forwarder",
                "content_masker",
                "access_logger"
            ]
        );
    }
}
