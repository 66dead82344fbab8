// src/state.rs
//
// Composition root. Builds the service graph from one config struct and
// hands the caller the orchestrator plus the notice stream the UI should
// drain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::errors::SwiftaidResult;
use crate::models::events::RideNotice;
use crate::services::api::ApiClient;
use crate::services::gateway::{AuthTokens, GatewayConfig, RequestGateway};
use crate::services::navigation::{NavigationCoordinator, RouteProvider};
use crate::services::orchestrator::Orchestrator;
use crate::services::profile_service::DriverProfileStore;
use crate::services::realtime::{ChannelConfig, WsRealtimeChannel};
use crate::services::ride_service::RideLifecycleManager;
use crate::services::session_store::{FileSessionStore, SessionStore};

/// Bounds on how often the candidate list is refreshed while online.
const MIN_SYNC_INTERVAL_SECS: u64 = 5;
const MAX_SYNC_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub sync_interval_secs: u64,
    pub watchdog_interval_secs: u64,
    /// Session file location; `None` uses the platform data directory.
    pub storage_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            ws_url: "ws://localhost:3000/realtime".to_string(),
            request_timeout: Duration::from_secs(15),
            max_retries: 2,
            sync_interval_secs: 10,
            watchdog_interval_secs: 10,
            storage_path: None,
        }
    }
}

impl AppConfig {
    /// Sync interval clamped to the allowed window, so a bad config value
    /// can neither hammer the server nor let the list go stale.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(
            self.sync_interval_secs
                .clamp(MIN_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS),
        )
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }
}

/// Shared application state: the wired service graph.
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub channel: Arc<WsRealtimeChannel>,
    pub profile: Arc<DriverProfileStore>,
    pub rides: Arc<RideLifecycleManager>,
    pub navigation: Arc<NavigationCoordinator>,
    /// Stream of notices for the presentation layer to drain.
    pub notices: mpsc::UnboundedReceiver<RideNotice>,
}

impl AppState {
    /// Build the graph with a file-backed session store at the configured
    /// (or platform default) location.
    pub async fn new(
        config: AppConfig,
        tokens: AuthTokens,
        route_provider: Arc<dyn RouteProvider>,
    ) -> SwiftaidResult<Self> {
        let path = match &config.storage_path {
            Some(path) => path.clone(),
            None => FileSessionStore::default_path()?,
        };
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::open(path).await?);
        Self::with_store(config, tokens, route_provider, store)
    }

    pub fn with_store(
        config: AppConfig,
        tokens: AuthTokens,
        route_provider: Arc<dyn RouteProvider>,
        store: Arc<dyn SessionStore>,
    ) -> SwiftaidResult<Self> {
        let gateway = Arc::new(RequestGateway::new(
            GatewayConfig {
                base_url: config.api_base_url.clone(),
                request_timeout: config.request_timeout,
                max_retries: config.max_retries,
            },
            tokens.clone(),
        )?);
        let api = Arc::new(ApiClient::new(gateway));

        let (channel, event_rx) = WsRealtimeChannel::new(ChannelConfig {
            ws_url: config.ws_url.clone(),
            token: tokens.access_token,
        });

        let navigation = Arc::new(NavigationCoordinator::new(route_provider, store.clone()));
        let profile = Arc::new(DriverProfileStore::new(api.clone(), store.clone()));

        let (notice_tx, notices) = mpsc::unbounded_channel();
        let rides = Arc::new(RideLifecycleManager::new(
            api.clone(),
            store,
            channel.clone(),
            navigation.clone(),
            notice_tx.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            profile.clone(),
            rides.clone(),
            navigation.clone(),
            channel.clone(),
            api,
            notice_tx,
            event_rx,
            config.sync_interval(),
            config.watchdog_interval(),
        ));

        Ok(Self {
            config,
            orchestrator,
            channel,
            profile,
            rides,
            navigation,
            notices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ride::GeoPoint;
    use crate::models::route::RouteInfo;
    use crate::services::realtime::RideChannel;
    use crate::services::session_store::MemorySessionStore;
    use async_trait::async_trait;

    struct NoRouteProvider;

    #[async_trait]
    impl RouteProvider for NoRouteProvider {
        async fn calculate_route(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
        ) -> SwiftaidResult<Option<RouteInfo>> {
            Ok(None)
        }
    }

    fn tokens() -> AuthTokens {
        AuthTokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
        }
    }

    #[test]
    fn test_sync_interval_is_clamped() {
        let mut config = AppConfig::default();
        config.sync_interval_secs = 1;
        assert_eq!(config.sync_interval(), Duration::from_secs(5));
        config.sync_interval_secs = 60;
        assert_eq!(config.sync_interval(), Duration::from_secs(15));
        config.sync_interval_secs = 12;
        assert_eq!(config.sync_interval(), Duration::from_secs(12));
    }

    #[tokio::test]
    async fn test_graph_wires_up_with_memory_store() {
        let state = AppState::with_store(
            AppConfig::default(),
            tokens(),
            Arc::new(NoRouteProvider),
            Arc::new(MemorySessionStore::new()),
        )
        .unwrap();

        assert!(state.rides.accepted_ride().await.is_none());
        assert!(!state.channel.is_connected());
    }

    #[tokio::test]
    async fn test_file_store_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage_path = Some(dir.path().join("session.json"));

        let state = AppState::new(config, tokens(), Arc::new(NoRouteProvider))
            .await
            .unwrap();
        assert!(state.navigation.state().await.route.is_none());
    }
}
