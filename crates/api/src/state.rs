use serde::{Deserialize, Serialize};
use shop_services::OrderService;
use shop_stream::SubscriptionRegistry;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Header carrying the identity established by the upstream auth layer.
    pub identity_header: String,
    pub role_header: String,
    pub keep_alive_seconds: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            identity_header: "x-user-id".to_string(),
            role_header: "x-user-role".to_string(),
            keep_alive_seconds: 15,
        }
    }
}

impl ApiSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds.max(1))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub registry: SubscriptionRegistry,
    pub settings: ApiSettings,
    pub started_at: Instant,
    /// Cancelled on server shutdown so open event streams end.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(settings: ApiSettings) -> Self {
        let registry = SubscriptionRegistry::new();
        Self {
            orders: OrderService::new(registry.clone()),
            registry,
            settings,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}
