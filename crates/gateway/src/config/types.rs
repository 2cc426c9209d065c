use conduit_core::{ExchangeId, ReconnectPolicy, TransportType};
use conduit_fix::SessionConfig;
use conduit_pool::{DEFAULT_MAX_CONNECTIONS, QualityConfig};
use conduit_rate_governor::ExchangeRateConfig;
use serde::{Deserialize, Serialize};

/// Root of the connectivity configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    pub exchanges: Vec<ExchangeConfig>,
}

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Tenant the runner trades for
    pub tenant: String,
    /// Drain deadline for graceful shutdown
    pub shutdown_timeout_ms: u64,
    /// How often queued requests are retried and pool health is checked
    pub maintenance_interval_ms: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            shutdown_timeout_ms: 5_000,
            maintenance_interval_ms: 1_000,
        }
    }
}

/// Everything configured for one exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// FIX session; exchanges without one only use the pool and governor
    #[serde(default)]
    pub fix: Option<SessionConfig>,
    #[serde(default)]
    pub rate_limits: ExchangeRateConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub reconnection: ReconnectPolicy,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

impl ExchangeConfig {
    pub fn exchange_id(&self) -> ExchangeId {
        ExchangeId::new(self.id.as_str())
    }

    /// Explicit endpoint for a transport; FIX falls back to the session's host:port
    pub fn endpoint(&self, transport: TransportType) -> Option<String> {
        let explicit = match transport {
            TransportType::Rest => self.endpoints.rest.clone(),
            TransportType::WebSocket => self.endpoints.websocket.clone(),
            TransportType::Fix => self.endpoints.fix.clone(),
        };
        explicit.or_else(|| match (transport, &self.fix) {
            (TransportType::Fix, Some(fix)) => Some(format!("{}:{}", fix.host, fix.port)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub rest: Option<String>,
    pub websocket: Option<String>,
    pub fix: Option<String>,
}
