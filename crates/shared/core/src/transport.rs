use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport used to reach an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportType {
    Rest,
    #[serde(alias = "WS")]
    WebSocket,
    Fix,
}

impl TransportType {
    /// URL-style scheme used when no explicit endpoint is registered
    pub fn scheme(&self) -> &'static str {
        match self {
            TransportType::Rest => "https",
            TransportType::WebSocket => "wss",
            TransportType::Fix => "fix",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Rest => write!(f, "REST"),
            TransportType::WebSocket => write!(f, "WEBSOCKET"),
            TransportType::Fix => write!(f, "FIX"),
        }
    }
}
