//! Common types for the Lockstep channel abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a simulation client.
///
/// Never sent on the wire; the protocol is anonymous. Used to tell clients
/// apart in logs and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a new random ClientId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ClientId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Addressing for a coordinator's two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Coordinator host (clients connect here)
    pub host: String,

    /// Request/reply endpoint port
    pub request_port: u16,

    /// Broadcast endpoint port
    pub broadcast_port: u16,
}

impl TransportConfig {
    /// Sets the coordinator host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets both endpoint ports.
    pub fn with_ports(mut self, request_port: u16, broadcast_port: u16) -> Self {
        self.request_port = request_port;
        self.broadcast_port = broadcast_port;
        self
    }

    /// `tcp://host:request_port`
    pub fn request_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.request_port)
    }

    /// `tcp://host:broadcast_port`
    pub fn broadcast_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.broadcast_port)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            request_port: 14550,
            broadcast_port: 14551,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_from_seed_is_deterministic() {
        assert_eq!(ClientId::from_seed(7), ClientId::from_seed(7));
        assert_ne!(ClientId::from_seed(7), ClientId::from_seed(8));
        assert_eq!(ClientId::from_seed(7).to_string().len(), 8);
    }

    #[test]
    fn test_transport_endpoints() {
        let config = TransportConfig::default()
            .with_host("sim-host")
            .with_ports(5000, 5001);

        assert_eq!(config.request_endpoint(), "tcp://sim-host:5000");
        assert_eq!(config.broadcast_endpoint(), "tcp://sim-host:5001");
    }

    #[test]
    fn test_transport_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.request_port, 14550);
        assert_eq!(config.broadcast_port, 14551);
    }
}
