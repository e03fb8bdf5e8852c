use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RelayError};

/// Identity of a proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub host: String,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` pair (bracketed IPv6 hosts are accepted)
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        let url = url::Url::parse(&format!("http://{}", addr)).map_err(|e| {
            RelayError::InvalidEndpoint(format!("invalid address {:?}: {}", addr, e))
        })?;

        let host = url.host_str().ok_or_else(|| {
            RelayError::InvalidEndpoint(format!("invalid address {:?}: missing host", addr))
        })?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        // Url drops the scheme's default port, so read it back from the input.
        let port = match url.port() {
            Some(port) => port.to_string(),
            None => addr
                .rsplit_once(':')
                .map(|(_, port)| port.to_string())
                .unwrap_or_default(),
        };

        EndpointDescriptor {
            host: host.to_string(),
            port,
            ..Default::default()
        }
        .key()
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Raw endpoint record as supplied by a proxy source
///
/// The port is kept as text because providers send it that way; it is
/// validated when the descriptor is turned into a [`ProxyEndpoint`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(deserialize_with = "port_as_string")]
    pub port: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub anonymity_level: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub up_time: Option<f64>,
    #[serde(default)]
    pub response_time: Option<f64>,
}

impl EndpointDescriptor {
    /// Validate host and port and return the endpoint identity
    pub fn key(&self) -> Result<EndpointKey> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(RelayError::InvalidEndpoint("host must not be empty".into()));
        }

        let port: u16 = self.port.trim().parse().map_err(|_| {
            RelayError::InvalidEndpoint(format!(
                "port {:?} of {} is not a valid port number",
                self.port, host
            ))
        })?;
        if port == 0 {
            return Err(RelayError::InvalidEndpoint(format!(
                "port of {} must be non-zero",
                host
            )));
        }

        Ok(EndpointKey::new(host, port))
    }
}

/// Providers disagree on whether the port is a number or a string.
fn port_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(s) => s,
        Port::Number(n) => n.to_string(),
    })
}

/// Descriptive metadata carried through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub protocols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymity_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
}

/// Mutable health state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_health_check: None,
        }
    }
}

/// A proxy endpoint in the pool
///
/// Identity and metadata are fixed at construction. Health is the only
/// mutable part and is changed through [`ProxyEndpoint::record_probe`] and
/// [`ProxyEndpoint::force_unhealthy`]. Endpoints rebuilt by a pool refresh
/// share the health cell of the endpoint they replace.
#[derive(Debug)]
pub struct ProxyEndpoint {
    key: EndpointKey,
    metadata: EndpointMetadata,
    health: Arc<RwLock<HealthState>>,
}

impl ProxyEndpoint {
    pub fn new(key: EndpointKey, metadata: EndpointMetadata) -> Self {
        Self::with_health(key, metadata, HealthState::default())
    }

    pub fn with_health(key: EndpointKey, metadata: EndpointMetadata, health: HealthState) -> Self {
        Self {
            key,
            metadata,
            health: Arc::new(RwLock::new(health)),
        }
    }

    /// New identity and metadata over `previous`'s health cell
    ///
    /// Writes made through either endpoint are seen by both.
    pub fn with_shared_health(
        key: EndpointKey,
        metadata: EndpointMetadata,
        previous: &ProxyEndpoint,
    ) -> Self {
        Self {
            key,
            metadata,
            health: Arc::clone(&previous.health),
        }
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn host(&self) -> &str {
        &self.key.host
    }

    pub fn port(&self) -> u16 {
        self.key.port
    }

    pub fn metadata(&self) -> &EndpointMetadata {
        &self.metadata
    }

    pub fn health(&self) -> HealthState {
        *self.health.read()
    }

    pub fn is_healthy(&self) -> bool {
        self.health.read().healthy
    }

    /// Apply the outcome of a liveness probe
    pub fn record_probe(&self, reachable: bool) {
        let mut health = self.health.write();
        if reachable {
            health.healthy = true;
            health.consecutive_failures = 0;
        } else {
            health.healthy = false;
            health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        }
        health.last_health_check = Some(Utc::now());
    }

    /// Take the endpoint out of rotation until the next successful probe
    pub fn force_unhealthy(&self) {
        let mut health = self.health.write();
        health.healthy = false;
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
    }

    /// Serializable view of the endpoint
    pub fn view(&self) -> EndpointView {
        let health = self.health();
        EndpointView {
            host: self.key.host.clone(),
            port: self.key.port,
            metadata: self.metadata.clone(),
            healthy: health.healthy,
            consecutive_failures: health.consecutive_failures,
            last_health_check: health.last_health_check,
        }
    }
}

impl TryFrom<EndpointDescriptor> for ProxyEndpoint {
    type Error = RelayError;

    fn try_from(descriptor: EndpointDescriptor) -> Result<Self> {
        let key = descriptor.key()?;
        let metadata = EndpointMetadata {
            provider_id: descriptor.id,
            protocols: descriptor.protocols,
            anonymity_level: descriptor.anonymity_level,
            country: descriptor.country,
            city: descriptor.city,
            up_time: descriptor.up_time,
            response_time: descriptor.response_time,
        };
        Ok(ProxyEndpoint::new(key, metadata))
    }
}

/// Point-in-time view of an endpoint, for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointView {
    pub host: String,
    pub port: u16,
    #[serde(flatten)]
    pub metadata: EndpointMetadata,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(host: &str, port: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            host: host.to_string(),
            port: port.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_descriptor_rejects_non_numeric_port() {
        let err = ProxyEndpoint::try_from(descriptor("10.0.0.1", "80a")).unwrap_err();
        assert!(matches!(err, RelayError::InvalidEndpoint(_)));

        let err = ProxyEndpoint::try_from(descriptor("10.0.0.1", "70000")).unwrap_err();
        assert!(matches!(err, RelayError::InvalidEndpoint(_)));

        let err = ProxyEndpoint::try_from(descriptor("10.0.0.1", "0")).unwrap_err();
        assert!(matches!(err, RelayError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_descriptor_rejects_empty_host() {
        let err = ProxyEndpoint::try_from(descriptor("  ", "8080")).unwrap_err();
        assert!(matches!(err, RelayError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_new_endpoint_starts_healthy() {
        let endpoint = ProxyEndpoint::try_from(descriptor("10.0.0.1", "3128")).unwrap();
        let health = endpoint.health();
        assert!(health.healthy);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_health_check.is_none());
        assert_eq!(endpoint.key().to_string(), "10.0.0.1:3128");
    }

    #[test]
    fn test_probe_transitions() {
        let endpoint = ProxyEndpoint::try_from(descriptor("10.0.0.1", "3128")).unwrap();

        endpoint.record_probe(false);
        endpoint.record_probe(false);
        let health = endpoint.health();
        assert!(!health.healthy);
        assert_eq!(health.consecutive_failures, 2);
        assert!(health.last_health_check.is_some());

        endpoint.record_probe(true);
        let health = endpoint.health();
        assert!(health.healthy);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn test_force_unhealthy_does_not_stamp_check_time() {
        let endpoint = ProxyEndpoint::try_from(descriptor("10.0.0.1", "3128")).unwrap();
        endpoint.force_unhealthy();

        let health = endpoint.health();
        assert!(!health.healthy);
        assert_eq!(health.consecutive_failures, 1);
        assert!(health.last_health_check.is_none());
    }

    #[test]
    fn test_endpoint_key_parse() {
        assert_eq!(
            EndpointKey::parse("proxy.example:8080").unwrap(),
            EndpointKey::new("proxy.example", 8080)
        );
        assert_eq!(
            EndpointKey::parse("proxy.example:80").unwrap(),
            EndpointKey::new("proxy.example", 80)
        );
        assert!(EndpointKey::parse("proxy.example").is_err());
        assert!(EndpointKey::parse("proxy.example:http").is_err());
    }

    #[test]
    fn test_endpoint_key_ipv6() {
        let key = EndpointKey::parse("[::1]:8080").unwrap();
        assert_eq!(key, EndpointKey::new("::1", 8080));
        assert_eq!(key.to_string(), "[::1]:8080");
    }

    #[test]
    fn test_descriptor_deserializes_provider_shape() {
        let json = r#"{
            "_id": "abc",
            "ip": "10.1.2.3",
            "port": 8080,
            "protocols": ["http"],
            "anonymityLevel": "elite",
            "country": "DE",
            "upTimeTryCount": 12
        }"#;
        let descriptor: EndpointDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.host, "10.1.2.3");
        assert_eq!(descriptor.port, "8080");
        assert_eq!(descriptor.anonymity_level.as_deref(), Some("elite"));

        let endpoint = ProxyEndpoint::try_from(descriptor).unwrap();
        assert_eq!(endpoint.metadata().provider_id.as_deref(), Some("abc"));
        assert_eq!(endpoint.metadata().country.as_deref(), Some("DE"));
    }
}
