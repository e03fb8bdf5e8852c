use serde::{Deserialize, Serialize};

use super::EndpointKey;

/// A single header; order and duplicates are preserved by keeping these in a Vec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Outbound request to forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: String,
}

impl RequestSpec {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header presence check
    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|h| h.name.eq_ignore_ascii_case(name))
    }
}

/// A complete HTTP exchange received over the wire, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
}

/// Result of a forward call, real or synthetic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSpec {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
    pub proxy_used: Option<EndpointKey>,
    pub used_direct: bool,
}

impl ResponseSpec {
    /// Response received through a proxy
    pub fn via_proxy(exchange: Exchange, proxy: EndpointKey) -> Self {
        Self::from_exchange(exchange, Some(proxy), false)
    }

    /// Response received over a direct connection
    pub fn direct(exchange: Exchange) -> Self {
        Self::from_exchange(exchange, None, true)
    }

    /// Locally built response carrying a diagnostic message
    pub fn synthetic(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![Header::new("Content-Type", "text/plain")],
            body: message.into(),
            proxy_used: None,
            used_direct: false,
        }
    }

    fn from_exchange(exchange: Exchange, proxy_used: Option<EndpointKey>, used_direct: bool) -> Self {
        Self {
            status: exchange.status,
            headers: exchange.headers,
            body: exchange.body,
            proxy_used,
            used_direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> Exchange {
        Exchange {
            status: 404,
            headers: vec![Header::new("X-A", "1"), Header::new("X-A", "2")],
            body: "missing".to_string(),
        }
    }

    #[test]
    fn test_response_construction_is_uniform() {
        let proxied = ResponseSpec::via_proxy(exchange(), EndpointKey::new("p", 1));
        let direct = ResponseSpec::direct(exchange());

        assert_eq!(proxied.status, direct.status);
        assert_eq!(proxied.headers, direct.headers);
        assert_eq!(proxied.body, direct.body);

        assert_eq!(proxied.proxy_used, Some(EndpointKey::new("p", 1)));
        assert!(!proxied.used_direct);
        assert!(direct.proxy_used.is_none());
        assert!(direct.used_direct);
    }

    #[test]
    fn test_has_header_ignores_case() {
        let request = RequestSpec::new("POST", "http://example.com").header("content-type", "text/xml");
        assert!(request.has_header("Content-Type"));
        assert!(!request.has_header("Accept"));
    }

    #[test]
    fn test_request_spec_deserializes_without_optional_fields() {
        let request: RequestSpec =
            serde_json::from_str(r#"{"method": "GET", "url": "http://example.com"}"#).unwrap();
        assert!(request.headers.is_empty());
        assert!(request.body.is_empty());
    }
}
