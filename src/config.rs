use crate::error::{Result, RelayError};
use std::env;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy pool configuration
    pub pool: PoolConfig,
    /// Forwarding engine configuration
    pub forward: ForwardConfig,
    /// API server configuration
    pub api: ApiServerConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How often the proxy list is re-fetched from the source
    pub fetch_interval: Duration,
    /// How often every endpoint is probed
    pub health_check_interval: Duration,
    /// Connect timeout for a single probe
    pub health_check_timeout: Duration,
    /// Maximum number of probes in flight at once
    pub health_check_workers: usize,
    /// Provider URL serving the proxy list as JSON (takes precedence over `static_proxies`)
    pub provider_url: Option<Url>,
    /// Fixed `host:port` list used when no provider URL is set
    pub static_proxies: Vec<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(300),
            health_check_timeout: Duration::from_secs(10),
            health_check_workers: 16,
            provider_url: None,
            static_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Connectivity failures tolerated against one proxy before it is marked unhealthy
    pub max_retries_per_proxy: u32,
    /// Distinct proxies tried before falling back to a direct connection
    pub max_proxy_attempts: u32,
    /// Timeout for establishing the outbound connection
    pub connect_timeout: Duration,
    /// Timeout for reading the response
    pub read_timeout: Duration,
    /// Content-Type added to requests that carry none (None disables)
    pub default_content_type: Option<String>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_retries_per_proxy: 3,
            max_proxy_attempts: 3,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            default_content_type: Some("application/json".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 8080)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let pool = PoolConfig {
            fetch_interval: Duration::from_secs(parse_env(
                "RELAY_PROXY_FETCH_INTERVAL_SECS",
                "3600",
            )?),
            health_check_interval: Duration::from_secs(parse_env(
                "RELAY_HEALTH_CHECK_INTERVAL_SECS",
                "300",
            )?),
            health_check_timeout: Duration::from_secs(parse_env(
                "RELAY_HEALTH_CHECK_TIMEOUT_SECS",
                "10",
            )?),
            health_check_workers: parse_env("RELAY_HEALTH_CHECK_WORKERS", "16")?,
            provider_url: parse_provider_url()?,
            static_proxies: get_env_or("RELAY_PROXIES", "")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let default_content_type = get_env_or("RELAY_DEFAULT_CONTENT_TYPE", "application/json");
        let forward = ForwardConfig {
            max_retries_per_proxy: parse_env("RELAY_MAX_RETRIES_PER_PROXY", "3")?,
            max_proxy_attempts: parse_env("RELAY_MAX_PROXY_ATTEMPTS", "3")?,
            connect_timeout: Duration::from_secs(parse_env("RELAY_CONNECT_TIMEOUT_SECS", "30")?),
            read_timeout: Duration::from_secs(parse_env("RELAY_READ_TIMEOUT_SECS", "60")?),
            default_content_type: Some(default_content_type.trim().to_string())
                .filter(|s| !s.is_empty()),
        };

        let config = Config {
            pool,
            forward,
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "8080").parse().map_err(|_| {
                    RelayError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject budgets and intervals that would disable the pool or the engine
    pub fn validate(&self) -> Result<()> {
        if self.forward.max_retries_per_proxy == 0 {
            return Err(RelayError::InvalidConfig(
                "RELAY_MAX_RETRIES_PER_PROXY must be at least 1".into(),
            ));
        }
        if self.forward.max_proxy_attempts == 0 {
            return Err(RelayError::InvalidConfig(
                "RELAY_MAX_PROXY_ATTEMPTS must be at least 1".into(),
            ));
        }
        if self.pool.health_check_workers == 0 {
            return Err(RelayError::InvalidConfig(
                "RELAY_HEALTH_CHECK_WORKERS must be at least 1".into(),
            ));
        }
        if self.pool.fetch_interval.is_zero() || self.pool.health_check_interval.is_zero() {
            return Err(RelayError::InvalidConfig(
                "fetch and health check intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_provider_url() -> Result<Option<Url>> {
    let raw = env::var("RELAY_PROXY_PROVIDER_URL").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(raw).map_err(|e| {
        RelayError::InvalidConfig(format!("RELAY_PROXY_PROVIDER_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(Some(url)),
        other => Err(RelayError::InvalidConfig(format!(
            "RELAY_PROXY_PROVIDER_URL has unsupported scheme: {}",
            other
        ))),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| RelayError::InvalidConfig(format!("{} must be a valid number", key)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "RELAY_PROXY_FETCH_INTERVAL_SECS",
        "RELAY_HEALTH_CHECK_INTERVAL_SECS",
        "RELAY_HEALTH_CHECK_TIMEOUT_SECS",
        "RELAY_HEALTH_CHECK_WORKERS",
        "RELAY_PROXY_PROVIDER_URL",
        "RELAY_PROXIES",
        "RELAY_MAX_RETRIES_PER_PROXY",
        "RELAY_MAX_PROXY_ATTEMPTS",
        "RELAY_CONNECT_TIMEOUT_SECS",
        "RELAY_READ_TIMEOUT_SECS",
        "RELAY_DEFAULT_CONTENT_TYPE",
        "API_PORT",
        "API_HOST",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.pool.fetch_interval, Duration::from_secs(3600));
        assert_eq!(config.pool.health_check_interval, Duration::from_secs(300));
        assert_eq!(config.pool.health_check_timeout, Duration::from_secs(10));
        assert!(config.pool.provider_url.is_none());
        assert!(config.pool.static_proxies.is_empty());

        assert_eq!(config.forward.max_retries_per_proxy, 3);
        assert_eq!(config.forward.max_proxy_attempts, 3);
        assert_eq!(config.forward.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.forward.read_timeout, Duration::from_secs(60));
        assert_eq!(
            config.forward.default_content_type.as_deref(),
            Some("application/json")
        );

        assert_eq!(config.api_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("RELAY_HEALTH_CHECK_INTERVAL_SECS", "15");
        env::set_var("RELAY_MAX_RETRIES_PER_PROXY", "1");
        env::set_var("RELAY_MAX_PROXY_ATTEMPTS", "5");
        env::set_var("RELAY_READ_TIMEOUT_SECS", "5");
        env::set_var("RELAY_PROXIES", "10.0.0.1:3128, 10.0.0.2:8080");
        env::set_var("RELAY_PROXY_PROVIDER_URL", "https://provider.example/list");
        env::set_var("RELAY_DEFAULT_CONTENT_TYPE", "");
        env::set_var("API_PORT", "9001");

        let config = Config::from_env().unwrap();

        assert_eq!(config.pool.health_check_interval, Duration::from_secs(15));
        assert_eq!(config.forward.max_retries_per_proxy, 1);
        assert_eq!(config.forward.max_proxy_attempts, 5);
        assert_eq!(config.forward.read_timeout, Duration::from_secs(5));
        assert_eq!(
            config.pool.static_proxies,
            vec!["10.0.0.1:3128".to_string(), "10.0.0.2:8080".to_string()]
        );
        assert_eq!(
            config.pool.provider_url.as_ref().map(|u| u.as_str()),
            Some("https://provider.example/list")
        );
        assert!(config.forward.default_content_type.is_none());
        assert_eq!(config.api.port, 9001);
    }

    #[test]
    fn test_config_from_env_invalid_number() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("RELAY_MAX_PROXY_ATTEMPTS", "many");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_zero_retry_budget_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("RELAY_MAX_RETRIES_PER_PROXY", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_provider_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("RELAY_PROXY_PROVIDER_URL", "ftp://provider.example/list");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
    }
}
