use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Externally visible base URL of the API; relative `proxyUrl` values resolve against it.
    pub public_base_url: Option<String>,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub forward_timeout: Duration,
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4000)),
            public_base_url: None,
            session_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            forward_timeout: Duration::from_secs(30),
            body_limit: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// The configured public base URL, else `http://{bind}`. Never ends in `/`.
    pub fn public_base(&self) -> String {
        self.public_base_url
            .as_deref()
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}", self.bind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(600));
        assert_eq!(config.public_base(), "http://127.0.0.1:4000");
    }

    #[test]
    fn test_public_base_trims_slash() {
        let config = ServerConfig {
            public_base_url: Some("https://preview.example.dev/".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(config.public_base(), "https://preview.example.dev");
    }
}
