use envconfig::Envconfig;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL. Without it only memory storage is available.
    #[envconfig(from = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// JSON file with the worker rules
    #[envconfig(from = "RULES_PATH")]
    pub rules_path: Option<PathBuf>,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Prefix of every list the shared store writes
    #[envconfig(from = "SHARED_NAMESPACE", default = "throttled")]
    pub shared_namespace: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn shared_storage_enabled(&self) -> bool {
        self.redis_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            redis_url: None,
            rules_path: None,
            log_level: "info".to_string(),
            shared_namespace: crate::store::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_from_hashmap() {
        let mut env = HashMap::new();
        env.insert("BIND_ADDR".to_string(), "0.0.0.0:8080".to_string());
        env.insert("REDIS_URL".to_string(), "redis://cache:6379".to_string());

        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.shared_storage_enabled());
        assert_eq!(config.shared_namespace, "throttled");
        assert_eq!(config.log_level, "info");
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn test_default_config_is_memory_only() {
        assert!(!Config::default().shared_storage_enabled());
    }
}
