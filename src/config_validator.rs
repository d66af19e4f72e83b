use crate::config::Config;
use crate::error::ThrottlerError;
use crate::rate_limit_config::WorkerRules;
use crate::store::StorageBackend;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ThrottlerError> {
        if url.is_empty() {
            return Err(ThrottlerError::Validation(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://")
            && !url.starts_with("rediss://")
            && !url.starts_with("redis+unix://")
        {
            return Err(ThrottlerError::Validation(
                "Redis URL must start with 'redis://', 'rediss://' or 'redis+unix://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates a bind address
    pub fn validate_bind_address(address: &str) -> Result<(), ThrottlerError> {
        if address.is_empty() {
            return Err(ThrottlerError::Validation(
                "Bind address cannot be empty".to_string(),
            ));
        }

        if !address.contains(':') {
            return Err(ThrottlerError::Validation(
                "Bind address must be in host:port format".to_string(),
            ));
        }

        Ok(())
    }

    /// Namespaces end up as Redis key prefixes
    pub fn validate_namespace(namespace: &str) -> Result<(), ThrottlerError> {
        if namespace.trim().is_empty() {
            return Err(ThrottlerError::Validation(
                "Shared namespace cannot be empty".to_string(),
            ));
        }

        if namespace.contains(['*', '?', '[', ']', ' ']) {
            return Err(ThrottlerError::Validation(format!(
                "Shared namespace '{}' contains key pattern characters",
                namespace
            )));
        }

        Ok(())
    }

    /// Every rule must be valid and only refer to backends that exist.
    pub fn validate_rules(
        rules: &WorkerRules,
        shared_storage_enabled: bool,
    ) -> Result<(), ThrottlerError> {
        rules
            .validate()
            .map_err(|e| ThrottlerError::Validation(e.to_string()))?;

        if !shared_storage_enabled && rules.uses_storage(StorageBackend::Shared) {
            return Err(ThrottlerError::Validation(
                "Rules use shared storage but REDIS_URL is not set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_config(config: &Config) -> Result<(), ThrottlerError> {
        Self::validate_bind_address(&config.bind_addr.to_string())?;
        if let Some(url) = &config.redis_url {
            Self::validate_redis_url(url)?;
        }
        Self::validate_namespace(&config.shared_namespace)?;

        Ok(())
    }
}
