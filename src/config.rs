// Runtime configuration, resolved once at startup from the environment.

use std::time::Duration;

use crate::error::HotelsApiError;

/// Every recognized option, typed and validated in one place. Constructors
/// take `&Settings` instead of reading the environment ad hoc.
#[derive(Debug, Clone)]
pub struct Settings {
    pub amadeus_api_key: String,
    pub amadeus_api_secret: String,
    pub amadeus_base_url: String,

    pub api_timeout: Duration,
    pub max_retries: u32,

    pub client_pool_size: usize,
    pub pool_acquire_timeout: Duration,
    pub request_timeout: Duration,

    pub enable_caching: bool,
    pub cache_max_size: usize,
    pub cache_ttl: Duration,

    pub performance_history_size: usize,

    /// Bearer tokens accepted by the transport. Empty list disables the check.
    pub auth_tokens: Vec<String>,

    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            amadeus_api_key: String::new(),
            amadeus_api_secret: String::new(),
            amadeus_base_url: "https://test.api.amadeus.com".to_string(),
            api_timeout: Duration::from_secs(30),
            max_retries: 3,
            client_pool_size: 5,
            pool_acquire_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            enable_caching: true,
            cache_max_size: 1000,
            cache_ttl: Duration::from_secs(300),
            performance_history_size: 1000,
            auth_tokens: vec![],
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the environment. Unset variables keep their
    /// defaults; malformed numeric values are rejected later by `validate`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(key) = std::env::var("AMADEUS_API_KEY") {
            settings.amadeus_api_key = key;
        }
        if let Ok(secret) = std::env::var("AMADEUS_API_SECRET") {
            settings.amadeus_api_secret = secret;
        }
        if let Ok(url) = std::env::var("AMADEUS_BASE_URL") {
            settings.amadeus_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = env_u64("API_TIMEOUT_SECS") {
            settings.api_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("MAX_RETRIES") {
            settings.max_retries = n as u32;
        }
        if let Some(n) = env_u64("CLIENT_POOL_SIZE") {
            settings.client_pool_size = n as usize;
        }
        if let Some(secs) = env_u64("POOL_ACQUIRE_TIMEOUT_SECS") {
            settings.pool_acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("REQUEST_TIMEOUT_SECS") {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(flag) = std::env::var("ENABLE_CACHING") {
            settings.enable_caching = flag.parse().unwrap_or(true);
        }
        if let Some(n) = env_u64("CACHE_MAX_SIZE") {
            settings.cache_max_size = n as usize;
        }
        if let Some(secs) = env_u64("CACHE_TTL_SECS") {
            settings.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("PERFORMANCE_HISTORY_SIZE") {
            settings.performance_history_size = n as usize;
        }
        if let Ok(tokens) = std::env::var("AUTH_TOKENS") {
            settings.auth_tokens = tokens
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            settings.log_level = level;
        }

        settings
    }

    pub fn validate(&self) -> Result<(), HotelsApiError> {
        if self.amadeus_api_key.is_empty() {
            return Err(HotelsApiError::Validation(
                "AMADEUS_API_KEY is required".into(),
            ));
        }
        if self.amadeus_api_secret.is_empty() {
            return Err(HotelsApiError::Validation(
                "AMADEUS_API_SECRET is required".into(),
            ));
        }
        if self.client_pool_size == 0 {
            return Err(HotelsApiError::Validation(
                "client pool size must be positive".into(),
            ));
        }
        if self.cache_max_size == 0 && self.enable_caching {
            return Err(HotelsApiError::Validation(
                "cache max size must be positive when caching is enabled".into(),
            ));
        }
        if !self.amadeus_base_url.starts_with("http") {
            return Err(HotelsApiError::Validation(format!(
                "invalid Amadeus base URL: {}",
                self.amadeus_base_url
            )));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        Settings {
            amadeus_api_key: "key".into(),
            amadeus_api_secret: "secret".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.client_pool_size, 5);
        assert_eq!(s.cache_ttl, Duration::from_secs(300));
        assert_eq!(s.cache_max_size, 1000);
        assert!(s.enable_caching);
        assert!(s.auth_tokens.is_empty());
    }

    #[test]
    fn missing_credentials_rejected() {
        let s = Settings::default();
        assert!(s.validate().is_err());
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn zero_pool_size_rejected() {
        let s = Settings {
            client_pool_size: 0,
            ..valid_settings()
        };
        assert!(s.validate().is_err());
    }
}
