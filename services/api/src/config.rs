use crate::ws::retry::RetryPolicy;
use elevenlabs_convai::{ConversationConfig, DEFAULT_API_BASE, DEFAULT_WS_BASE};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub agent_id: String,
    pub api_key: Option<SecretString>,
    pub requires_auth: bool,
    pub api_base: String,
    pub ws_base: String,
    /// Host advertised in the media-stream URL. Falls back to the request's
    /// `Host` header when unset.
    pub public_host: Option<String>,
    pub retry_backoff: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8010".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let agent_id = std::env::var("ELEVENLABS_AGENT_ID")
            .map_err(|_| ConfigError::MissingVar("ELEVENLABS_AGENT_ID".to_string()))?;

        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(SecretString::from);

        let requires_auth = match std::env::var("ELEVENLABS_REQUIRES_AUTH") {
            Ok(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "ELEVENLABS_REQUIRES_AUTH".to_string(),
                    format!("'{}' is not a boolean", value),
                )
            })?,
            Err(_) => true,
        };

        let api_base =
            std::env::var("ELEVENLABS_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let ws_base =
            std::env::var("ELEVENLABS_WS_BASE").unwrap_or_else(|_| DEFAULT_WS_BASE.to_string());

        let public_host = std::env::var("PUBLIC_HOST").ok().filter(|h| !h.is_empty());

        let retry_backoff = match std::env::var("RETRY_BACKOFF_MS") {
            Ok(value) => value.parse::<u64>().map(Duration::from_millis).map_err(|e| {
                ConfigError::InvalidValue("RETRY_BACKOFF_MS".to_string(), e.to_string())
            })?,
            Err(_) => Duration::ZERO,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        if requires_auth && api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "ELEVENLABS_API_KEY must be set when ELEVENLABS_REQUIRES_AUTH is true".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            agent_id,
            api_key,
            requires_auth,
            api_base,
            ws_base,
            public_host,
            retry_backoff,
            log_level,
        })
    }

    /// Retry policy applied to inbound dispatch and outbound writes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::once().with_backoff(self.retry_backoff)
    }

    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            agent_id: self.agent_id.clone(),
            api_key: self.api_key.clone(),
            requires_auth: self.requires_auth,
            api_base: self.api_base.clone(),
            ws_base: self.ws_base.clone(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("ELEVENLABS_AGENT_ID");
            env::remove_var("ELEVENLABS_API_KEY");
            env::remove_var("ELEVENLABS_REQUIRES_AUTH");
            env::remove_var("ELEVENLABS_API_BASE");
            env::remove_var("ELEVENLABS_WS_BASE");
            env::remove_var("PUBLIC_HOST");
            env::remove_var("RETRY_BACKOFF_MS");
            env::remove_var("RUST_LOG");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("ELEVENLABS_AGENT_ID", "agent_123");
            env::set_var("ELEVENLABS_API_KEY", "test-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8010");
        assert_eq!(config.agent_id, "agent_123");
        assert_eq!(
            config.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("test-key".to_string())
        );
        assert!(config.requires_auth);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.ws_base, DEFAULT_WS_BASE);
        assert_eq!(config.public_host, None);
        assert_eq!(config.retry_backoff, Duration::ZERO);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.retry_policy(), RetryPolicy::once());
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("ELEVENLABS_AGENT_ID", "agent_custom");
            env::set_var("ELEVENLABS_REQUIRES_AUTH", "false");
            env::set_var("ELEVENLABS_API_BASE", "http://localhost:9000");
            env::set_var("ELEVENLABS_WS_BASE", "ws://localhost:9000");
            env::set_var("PUBLIC_HOST", "calls.example.com");
            env::set_var("RETRY_BACKOFF_MS", "50");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert!(!config.requires_auth);
        assert!(config.api_key.is_none());
        assert_eq!(config.public_host.as_deref(), Some("calls.example.com"));
        assert_eq!(config.retry_policy().backoff, Duration::from_millis(50));
        assert_eq!(config.retry_policy().max_retries, 1);
        assert_eq!(config.log_level, Level::DEBUG);

        let conversation = config.conversation_config();
        assert_eq!(conversation.agent_id, "agent_custom");
        assert_eq!(
            conversation.public_url().unwrap().as_str(),
            "ws://localhost:9000/v1/convai/conversation?agent_id=agent_custom"
        );
    }

    #[test]
    #[serial]
    fn test_config_missing_agent_id() {
        clear_env_vars();
        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "test-key");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "ELEVENLABS_AGENT_ID"),
            _ => panic!("Expected MissingVar for ELEVENLABS_AGENT_ID"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key_when_auth_required() {
        clear_env_vars();
        unsafe {
            env::set_var("ELEVENLABS_AGENT_ID", "agent_123");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("ELEVENLABS_API_KEY")),
            _ => panic!("Expected MissingVar for ELEVENLABS_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        for (var, value) in [
            ("RUST_LOG", "not-a-level"),
            ("RETRY_BACKOFF_MS", "soon"),
            ("ELEVENLABS_REQUIRES_AUTH", "maybe"),
        ] {
            clear_env_vars();
            set_minimal_env();
            unsafe {
                env::set_var(var, value);
            }

            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {var}, got {other}"),
            }
        }
    }
}
