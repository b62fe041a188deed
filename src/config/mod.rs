//! Configuration module for the Parley gateway
//!
//! Server configuration comes from `.env` files, environment variables and an
//! optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use parley_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::realtime::RealtimeUpstreamConfig;
use crate::core::relay::RelayLimits;

/// Default OpenAI REST base URL for one-shot calls.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Limits applied to every relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Largest frame accepted on either side. Required.
    pub max_message_bytes: usize,
    /// No idle timeout when unset.
    pub idle_timeout_seconds: Option<u64>,
    /// Default: 5
    pub close_timeout_seconds: u64,
    /// Default: 10
    pub connect_timeout_seconds: u64,
}

impl RelayConfig {
    pub fn limits(&self) -> RelayLimits {
        let mut limits = RelayLimits::new(self.max_message_bytes)
            .with_close_timeout(Duration::from_secs(self.close_timeout_seconds))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_seconds));
        if let Some(idle) = self.idle_timeout_seconds {
            limits = limits.with_idle_timeout(Duration::from_secs(idle));
        }
        limits
    }
}

/// S3-compatible bucket receiving generated audio.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, Supabase, R2)
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Base of the public object URL: `{public_url}/{bucket}/{name}`
    pub public_url: String,
}

/// HTTP mail API used for one-time codes.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - OpenAI credentials and endpoints
/// - Relay limits
/// - Authentication (JWT signing, token and code lifetimes)
/// - Storage and email collaborators
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // OpenAI
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_realtime_url: String,
    pub openai_realtime_model: String,

    // Relay
    pub relay: RelayConfig,

    // Authentication
    /// HS256 signing secret for access tokens
    pub jwt_secret: String,
    /// Default: 60
    pub access_token_expire_minutes: u64,
    /// Default: 30
    pub otp_expire_minutes: u64,
    /// Whether streaming routes require a token. REST routes always do.
    /// Default: true
    pub auth_required: bool,

    // Collaborators
    pub storage: Option<StorageConfig>,
    /// Directory `/ws/audio` writes captured recordings to.
    /// Default: the working directory
    pub audio_capture_dir: PathBuf,
    pub email: Option<EmailConfig>,

    // Security settings
    /// Comma-separated list of allowed origins, or "*"
    pub cors_allowed_origins: Option<String>,
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

/// Zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        self.jwt_secret.zeroize();
        if let Some(ref mut storage) = self.storage {
            if let Some(ref mut key) = storage.access_key {
                key.zeroize();
            }
            if let Some(ref mut secret) = storage.secret_key {
                secret.zeroize();
            }
        }
        if let Some(ref mut email) = self.email {
            email.api_key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and `.env`, loaded in main).
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format, a required value
    /// (`JWT_SECRET`, `RELAY_MAX_MESSAGE_BYTES`) is missing, or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let env_config = env::EnvConfig::load()?;
        merge::merge_config(env_config, None)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let env_config = env::EnvConfig::load()?;
        merge::merge_config(env_config, Some(yaml_config))
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Settings for opening realtime provider connections.
    ///
    /// A missing API key yields an empty credential; the connector rejects it
    /// per session, so the rest of the service still starts.
    pub fn realtime_upstream(&self) -> RealtimeUpstreamConfig {
        RealtimeUpstreamConfig::new(
            self.openai_api_key.clone().unwrap_or_default(),
            self.relay.max_message_bytes,
        )
        .with_url(self.openai_realtime_url.clone())
        .with_model(self.openai_realtime_model.clone())
        .with_close_timeout(Duration::from_secs(self.relay.close_timeout_seconds))
    }

    pub fn relay_limits(&self) -> RelayLimits {
        self.relay.limits()
    }

    /// A minimal configuration for tests and embedding.
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            tls: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_realtime_url: crate::core::realtime::OPENAI_REALTIME_URL.to_string(),
            openai_realtime_model: crate::core::realtime::DEFAULT_REALTIME_MODEL.to_string(),
            relay: RelayConfig {
                max_message_bytes: 1 << 20,
                idle_timeout_seconds: None,
                close_timeout_seconds: 5,
                connect_timeout_seconds: 10,
            },
            jwt_secret: "test-secret".to_string(),
            access_token_expire_minutes: 60,
            otp_expire_minutes: 30,
            auth_required: false,
            storage: None,
            audio_capture_dir: PathBuf::from("."),
            email: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    const ENV_KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "OPENAI_REALTIME_URL",
        "OPENAI_REALTIME_MODEL",
        "RELAY_MAX_MESSAGE_BYTES",
        "RELAY_IDLE_TIMEOUT_SECONDS",
        "RELAY_CLOSE_TIMEOUT_SECONDS",
        "RELAY_CONNECT_TIMEOUT_SECONDS",
        "JWT_SECRET",
        "ACCESS_TOKEN_EXPIRE_MINUTES",
        "OTP_EXPIRE_MINUTES",
        "AUTH_REQUIRED",
        "STORAGE_S3_BUCKET",
        "STORAGE_S3_REGION",
        "STORAGE_S3_ENDPOINT",
        "STORAGE_S3_ACCESS_KEY",
        "STORAGE_S3_SECRET_KEY",
        "STORAGE_PUBLIC_URL",
        "EMAIL_API_URL",
        "EMAIL_API_KEY",
        "EMAIL_FROM",
        "CORS_ALLOWED_ORIGINS",
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        "RATE_LIMIT_BURST_SIZE",
        "MAX_WEBSOCKET_CONNECTIONS",
        "MAX_CONNECTIONS_PER_IP",
    ];

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for key in ENV_KEYS {
                env::remove_var(key);
            }
        }
    }

    fn set_required_env() {
        unsafe {
            env::set_var("JWT_SECRET", "env-secret");
            env::set_var("RELAY_MAX_MESSAGE_BYTES", "65536");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        set_required_env();

        let config = ServerConfig::from_env().unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert!(!config.is_tls_enabled());
        assert_eq!(config.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.relay.max_message_bytes, 65536);
        assert_eq!(config.relay.idle_timeout_seconds, None);
        assert_eq!(config.relay.close_timeout_seconds, 5);
        assert_eq!(config.relay.connect_timeout_seconds, 10);
        assert_eq!(config.access_token_expire_minutes, 60);
        assert_eq!(config.otp_expire_minutes, 30);
        assert!(config.auth_required);
        assert!(config.storage.is_none());
        assert!(config.email.is_none());
        assert_eq!(config.max_connections_per_ip, 100);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_max_message_bytes() {
        cleanup_env_vars();
        unsafe {
            env::set_var("JWT_SECRET", "env-secret");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("RELAY_MAX_MESSAGE_BYTES"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_jwt_secret() {
        cleanup_env_vars();
        unsafe {
            env::set_var("RELAY_MAX_MESSAGE_BYTES", "1024");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();
        set_required_env();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("PORT"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_relay_limits() {
        cleanup_env_vars();
        set_required_env();
        unsafe {
            env::set_var("RELAY_IDLE_TIMEOUT_SECONDS", "120");
            env::set_var("RELAY_CONNECT_TIMEOUT_SECONDS", "3");
        }

        let config = ServerConfig::from_env().unwrap();
        let limits = config.relay_limits();
        assert_eq!(limits.max_message_bytes, 65536);
        assert_eq!(limits.idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(limits.connect_timeout, Duration::from_secs(3));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_partial_storage_config_is_rejected() {
        cleanup_env_vars();
        set_required_env();
        unsafe {
            env::set_var("STORAGE_S3_BUCKET", "ai-speak");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("STORAGE"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();
        set_required_env();
        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("OPENAI_API_KEY", "env-key");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

openai:
  api_key: "yaml-key"
  realtime_model: "gpt-4o-mini-realtime-preview"

relay:
  max_message_bytes: 131072
  idle_timeout_seconds: 300

storage:
  s3_bucket: "ai-speak"
  s3_region: "us-east-1"
  public_url: "https://cdn.example.com"
"#;
        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_api_key, Some("yaml-key".to_string()));
        assert_eq!(config.openai_realtime_model, "gpt-4o-mini-realtime-preview");
        assert_eq!(config.relay.max_message_bytes, 131072);
        assert_eq!(config.relay.idle_timeout_seconds, Some(300));
        // Not in YAML, comes from ENV
        assert_eq!(config.jwt_secret, "env-secret");
        let storage = config.storage.as_ref().unwrap();
        assert_eq!(storage.bucket, "ai-speak");
        assert_eq!(storage.public_url, "https://cdn.example.com");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let result = ServerConfig::from_file(&PathBuf::from("/nonexistent/config.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_realtime_upstream_from_config() {
        let mut config = ServerConfig::for_testing();
        config.openai_api_key = Some("sk-live".to_string());
        config.openai_realtime_url = "ws://127.0.0.1:9000/v1/realtime".to_string();

        let upstream = config.realtime_upstream();
        assert_eq!(upstream.api_key, "sk-live");
        assert_eq!(upstream.url, "ws://127.0.0.1:9000/v1/realtime");
        assert_eq!(upstream.max_message_bytes, config.relay.max_message_bytes);
    }

    #[test]
    fn test_address() {
        let mut config = ServerConfig::for_testing();
        config.host = "localhost".to_string();
        config.port = 8000;
        assert_eq!(config.address(), "localhost:8000");
    }
}
