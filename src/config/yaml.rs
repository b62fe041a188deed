use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration; anything left out
/// falls back to environment variables and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     cert_path: "/etc/parley/cert.pem"
///     key_path: "/etc/parley/key.pem"
///
/// openai:
///   api_key: "sk-..."
///   base_url: "https://api.openai.com/v1"
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   realtime_model: "gpt-4o-realtime-preview-2024-12-17"
///
/// relay:
///   max_message_bytes: 1048576
///   idle_timeout_seconds: 300
///   close_timeout_seconds: 5
///   connect_timeout_seconds: 10
///
/// auth:
///   jwt_secret: "change-me"
///   access_token_expire_minutes: 60
///   otp_expire_minutes: 30
///   required: true
///
/// storage:
///   s3_bucket: "ai-speak"
///   s3_region: "us-east-1"
///   s3_endpoint: "https://project.supabase.co/storage/v1/s3"
///   s3_access_key: "access-key"
///   s3_secret_key: "secret-key"
///   public_url: "https://project.supabase.co/storage/v1/object/public"
///   audio_capture_dir: "/var/lib/parley/captures"
///
/// email:
///   api_url: "https://api.mail.example.com/v1/send"
///   api_key: "mail-key"
///   from: "no-reply@example.com"
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub relay: Option<RelayYaml>,
    pub auth: Option<AuthYaml>,
    pub storage: Option<StorageYaml>,
    pub email: Option<EmailYaml>,
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub realtime_url: Option<String>,
    pub realtime_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub max_message_bytes: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    pub close_timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub jwt_secret: Option<String>,
    pub access_token_expire_minutes: Option<u64>,
    pub otp_expire_minutes: Option<u64>,
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageYaml {
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub public_url: Option<String>,
    pub audio_capture_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EmailYaml {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is malformed, or
    /// a field has the wrong type.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
