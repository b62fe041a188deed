use std::path::PathBuf;

use super::env::EnvConfig;
use super::validation;
use super::yaml::YamlConfig;
use super::{DEFAULT_OPENAI_BASE_URL, RelayConfig, ServerConfig, TlsConfig};
use crate::core::realtime::{DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL};
use crate::core::relay::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: u64 = 60;
const DEFAULT_OTP_EXPIRE_MINUTES: u64 = 30;
const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;
const DEFAULT_AUDIO_CAPTURE_DIR: &str = ".";

/// Raw storage values; validated into `Option<StorageConfig>`.
#[derive(Debug, Default)]
pub(crate) struct StorageParts {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub public_url: Option<String>,
}

/// Raw email values; validated into `Option<EmailConfig>`.
#[derive(Debug, Default)]
pub(crate) struct EmailParts {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
}

/// Merge environment values (base) with YAML overrides, apply defaults and
/// validate the result.
pub(crate) fn merge_config(
    env: EnvConfig,
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let tls_yaml = server.tls.unwrap_or_default();
    let openai = yaml.openai.unwrap_or_default();
    let relay = yaml.relay.unwrap_or_default();
    let auth = yaml.auth.unwrap_or_default();
    let storage = yaml.storage.unwrap_or_default();
    let email = yaml.email.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let tls = validation::validate_tls(
        tls_yaml.cert_path.or(env.tls_cert_path),
        tls_yaml.key_path.or(env.tls_key_path),
    )?
    .map(|(cert, key)| TlsConfig {
        cert_path: PathBuf::from(cert),
        key_path: PathBuf::from(key),
    });

    let relay = RelayConfig {
        max_message_bytes: validation::validate_max_message_bytes(
            relay.max_message_bytes.or(env.relay_max_message_bytes),
        )?,
        idle_timeout_seconds: validation::validate_idle_timeout(
            relay.idle_timeout_seconds.or(env.relay_idle_timeout_seconds),
        )?,
        close_timeout_seconds: relay
            .close_timeout_seconds
            .or(env.relay_close_timeout_seconds)
            .unwrap_or(DEFAULT_CLOSE_TIMEOUT.as_secs()),
        connect_timeout_seconds: relay
            .connect_timeout_seconds
            .or(env.relay_connect_timeout_seconds)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT.as_secs()),
    };

    let jwt_secret = validation::validate_jwt_secret(auth.jwt_secret.or(env.jwt_secret))?;

    let audio_capture_dir = PathBuf::from(
        storage
            .audio_capture_dir
            .or(env.audio_capture_dir)
            .unwrap_or_else(|| DEFAULT_AUDIO_CAPTURE_DIR.to_string()),
    );

    let storage = validation::validate_storage(StorageParts {
        bucket: storage.s3_bucket.or(env.storage_s3_bucket),
        region: storage.s3_region.or(env.storage_s3_region),
        endpoint: storage.s3_endpoint.or(env.storage_s3_endpoint),
        access_key: storage.s3_access_key.or(env.storage_s3_access_key),
        secret_key: storage.s3_secret_key.or(env.storage_s3_secret_key),
        public_url: storage.public_url.or(env.storage_public_url),
    })?;

    let email = validation::validate_email(EmailParts {
        api_url: email.api_url.or(env.email_api_url),
        api_key: email.api_key.or(env.email_api_key),
        from: email.from.or(env.email_from),
    })?;

    Ok(ServerConfig {
        host: server.host.or(env.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: server.port.or(env.port).unwrap_or(DEFAULT_PORT),
        tls,
        openai_api_key: openai.api_key.or(env.openai_api_key),
        openai_base_url: openai
            .base_url
            .or(env.openai_base_url)
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        openai_realtime_url: openai
            .realtime_url
            .or(env.openai_realtime_url)
            .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        openai_realtime_model: openai
            .realtime_model
            .or(env.openai_realtime_model)
            .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
        relay,
        jwt_secret,
        access_token_expire_minutes: auth
            .access_token_expire_minutes
            .or(env.access_token_expire_minutes)
            .unwrap_or(DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES),
        otp_expire_minutes: auth
            .otp_expire_minutes
            .or(env.otp_expire_minutes)
            .unwrap_or(DEFAULT_OTP_EXPIRE_MINUTES),
        auth_required: auth.required.or(env.auth_required).unwrap_or(true),
        storage,
        audio_capture_dir,
        email,
        cors_allowed_origins: security.cors_allowed_origins.or(env.cors_allowed_origins),
        rate_limit_requests_per_second: security
            .rate_limit_requests_per_second
            .or(env.rate_limit_requests_per_second)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
        rate_limit_burst_size: security
            .rate_limit_burst_size
            .or(env.rate_limit_burst_size)
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
        max_websocket_connections: security
            .max_websocket_connections
            .or(env.max_websocket_connections),
        max_connections_per_ip: security
            .max_connections_per_ip
            .or(env.max_connections_per_ip)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_IP),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{AuthYaml, RelayYaml, ServerYaml, StorageYaml};

    fn base_env() -> EnvConfig {
        EnvConfig {
            jwt_secret: Some("env-secret".to_string()),
            relay_max_message_bytes: Some(4096),
            ..Default::default()
        }
    }

    #[test]
    fn test_yaml_takes_priority() {
        let env = EnvConfig {
            port: Some(4000),
            ..base_env()
        };
        let yaml = YamlConfig {
            server: Some(ServerYaml {
                port: Some(5000),
                ..Default::default()
            }),
            relay: Some(RelayYaml {
                max_message_bytes: Some(8192),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(env, Some(yaml)).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.relay.max_message_bytes, 8192);
        assert_eq!(config.jwt_secret, "env-secret");
    }

    #[test]
    fn test_auth_required_from_yaml() {
        let yaml = YamlConfig {
            auth: Some(AuthYaml {
                required: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = merge_config(base_env(), Some(yaml)).unwrap();
        assert!(!config.auth_required);
    }

    #[test]
    fn test_audio_capture_dir() {
        let config = merge_config(base_env(), None).unwrap();
        assert_eq!(config.audio_capture_dir, PathBuf::from("."));

        let env = EnvConfig {
            audio_capture_dir: Some("/srv/env-captures".to_string()),
            ..base_env()
        };
        let config = merge_config(env, None).unwrap();
        assert_eq!(config.audio_capture_dir, PathBuf::from("/srv/env-captures"));

        let env = EnvConfig {
            audio_capture_dir: Some("/srv/env-captures".to_string()),
            ..base_env()
        };
        let yaml = YamlConfig {
            storage: Some(StorageYaml {
                audio_capture_dir: Some("/srv/yaml-captures".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = merge_config(env, Some(yaml)).unwrap();
        assert_eq!(config.audio_capture_dir, PathBuf::from("/srv/yaml-captures"));
    }

    #[test]
    fn test_tls_requires_both_paths() {
        let env = EnvConfig {
            tls_cert_path: Some("/tmp/cert.pem".to_string()),
            ..base_env()
        };
        assert!(merge_config(env, None).is_err());
    }

    #[test]
    fn test_complete_email_config() {
        let env = EnvConfig {
            email_api_url: Some("https://mail.example.com/send".to_string()),
            email_api_key: Some("key".to_string()),
            email_from: Some("no-reply@example.com".to_string()),
            ..base_env()
        };
        let config = merge_config(env, None).unwrap();
        assert_eq!(config.email.as_ref().unwrap().from, "no-reply@example.com");
    }
}
