use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Raw values read from the environment, before defaults and YAML overrides.
#[derive(Debug, Default)]
pub(crate) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_realtime_url: Option<String>,
    pub openai_realtime_model: Option<String>,

    pub relay_max_message_bytes: Option<usize>,
    pub relay_idle_timeout_seconds: Option<u64>,
    pub relay_close_timeout_seconds: Option<u64>,
    pub relay_connect_timeout_seconds: Option<u64>,

    pub jwt_secret: Option<String>,
    pub access_token_expire_minutes: Option<u64>,
    pub otp_expire_minutes: Option<u64>,
    pub auth_required: Option<bool>,

    pub storage_s3_bucket: Option<String>,
    pub storage_s3_region: Option<String>,
    pub storage_s3_endpoint: Option<String>,
    pub storage_s3_access_key: Option<String>,
    pub storage_s3_secret_key: Option<String>,
    pub storage_public_url: Option<String>,
    pub audio_capture_dir: Option<String>,

    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: Option<String>,

    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: var("HOST"),
            port: parse("PORT")?,
            tls_cert_path: var("TLS_CERT_PATH"),
            tls_key_path: var("TLS_KEY_PATH"),

            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL"),
            openai_realtime_url: var("OPENAI_REALTIME_URL"),
            openai_realtime_model: var("OPENAI_REALTIME_MODEL"),

            relay_max_message_bytes: parse("RELAY_MAX_MESSAGE_BYTES")?,
            relay_idle_timeout_seconds: parse("RELAY_IDLE_TIMEOUT_SECONDS")?,
            relay_close_timeout_seconds: parse("RELAY_CLOSE_TIMEOUT_SECONDS")?,
            relay_connect_timeout_seconds: parse("RELAY_CONNECT_TIMEOUT_SECONDS")?,

            jwt_secret: var("JWT_SECRET"),
            access_token_expire_minutes: parse("ACCESS_TOKEN_EXPIRE_MINUTES")?,
            otp_expire_minutes: parse("OTP_EXPIRE_MINUTES")?,
            auth_required: parse_bool("AUTH_REQUIRED")?,

            storage_s3_bucket: var("STORAGE_S3_BUCKET"),
            storage_s3_region: var("STORAGE_S3_REGION"),
            storage_s3_endpoint: var("STORAGE_S3_ENDPOINT"),
            storage_s3_access_key: var("STORAGE_S3_ACCESS_KEY"),
            storage_s3_secret_key: var("STORAGE_S3_SECRET_KEY"),
            storage_public_url: var("STORAGE_PUBLIC_URL"),
            audio_capture_dir: var("AUDIO_CAPTURE_DIR"),

            email_api_url: var("EMAIL_API_URL"),
            email_api_key: var("EMAIL_API_KEY"),
            email_from: var("EMAIL_FROM"),

            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: parse("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            rate_limit_burst_size: parse("RATE_LIMIT_BURST_SIZE")?,
            max_websocket_connections: parse("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: parse("MAX_CONNECTIONS_PER_IP")?,
        })
    }
}

/// Read a variable, treating blank values as unset.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("Invalid value for {key}: '{raw}' ({e})"))
        })
        .transpose()
}

pub(crate) fn parse_bool_value(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_bool(key: &str) -> Result<Option<bool>, String> {
    var(key)
        .map(|raw| {
            parse_bool_value(&raw)
                .ok_or_else(|| format!("Invalid boolean for {key}: '{raw}'"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_value() {
        assert_eq!(parse_bool_value("true"), Some(true));
        assert_eq!(parse_bool_value(" YES "), Some(true));
        assert_eq!(parse_bool_value("0"), Some(false));
        assert_eq!(parse_bool_value("off"), Some(false));
        assert_eq!(parse_bool_value("maybe"), None);
    }
}
