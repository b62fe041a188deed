use super::merge::{EmailParts, StorageParts};
use super::{EmailConfig, StorageConfig};

/// The relay frame limit has no safe default and must be configured.
pub(crate) fn validate_max_message_bytes(
    value: Option<usize>,
) -> Result<usize, Box<dyn std::error::Error>> {
    match value {
        None => Err(
            "RELAY_MAX_MESSAGE_BYTES is required (relay.max_message_bytes in YAML)".into(),
        ),
        Some(0) => Err("RELAY_MAX_MESSAGE_BYTES must be greater than 0".into()),
        Some(bytes) => Ok(bytes),
    }
}

pub(crate) fn validate_idle_timeout(
    value: Option<u64>,
) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    match value {
        Some(0) => Err("RELAY_IDLE_TIMEOUT_SECONDS must be greater than 0 when set".into()),
        other => Ok(other),
    }
}

pub(crate) fn validate_jwt_secret(
    value: Option<String>,
) -> Result<String, Box<dyn std::error::Error>> {
    value.ok_or_else(|| "JWT_SECRET is required (auth.jwt_secret in YAML)".into())
}

/// TLS needs both the certificate and the key, or neither.
pub(crate) fn validate_tls(
    cert_path: Option<String>,
    key_path: Option<String>,
) -> Result<Option<(String, String)>, Box<dyn std::error::Error>> {
    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok(Some((cert, key))),
        (None, None) => Ok(None),
        _ => Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    }
}

/// Storage is optional, but once any part is given the bucket, region and
/// public URL must all be present.
pub(crate) fn validate_storage(
    parts: StorageParts,
) -> Result<Option<StorageConfig>, Box<dyn std::error::Error>> {
    let any_set = parts.bucket.is_some()
        || parts.region.is_some()
        || parts.endpoint.is_some()
        || parts.access_key.is_some()
        || parts.secret_key.is_some()
        || parts.public_url.is_some();
    if !any_set {
        return Ok(None);
    }

    match (parts.bucket, parts.region, parts.public_url) {
        (Some(bucket), Some(region), Some(public_url)) => Ok(Some(StorageConfig {
            bucket,
            region,
            endpoint: parts.endpoint,
            access_key: parts.access_key,
            secret_key: parts.secret_key,
            public_url: public_url.trim_end_matches('/').to_string(),
        })),
        _ => Err(
            "Incomplete storage configuration: STORAGE_S3_BUCKET, STORAGE_S3_REGION and \
             STORAGE_PUBLIC_URL are required together"
                .into(),
        ),
    }
}

pub(crate) fn validate_email(
    parts: EmailParts,
) -> Result<Option<EmailConfig>, Box<dyn std::error::Error>> {
    match (parts.api_url, parts.api_key, parts.from) {
        (None, None, None) => Ok(None),
        (Some(api_url), Some(api_key), Some(from)) => Ok(Some(EmailConfig {
            api_url,
            api_key,
            from,
        })),
        _ => Err(
            "Incomplete email configuration: EMAIL_API_URL, EMAIL_API_KEY and EMAIL_FROM \
             are required together"
                .into(),
        ),
    }
}
