//! Salted password hashing.
//!
//! PBKDF2 with HMAC-SHA256 (single 32-byte block), encoded as
//! `v1$<rounds>$<salt-hex>$<digest-hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::errors::auth_error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_ROUNDS: u32 = 20_000;
pub const MIN_PASSWORD_LEN: usize = 8;

const SCHEME: &str = "v1";
const MAX_ROUNDS: u32 = 1_000_000;

pub fn hash_password(password: &str) -> AuthResult<String> {
    hash_password_with_rounds(password, DEFAULT_ROUNDS)
}

pub fn hash_password_with_rounds(password: &str, rounds: u32) -> AuthResult<String> {
    let salt = *Uuid::new_v4().as_bytes();
    let digest = derive(password.as_bytes(), &salt, rounds.max(1))?;
    Ok(format!(
        "{SCHEME}${}${}${}",
        rounds.max(1),
        hex::encode(salt),
        hex::encode(digest)
    ))
}

/// `false` for a wrong password or a malformed hash.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(rounds), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    if rounds == 0 || rounds > MAX_ROUNDS {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };

    match derive(password.as_bytes(), &salt, rounds) {
        Ok(actual) => actual.as_slice().ct_eq(expected.as_slice()).into(),
        Err(_) => false,
    }
}

fn derive(password: &[u8], salt: &[u8], rounds: u32) -> AuthResult<[u8; 32]> {
    let prf = HmacSha256::new_from_slice(password)
        .map_err(|e| AuthError::ConfigError(format!("HMAC key rejected: {e}")))?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut block: [u8; 32] = mac.finalize().into_bytes().into();
    let mut output = block;

    for _ in 1..rounds {
        let mut mac = prf.clone();
        mac.update(&block);
        block = mac.finalize().into_bytes().into();
        for (out, b) in output.iter_mut().zip(block.iter()) {
            *out ^= b;
        }
    }
    Ok(output)
}
