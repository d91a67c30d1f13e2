//! Device token construction and verification.
//!
//! A device authenticates with `<deviceId>:<hmacHex>` where `hmacHex` is the
//! lowercase hex HMAC-SHA-256 of the device id under the shared secret.
//! There is no per-device state on the server; rotating the secret revokes
//! every outstanding token at once.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase hex HMAC for a device id.
pub fn device_hmac(device_id: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(device_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build the bearer token for a device.
pub fn device_token(device_id: &str, secret: &str) -> String {
    format!("{device_id}:{}", device_hmac(device_id, secret))
}

/// Split a token at the first `:` into (device id, provided hmac).
pub fn split_token(token: &str) -> Option<(&str, &str)> {
    token.split_once(':')
}

/// Verify a bearer token and return the device id it names.
///
/// The comparison is constant-time over the hex digests; a length mismatch
/// rejects immediately, which leaks nothing an attacker does not already
/// know (the digest length is public).
pub fn verify_token(token: &str, secret: &str) -> Result<String> {
    let (device_id, provided) = split_token(token)
        .ok_or_else(|| Error::Auth("invalid token format".to_string()))?;

    let expected = device_hmac(device_id, secret);
    let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
    if !matches {
        return Err(Error::Auth("invalid device token".to_string()));
    }

    Ok(device_id.to_string())
}
