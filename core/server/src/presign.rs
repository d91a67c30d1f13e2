//! Presigned transfer URLs.
//!
//! A presigned URL grants exactly one operation (PUT or GET) on one
//! `vault/` key until it expires. The signature covers method, key, and
//! expiry under a key derived from the shared secret; only the service can
//! mint one.

use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use quillvault_common::protocol::{PresignedUrlResponse, PRESIGNED_URL_EXPIRY_SECS};
use quillvault_common::{Error, Result, FILES_PREFIX};

type HmacSha256 = Hmac<Sha256>;

/// Percent-encode everything in a key except unreserved chars and `/`.
const KEY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Issues and verifies presigned URLs.
pub struct Presigner {
    signing_key: Vec<u8>,
    base_url: String,
}

impl Presigner {
    /// Derive the signing key from the shared secret and remember the base
    /// URL links are issued under.
    pub fn new(secret: &str, base_url: &str) -> Self {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(b"quillvault-url-signing");
        Self {
            signing_key: mac.finalize().into_bytes().to_vec(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Sign an operation on a key, expiring after the standard lifetime.
    pub fn sign(&self, method: &str, key: &str) -> Result<PresignedUrlResponse> {
        self.sign_at(method, key, Utc::now().timestamp() + PRESIGNED_URL_EXPIRY_SECS)
    }

    /// Sign with an explicit expiry timestamp.
    pub fn sign_at(&self, method: &str, key: &str, expires: i64) -> Result<PresignedUrlResponse> {
        if !key.starts_with(FILES_PREFIX) {
            return Err(Error::InvalidInput(format!(
                "only file objects are signable: {key}"
            )));
        }

        let sig = self.signature(method, key, expires);
        let encoded = utf8_percent_encode(key, KEY_ENCODE);
        Ok(PresignedUrlResponse {
            url: format!(
                "{}/objects/{encoded}?expires={expires}&sig={sig}",
                self.base_url
            ),
            expires_at: Utc.timestamp_opt(expires, 0).single().unwrap_or_else(Utc::now),
        })
    }

    /// Verify a presigned request.
    ///
    /// # Errors
    /// `Error::Auth` for an unsignable key, an expired URL, or a signature
    /// mismatch; the comparison is constant-time.
    pub fn verify(&self, method: &str, key: &str, expires: i64, sig: &str) -> Result<()> {
        if !key.starts_with(FILES_PREFIX) {
            return Err(Error::Auth(format!("key is not signable: {key}")));
        }
        if expires < Utc::now().timestamp() {
            return Err(Error::Auth("presigned URL expired".to_string()));
        }

        let expected = self.signature(method, key, expires);
        let matches: bool = expected.as_bytes().ct_eq(sig.as_bytes()).into();
        if !matches {
            return Err(Error::Auth("presigned URL signature mismatch".to_string()));
        }
        Ok(())
    }

    fn signature(&self, method: &str, key: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC accepts keys of any length");
        mac.update(method.as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
