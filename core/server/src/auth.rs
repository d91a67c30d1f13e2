//! Bearer-token authentication.
//!
//! Tokens are `<deviceId>:<hmacHex>`; verification recomputes the HMAC
//! under the shared secret and compares constant-time (see
//! `quillvault_common::token`). On success the device id rides along for
//! audit logging.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use quillvault_common::token;

use crate::error::ApiError;
use crate::state::AppState;

/// Extractor for required authentication; rejects with 401.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_id: String,
}

impl FromRequestParts<AppState> for DeviceIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        let device_id = token::verify_token(bearer, &state.secret)
            .map_err(|err| ApiError::unauthorized(err.to_string()))?;

        Ok(Self { device_id })
    }
}
