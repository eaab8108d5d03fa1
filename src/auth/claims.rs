//! Token decoding
//!
//! Tokens are JWTs issued by the auth endpoint. The client never verifies the
//! signature; it only reads the payload to learn who is signed in and when the
//! token stops being usable.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("token has no expiry claim")]
    MissingExpiry,
    #[error("invalid timestamp in `{0}` claim")]
    InvalidTimestamp(&'static str),
}

/// Decoded claims of a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier (`sub`, or the backend's `id` claim)
    pub subject: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            display_name: self.username.clone(),
            contact: self.email.clone(),
        }
    }
}

/// User-facing projection of the claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub display_name: Option<String>,
    pub contact: Option<String>,
}

/// A raw token together with its decoded claims
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    raw: String,
    claims: Claims,
}

impl Credential {
    /// Decode a raw token into a credential
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let claims = decode(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn identity(&self) -> Identity {
        self.claims.identity()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(&self.claims, now)
    }
}

// The raw token is a bearer secret; keep it out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("raw", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iat: Option<Value>,
    #[serde(default)]
    exp: Option<Value>,
}

/// Decode the payload of a JWT. Pure: no clock, no I/O.
pub fn decode(raw: &str) -> Result<Claims, DecodeError> {
    // JWT format: header.payload.signature
    let mut parts = raw.trim().split('.');
    let payload_b64 = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => p,
        _ => return Err(DecodeError::InvalidFormat),
    };

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))?;
    let raw_claims: RawClaims = serde_json::from_slice(&payload_bytes)?;

    let expires_at = match raw_claims.exp {
        Some(value) => timestamp(&value).ok_or(DecodeError::InvalidTimestamp("exp"))?,
        None => return Err(DecodeError::MissingExpiry),
    };
    let issued_at = match raw_claims.iat {
        Some(value) => Some(timestamp(&value).ok_or(DecodeError::InvalidTimestamp("iat"))?),
        None => None,
    };

    Ok(Claims {
        subject: raw_claims
            .sub
            .or(raw_claims.id)
            .and_then(|v| subject_string(&v)),
        username: raw_claims.username,
        email: raw_claims.email,
        issued_at,
        expires_at,
    })
}

/// A credential is usable only while its expiry is strictly in the future
pub fn is_expired(claims: &Claims, now: DateTime<Utc>) -> bool {
    claims.expires_at <= now
}

#[allow(clippy::cast_possible_truncation)] // Fractional seconds are floored on purpose
fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let secs = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))?;
    DateTime::from_timestamp(secs, 0)
}

fn subject_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
