//! Access token claims.
//!
//! The client never verifies token signatures; that is the backend's job.
//! It only decodes the payload segment to read identity, role and expiry.
//! Every reader fails closed: a token that does not decode, or that lacks
//! `user_id`, `email`, `role` or `exp`, counts as no token at all.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use learnhub_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::ClaimsError;
use crate::role::Role;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessClaims {
    /// Backend account ID.
    pub user_id: UserId,
    /// Account email.
    pub email: String,
    /// Account role.
    pub role: Role,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issued-at, seconds since the epoch.
    #[serde(rename = "iat", skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    /// Expiry, seconds since the epoch.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// Payload as it appears on the wire; everything optional so that missing
/// claims are reported by name instead of as a generic serde error.
#[derive(Deserialize)]
struct RawClaims {
    user_id: Option<UserId>,
    email: Option<String>,
    role: Option<String>,
    name: Option<String>,
    iat: Option<i64>,
    exp: Option<i64>,
}

impl AccessClaims {
    /// Decodes the payload of a JWT without verifying its signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a three-segment JWT, the payload
    /// is not base64url JSON, or a required claim is missing.
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let mut segments = token.trim().split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(ClaimsError::MalformedToken);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ClaimsError::InvalidEncoding {
                reason: e.to_string(),
            })?;

        let raw: RawClaims =
            serde_json::from_slice(&bytes).map_err(|e| ClaimsError::InvalidPayload {
                reason: e.to_string(),
            })?;

        let user_id = raw
            .user_id
            .ok_or(ClaimsError::MissingClaim { claim: "user_id" })?;
        let email = raw
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(ClaimsError::MissingClaim { claim: "email" })?;
        let role = raw
            .role
            .ok_or(ClaimsError::MissingClaim { claim: "role" })?
            .parse::<Role>()
            .map_err(|e| ClaimsError::InvalidPayload {
                reason: e.to_string(),
            })?;
        let expires_at = raw.exp.ok_or(ClaimsError::MissingClaim { claim: "exp" })?;

        Ok(Self {
            user_id,
            email,
            role,
            name: raw.name,
            issued_at: raw.iat,
            expires_at,
        })
    }

    /// Decodes a token, mapping every failure to `None`.
    #[must_use]
    pub fn read(token: &str) -> Option<Self> {
        match Self::decode(token) {
            Ok(claims) => Some(claims),
            Err(err) => {
                tracing::debug!(error = %err, "access token did not decode");
                None
            }
        }
    }

    /// Seconds left before expiry at `now`; negative once expired.
    ///
    /// Saturates, so an `exp` at the edge of the `i64` range still reads as
    /// long expired (or far off) instead of wrapping.
    #[must_use]
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at.saturating_sub(now.timestamp())
    }

    /// Returns true while `now` is strictly before expiry.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.seconds_remaining(now) > 0
    }

    /// Returns true while `now` is strictly before `expiry - tolerance`.
    #[must_use]
    pub fn is_valid_with_tolerance(&self, now: DateTime<Utc>, tolerance: Duration) -> bool {
        self.seconds_remaining(now) > tolerance.num_seconds()
    }

    /// Returns the expiry as a timestamp, if representable.
    #[must_use]
    pub fn expires_at_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// Encodes the claims as an unsigned (`alg: none`) token.
    ///
    /// The backend never accepts these. They exist for fixtures and local
    /// stubs that exercise the decoding side.
    #[must_use]
    pub fn to_unsigned_token(&self) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = serde_json::to_vec(self).unwrap_or_default();
        format!("{header}.{}.unsigned", URL_SAFE_NO_PAD.encode(payload))
    }
}
