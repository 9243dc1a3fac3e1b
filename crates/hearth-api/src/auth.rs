//! Bearer credential verification for live connections and the REST API.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use hearth_core::{AuthRejection, Error, Result, RevocationStore, UserId};

/// JWT claims carried by hearth bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a decimal string.
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// HS256 signer and verifier.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::default(),
        }
    }

    /// Build from `JWT_SECRET`. The secret is required.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("JWT_SECRET must be set".to_string()))?;
        Ok(Self::new(secret.as_bytes()))
    }

    /// Sign a token for `subject` valid for `ttl`.
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: subject.to_string(),
            exp: now + ttl.as_secs(),
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Token signing failed: {e}")))
    }

    /// Check signature and expiry.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

/// A verified identity bound to a connection or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    token: String,
}

impl AuthenticatedUser {
    /// The raw bearer token, kept so it can be revoked on logout.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Time left until the token expires; never less than one second.
    pub fn remaining_ttl(&self) -> Duration {
        let secs = (self.expires_at - Utc::now()).num_seconds().max(1);
        Duration::from_secs(secs as u64)
    }
}

/// Extract the credential from an `Authorization: Bearer <token>` value.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let value = authorization?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Gatekeeper for new connections and API requests.
#[derive(Clone)]
pub struct ConnectionAuthenticator {
    verifier: TokenVerifier,
    revocations: Arc<dyn RevocationStore>,
}

impl ConnectionAuthenticator {
    pub fn new(verifier: TokenVerifier, revocations: Arc<dyn RevocationStore>) -> Self {
        Self {
            verifier,
            revocations,
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn revocations(&self) -> &Arc<dyn RevocationStore> {
        &self.revocations
    }

    /// Verify an `Authorization` value.
    ///
    /// Rejections come back as [`Error::Auth`]. When the revocation list
    /// cannot be consulted the error is internal and the caller must refuse
    /// the connection anyway.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthenticatedUser> {
        let token = bearer_token(authorization).ok_or(AuthRejection::TokenMissing)?;

        let revoked = self.revocations.is_blacklisted(token).await.map_err(|e| {
            error!(
                subsystem = "auth",
                component = "authenticator",
                error = %e,
                "Revocation check failed, refusing credential"
            );
            Error::Internal(format!("revocation check failed: {e}"))
        })?;
        if revoked {
            return Err(AuthRejection::TokenBlacklisted.into());
        }

        let claims = self.verifier.verify(token).map_err(|e| {
            debug!(subsystem = "auth", component = "authenticator", error = %e, "Token rejected");
            AuthRejection::TokenInvalid
        })?;

        let user_id: UserId = claims
            .sub
            .parse()
            .map_err(|_| AuthRejection::InvalidSubjectFormat)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .ok_or(AuthRejection::TokenInvalid)?;

        Ok(AuthenticatedUser {
            user_id,
            expires_at,
            token: token.to_string(),
        })
    }
}
