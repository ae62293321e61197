//! Session tokens
//!
//! HS256 JWTs carrying the subject's security stamp. A token is valid while
//! `now < exp` (checked against the injected clock) and its stamp equals the
//! subject's current stamp. There is no revocation list: bumping the stamp
//! kills every token issued before it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::account::{AccountStore, Role};
use crate::clock::Clock;
use crate::config::ConfigHandle;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HMAC secret (at least 32 bytes outside development)
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    /// Security stamp at issue time
    pub stamp: i64,
    pub typ: TokenType,
    pub role: Role,
    /// Time of the last second-factor proof (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_at: Option<i64>,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require a second-factor proof no older than `max_age`
    pub fn ensure_step_up(&self, now: DateTime<Utc>, max_age: Duration) -> Result<(), EngineError> {
        match self.mfa_at {
            Some(at) if at <= now.timestamp() && now.timestamp() - at <= max_age.num_seconds() => {
                Ok(())
            }
            _ => Err(EngineError::StepUpRequired),
        }
    }
}

/// Caller-supplied claims for a new session
#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub role: Role,
    pub mfa_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct SessionIssuer {
    config: SessionConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    accounts: Arc<dyn AccountStore>,
    engine: ConfigHandle,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    pub fn new(
        config: SessionConfig,
        accounts: Arc<dyn AccountStore>,
        engine: ConfigHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
            accounts,
            engine,
            clock,
        }
    }

    /// Sign a token for the subject's current stamp
    pub async fn mint(
        &self,
        subject_id: &str,
        claims: &SessionClaims,
        typ: TokenType,
        ttl: Duration,
    ) -> Result<String, EngineError> {
        let stamp = self.current_stamp(subject_id).await?;
        let now = self.clock.now();
        let token_claims = Claims {
            sub: subject_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            stamp,
            typ,
            role: claims.role,
            mfa_at: claims.mfa_at.map(|t| t.timestamp()),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &token_claims, &self.encoding_key)
            .map_err(|e| EngineError::Internal(format!("token signing failed: {e}")))
    }

    /// Access and refresh token with the configured lifetimes
    pub async fn issue(
        &self,
        subject_id: &str,
        claims: &SessionClaims,
    ) -> Result<TokenPair, EngineError> {
        let config = self.engine.snapshot();
        let now = self.clock.now();
        let access_token = self
            .mint(subject_id, claims, TokenType::Access, config.access_token_ttl())
            .await?;
        let refresh_token = self
            .mint(subject_id, claims, TokenType::Refresh, config.refresh_token_ttl())
            .await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at: now + config.access_token_ttl(),
            refresh_expires_at: now + config.refresh_token_ttl(),
        })
    }

    /// Validate an access token
    pub async fn verify(&self, token: &str) -> Result<Claims, EngineError> {
        self.validate(token, TokenType::Access).await
    }

    /// Exchange a refresh token for a new pair
    ///
    /// The old refresh token stays valid until it expires or the stamp moves.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, EngineError> {
        let claims = self.validate(refresh_token, TokenType::Refresh).await?;
        let session = SessionClaims {
            role: claims.role,
            mfa_at: claims
                .mfa_at
                .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)),
        };
        tracing::debug!(subject = %claims.sub, "Session refreshed");
        self.issue(&claims.sub, &session).await
    }

    async fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, EngineError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);
        // Expiry is checked against the injected clock below
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => EngineError::TokenInvalid("invalid signature".into()),
                _ => EngineError::TokenInvalid(e.to_string()),
            })?
            .claims;

        if claims.typ != expected {
            return Err(EngineError::TokenInvalid(format!(
                "expected {expected:?} token"
            )));
        }
        if self.clock.now().timestamp() >= claims.exp {
            return Err(EngineError::SessionExpired);
        }

        let current = self
            .accounts
            .security_stamp(&claims.sub)
            .await
            .map_err(EngineError::Storage)?;
        if current != Some(claims.stamp) {
            tracing::debug!(subject = %claims.sub, "Token stamp no longer current");
            return Err(EngineError::SessionRevoked);
        }
        Ok(claims)
    }

    async fn current_stamp(&self, subject_id: &str) -> Result<i64, EngineError> {
        self.accounts
            .security_stamp(subject_id)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::SubjectNotFound(subject_id.to_string()))
    }
}
