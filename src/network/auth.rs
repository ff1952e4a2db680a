//! Authentication
//!
//! Validates bearer tokens from external auth providers (Firebase, Auth0,
//! Supabase, etc.) and resolves them to a [`ResolvedUser`]. The server does
//! NOT issue tokens, only validates them. [`AuthProvider`] is the narrow seam
//! the rest of the server depends on; [`JwtAuthProvider`] is the one
//! production adapter.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::game::state::PlayerId;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If `None`, any issuer is accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If `None`, any audience is accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format (preferred for external providers).
    pub public_key_pem: Option<String>,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Whether to skip expiry validation. Test-only.
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Whether enough material is present to validate a token at all.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Standard JWT claims expected from external auth providers, plus the two
/// optional custom claims ("name", "rating") used to avoid a repository
/// round-trip on every connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id from the auth provider.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued-at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Display name, if the provider embeds one.
    #[serde(default)]
    pub name: Option<String>,
    /// Matchmaking rating, if the provider embeds one.
    #[serde(default)]
    pub rating: Option<i32>,
}

impl TokenClaims {
    /// Derive a deterministic [`PlayerId`] from the subject claim via SHA-256.
    pub fn player_id(&self) -> PlayerId {
        let mut hasher = Sha256::new();
        hasher.update(b"skirmish-arena-player:");
        hasher.update(self.sub.as_bytes());
        let hash = hasher.finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        PlayerId::new(id)
    }
}

/// A token resolved to a concrete, matchmaking-ready identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    /// Stable identity, used as the player id for the match this user joins.
    pub user_id: PlayerId,
    /// Display name shown to other players.
    pub display_name: String,
    /// Matchmaking rating, used to seed the queue ticket.
    pub rating: i32,
}

/// Default rating assigned when neither the token nor a fallback provides one.
pub const DEFAULT_RATING: i32 = 1000;

/// Authentication errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No authentication configured on the server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match the expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match the expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Generic decode error.
    #[error("decode error: {0}")]
    DecodeError(String),
    /// The resolved user is banned from matchmaking.
    #[error("user is banned")]
    Banned,
}

/// Resolves a bearer token to a [`ResolvedUser`]. The one seam transport code
/// depends on; swap [`JwtAuthProvider`] for a test double that returns fixed
/// users without touching anything downstream.
pub trait AuthProvider: Send + Sync {
    /// Validate `token` and resolve it to a user. Synchronous: validation is
    /// pure CPU work once the signing key is loaded, no network call.
    fn authenticate(&self, token: &str) -> Result<ResolvedUser, AuthError>;
}

/// Production [`AuthProvider`] backed by JWT validation.
#[derive(Clone, Debug)]
pub struct JwtAuthProvider {
    config: AuthConfig,
}

impl JwtAuthProvider {
    /// Build a provider from a resolved config.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }
}

impl AuthProvider for JwtAuthProvider {
    fn authenticate(&self, token: &str) -> Result<ResolvedUser, AuthError> {
        let claims = validate_token(token, &self.config)?;
        Ok(ResolvedUser {
            user_id: claims.player_id(),
            display_name: claims.name.clone().unwrap_or_else(|| claims.sub.clone()),
            rating: claims.rating.unwrap_or(DEFAULT_RATING),
        })
    }
}

/// Validate a JWT and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    let algorithm = if config.public_key_pem.is_some() { Algorithm::RS256 } else { Algorithm::HS256 };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_token(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, claims, &key).unwrap()
    }

    fn test_claims() -> TokenClaims {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        TokenClaims {
            sub: "user123".into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("test-audience")),
            name: Some("Player One".into()),
            rating: Some(1200),
        }
    }

    #[test]
    fn valid_token_resolves_to_user() {
        let secret = "test-secret-key-256-bits-long!!";
        let claims = test_claims();
        let token = create_test_token(&claims, secret);
        let provider = JwtAuthProvider::new(AuthConfig { secret: Some(secret.into()), ..Default::default() });

        let user = provider.authenticate(&token).unwrap();
        assert_eq!(user.display_name, "Player One");
        assert_eq!(user.rating, 1200);
    }

    #[test]
    fn missing_custom_claims_fall_back_to_defaults() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims();
        claims.name = None;
        claims.rating = None;
        let token = create_test_token(&claims, secret);
        let provider = JwtAuthProvider::new(AuthConfig { secret: Some(secret.into()), ..Default::default() });

        let user = provider.authenticate(&token).unwrap();
        assert_eq!(user.display_name, "user123");
        assert_eq!(user.rating, DEFAULT_RATING);
    }

    #[test]
    fn expired_token_rejected() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims();
        claims.exp = 1;
        let token = create_test_token(&claims, secret);
        let config = AuthConfig { secret: Some(secret.into()), ..Default::default() };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn invalid_signature_rejected() {
        let claims = test_claims();
        let token = create_test_token(&claims, "correct-secret-key-here!!!!!");
        let config = AuthConfig { secret: Some("wrong-secret-key-here!!!!!!".into()), ..Default::default() };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn missing_sub_rejected() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims();
        claims.sub = String::new();
        let token = create_test_token(&claims, secret);
        let config = AuthConfig { secret: Some(secret.into()), ..Default::default() };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn issuer_mismatch_rejected() {
        let secret = "test-secret-key-256-bits-long!!";
        let claims = test_claims();
        let token = create_test_token(&claims, secret);
        let config =
            AuthConfig { secret: Some(secret.into()), issuer: Some("wrong-issuer".into()), ..Default::default() };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn player_id_is_stable_per_subject() {
        let claims =
            TokenClaims { sub: "user123".into(), exp: 0, iat: 0, iss: None, aud: None, name: None, rating: None };
        let id1 = claims.player_id();
        let id2 = claims.player_id();
        assert_eq!(id1, id2);

        let other = TokenClaims { sub: "user456".into(), ..claims };
        assert_ne!(id1, other.player_id());
    }

    #[test]
    fn not_configured_rejected() {
        let provider = JwtAuthProvider::new(AuthConfig::default());
        let result = provider.authenticate("some.jwt.token");
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn skip_expiry_allows_expired_token() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims();
        claims.exp = 1;
        let token = create_test_token(&claims, secret);
        let config = AuthConfig { secret: Some(secret.into()), skip_expiry: true, ..Default::default() };

        assert!(validate_token(&token, &config).is_ok());
    }
}
