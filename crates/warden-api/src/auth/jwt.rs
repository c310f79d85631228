//! JWT token generation and validation
//!
//! Two token classes share one HMAC-SHA256 key:
//! - access tokens, which grant resource access
//! - temp tokens, which only prove first-factor success and are exchanged
//!   at the second-factor endpoint
//!
//! Every token also carries the principal kind it was issued for, so a user
//! token is never accepted where an admin token is expected.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use warden_core::{AdminRole, AuthConfig, PrincipalKind};

/// Length of a generated signing secret, in bytes
const GENERATED_KEY_LEN: usize = 48;

/// Token class carried in the `typ` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenClass {
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "2fa")]
    SecondFactor,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - principal email
    pub sub: String,
    /// Principal id; an email can be handed to another account later
    pub uid: i64,
    /// JWT ID, unique per issued token
    pub jti: String,
    /// Issued at (Unix epoch seconds)
    pub iat: i64,
    /// Expiration (Unix epoch seconds)
    pub exp: i64,
    pub typ: TokenClass,
    pub kind: PrincipalKind,
    /// Admin role, present on admin access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AdminRole>,
}

/// Token validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token format")]
    Malformed,

    #[error("Token is not valid for this endpoint")]
    WrongClass,

    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

/// HMAC key material, built once at startup
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

impl SigningKey {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Random URL-safe secret
    pub fn generate() -> Self {
        let mut bytes = [0u8; GENERATED_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        Self::from_secret(&secret)
    }

    /// Use the configured secret, or generate one if none is set
    pub fn from_config(config: &AuthConfig) -> Self {
        match config.secret_key.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => Self::from_secret(secret),
            None => {
                tracing::warn!(
                    "SECRET_KEY not set; using a generated signing key. Tokens will not survive a restart"
                );
                Self::generate()
            }
        }
    }
}

/// A freshly signed token with its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// Issues and validates access and temp tokens
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: SigningKey,
    issuer: String,
    access_ttl: Duration,
    temp_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(key: SigningKey, config: &AuthConfig) -> Self {
        Self {
            key,
            issuer: config.issuer.clone(),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            temp_ttl: Duration::minutes(config.temp_token_expire_minutes),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue a full access token
    pub fn issue_access(
        &self,
        kind: PrincipalKind,
        id: i64,
        email: &str,
        role: Option<AdminRole>,
    ) -> Result<IssuedToken, TokenError> {
        self.issue(TokenClass::Access, kind, id, email, role, self.access_ttl)
    }

    /// Issue a temp token bridging the first and second factor
    pub fn issue_temp(
        &self,
        kind: PrincipalKind,
        id: i64,
        email: &str,
    ) -> Result<IssuedToken, TokenError> {
        self.issue(TokenClass::SecondFactor, kind, id, email, None, self.temp_ttl)
    }

    /// Validate an access token issued for `kind`
    pub fn verify_access(&self, kind: PrincipalKind, token: &str) -> Result<Claims, TokenError> {
        self.verify(TokenClass::Access, kind, token)
    }

    /// Validate a temp token issued for `kind`
    pub fn verify_temp(&self, kind: PrincipalKind, token: &str) -> Result<Claims, TokenError> {
        self.verify(TokenClass::SecondFactor, kind, token)
    }

    fn issue(
        &self,
        typ: TokenClass,
        kind: PrincipalKind,
        id: i64,
        email: &str,
        role: Option<AdminRole>,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: email.to_string(),
            uid: id,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            typ,
            kind,
            role,
        };

        Ok(IssuedToken {
            token: self.encode_claims(&claims)?,
            expires_at,
            expires_in: ttl.num_seconds(),
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.key.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn verify(
        &self,
        typ: TokenClass,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let claims = decode::<Claims>(token, &self.key.decoding, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })?
            .claims;

        if claims.typ != typ || claims.kind != kind {
            return Err(TokenError::WrongClass);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer_with(secret: &str) -> TokenIssuer {
        let config = AuthConfig {
            secret_key: Some(secret.to_string()),
            ..Default::default()
        };
        TokenIssuer::new(SigningKey::from_config(&config), &config)
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let issuer = issuer_with("test-secret");
        let issued = issuer
            .issue_access(PrincipalKind::Admin, 1, "root@example.com", Some(AdminRole::SuperAdmin))
            .unwrap();

        assert_eq!(issued.expires_in, 30 * 60);

        let claims = issuer
            .verify_access(PrincipalKind::Admin, &issued.token)
            .unwrap();
        assert_eq!(claims.sub, "root@example.com");
        assert_eq!(claims.uid, 1);
        assert_eq!(claims.iss, "warden");
        assert_eq!(claims.typ, TokenClass::Access);
        assert_eq!(claims.role, Some(AdminRole::SuperAdmin));
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn test_token_classes_do_not_cross() {
        let issuer = issuer_with("test-secret");
        let temp = issuer.issue_temp(PrincipalKind::User, 7, "a@example.com").unwrap();
        let access = issuer
            .issue_access(PrincipalKind::User, 7, "a@example.com", None)
            .unwrap();

        assert_eq!(
            issuer.verify_access(PrincipalKind::User, &temp.token).unwrap_err(),
            TokenError::WrongClass
        );
        assert_eq!(
            issuer.verify_temp(PrincipalKind::User, &access.token).unwrap_err(),
            TokenError::WrongClass
        );
        assert!(issuer.verify_temp(PrincipalKind::User, &temp.token).is_ok());
    }

    #[test]
    fn test_user_token_rejected_for_admin() {
        let issuer = issuer_with("test-secret");
        let access = issuer
            .issue_access(PrincipalKind::User, 7, "a@example.com", None)
            .unwrap();

        assert_eq!(
            issuer.verify_access(PrincipalKind::Admin, &access.token).unwrap_err(),
            TokenError::WrongClass
        );
    }

    #[test]
    fn test_temp_token_has_short_ttl_and_no_role() {
        let issuer = issuer_with("test-secret");
        let temp = issuer.issue_temp(PrincipalKind::Admin, 1, "root@example.com").unwrap();
        assert_eq!(temp.expires_in, 5 * 60);

        let claims = issuer.verify_temp(PrincipalKind::Admin, &temp.token).unwrap();
        assert_eq!(claims.role, None);
    }

    #[test]
    fn test_wrong_secret() {
        let token = issuer_with("secret1")
            .issue_access(PrincipalKind::User, 7, "a@example.com", None)
            .unwrap();

        let result = issuer_with("secret2").verify_access(PrincipalKind::User, &token.token);
        assert_eq!(result.unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn test_invalid_token() {
        let issuer = issuer_with("test-secret");
        assert_eq!(
            issuer.verify_access(PrincipalKind::User, "invalid.token.here").unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_expired_token() {
        let issuer = issuer_with("test-secret");
        let now = Utc::now().timestamp();

        // Expired one second ago; no leeway is granted
        let claims = Claims {
            iss: "warden".to_string(),
            sub: "a@example.com".to_string(),
            uid: 7,
            jti: Uuid::new_v4().to_string(),
            iat: now - 60,
            exp: now - 1,
            typ: TokenClass::Access,
            kind: PrincipalKind::User,
            role: None,
        };
        let token = issuer.encode_claims(&claims).unwrap();

        assert_eq!(
            issuer.verify_access(PrincipalKind::User, &token).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_generated_keys_differ() {
        let config = AuthConfig::default();
        let a = TokenIssuer::new(SigningKey::generate(), &config);
        let b = TokenIssuer::new(SigningKey::generate(), &config);

        let token = a.issue_access(PrincipalKind::User, 7, "a@example.com", None).unwrap();
        assert!(b.verify_access(PrincipalKind::User, &token.token).is_err());
    }

    #[test]
    fn test_claims_serialize_class_names() {
        let json = serde_json::to_value(TokenClass::SecondFactor).unwrap();
        assert_eq!(json, "2fa");
        let json = serde_json::to_value(TokenClass::Access).unwrap();
        assert_eq!(json, "access");
    }
}
