//! Authentication service layer
//!
//! One state machine serves both principal kinds:
//!
//! ```text
//! UNVERIFIED -> FIRST_FACTOR_OK -> AUTHENTICATED
//!                              \-> AWAITING_SECOND_FACTOR -> AUTHENTICATED | REJECTED
//! ```
//!
//! Kind-specific behavior comes from the [`PrincipalDirectory`]: admins have
//! a session ledger, so their tokens are recorded at issuance, checked on
//! every request and deleted at logout. Users have none and their tokens
//! are purely stateless.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use warden_core::{PasswordHasher, Principal, PrincipalKind, StoreError};

use super::gateway::{GatewayError, SecondFactorGateway};
use super::jwt::{Claims, IssuedToken, TokenError, TokenIssuer};
use super::principal::PrincipalDirectory;

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    InvalidToken(#[source] TokenError),

    #[error("Session expired or invalid")]
    SessionInvalid,

    #[error("Could not validate credentials")]
    UnknownPrincipal,

    #[error("Inactive {0}")]
    Inactive(PrincipalKind),

    #[error("Second-factor authentication is not configured")]
    SecondFactorNotConfigured,

    #[error("Second-factor authentication failed: {0}")]
    SecondFactorFailed(String),

    #[error("Failed to issue token: {0}")]
    Issuance(#[source] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a first-factor login
#[derive(Debug, Clone)]
pub enum LoginOutcome<P> {
    /// No second factor required; the access token is ready
    Authenticated { principal: P, token: IssuedToken },
    /// Second factor required; exchange the temp token at verify-2fa
    SecondFactorRequired { principal: P, temp_token: IssuedToken },
}

/// Authentication service, generic over principal kind
pub struct AuthService<D> {
    directory: D,
    issuer: Arc<TokenIssuer>,
    hasher: Arc<PasswordHasher>,
    gateway: Arc<dyn SecondFactorGateway>,
    second_factor_timeout: Duration,
}

impl<D: PrincipalDirectory> AuthService<D> {
    pub fn new(
        directory: D,
        issuer: Arc<TokenIssuer>,
        hasher: Arc<PasswordHasher>,
        gateway: Arc<dyn SecondFactorGateway>,
        second_factor_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            issuer,
            hasher,
            gateway,
            second_factor_timeout,
        }
    }

    fn kind() -> PrincipalKind {
        <D::Principal as Principal>::KIND
    }

    /// Verify the first factor.
    ///
    /// An unknown email and a wrong password produce the same error.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome<D::Principal>, AuthError> {
        let principal = match self.directory.find_by_email(email).await? {
            Some(p) if self.hasher.verify(password, p.password_hash()) => p,
            _ => {
                tracing::warn!(kind = %Self::kind(), "Rejected login attempt");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !principal.is_active() {
            tracing::warn!(kind = %Self::kind(), id = principal.id(), "Login by inactive principal");
            return Err(AuthError::Inactive(Self::kind()));
        }

        if self.hasher.needs_rehash(principal.password_hash()) {
            tracing::info!(
                kind = %Self::kind(),
                id = principal.id(),
                "Stored password hash uses a different scheme than configured"
            );
        }

        if principal.second_factor_profile().is_some() {
            let temp_token = self
                .issuer
                .issue_temp(Self::kind(), principal.id(), principal.email())
                .map_err(AuthError::Issuance)?;
            tracing::info!(kind = %Self::kind(), id = principal.id(), "Second factor required");
            return Ok(LoginOutcome::SecondFactorRequired {
                principal,
                temp_token,
            });
        }

        let token = self.grant(&principal).await?;
        tracing::info!(kind = %Self::kind(), id = principal.id(), "Login succeeded");
        Ok(LoginOutcome::Authenticated { principal, token })
    }

    /// Exchange a temp token and a second-factor password for an access token.
    ///
    /// The first-factor password is not checked again; holding a valid temp
    /// token is the proof of it.
    pub async fn verify_second_factor(
        &self,
        temp_token: &str,
        password: &str,
    ) -> Result<(D::Principal, IssuedToken), AuthError> {
        let claims = self
            .issuer
            .verify_temp(Self::kind(), temp_token)
            .map_err(AuthError::InvalidToken)?;

        let principal = self.resolve(&claims).await?;

        let profile_id = principal
            .second_factor_profile()
            .ok_or(AuthError::SecondFactorNotConfigured)?;

        if !principal.is_active() {
            return Err(AuthError::Inactive(Self::kind()));
        }

        let check = self
            .gateway
            .verify(profile_id, principal.username(), password);
        match tokio::time::timeout(self.second_factor_timeout, check).await {
            Ok(Ok(())) => {}
            Ok(Err(GatewayError::Store(e))) => return Err(e.into()),
            Ok(Err(e)) => {
                tracing::warn!(kind = %Self::kind(), id = principal.id(), error = %e, "Second factor rejected");
                return Err(AuthError::SecondFactorFailed(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(kind = %Self::kind(), id = principal.id(), "Second factor timed out");
                return Err(AuthError::SecondFactorFailed(
                    GatewayError::Timeout.to_string(),
                ));
            }
        }

        let token = self.grant(&principal).await?;
        tracing::info!(kind = %Self::kind(), id = principal.id(), "Second factor verified");
        Ok((principal, token))
    }

    /// End the session behind `token`. Idempotent; a no-op for stateless kinds.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if let Some(ledger) = self.directory.sessions() {
            let removed = ledger.delete_session(token).await?;
            tracing::info!(kind = %Self::kind(), removed, "Logout");
        }
        Ok(())
    }

    /// End every session of `principal`; returns how many were removed
    pub async fn logout_everywhere(&self, principal: &D::Principal) -> Result<u64, AuthError> {
        match self.directory.sessions() {
            Some(ledger) => {
                let removed = ledger.delete_sessions_for(principal.id()).await?;
                tracing::info!(kind = %Self::kind(), id = principal.id(), removed, "Logged out everywhere");
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    /// Resolve a bearer token to an active principal
    pub async fn authenticate(&self, token: &str) -> Result<D::Principal, AuthError> {
        let claims = self
            .issuer
            .verify_access(Self::kind(), token)
            .map_err(AuthError::InvalidToken)?;

        let session = match self.directory.sessions() {
            Some(ledger) => Some(
                ledger
                    .find_valid_session(token)
                    .await?
                    .ok_or(AuthError::SessionInvalid)?,
            ),
            None => None,
        };

        let principal = self.resolve(&claims).await?;

        if session.is_some_and(|s| s.admin_id != principal.id()) {
            return Err(AuthError::SessionInvalid);
        }

        if !principal.is_active() {
            return Err(AuthError::Inactive(Self::kind()));
        }
        Ok(principal)
    }

    /// Look up the token's subject; the id must still match the email's owner
    async fn resolve(&self, claims: &Claims) -> Result<D::Principal, AuthError> {
        self.directory
            .find_by_email(&claims.sub)
            .await?
            .filter(|p| p.id() == claims.uid)
            .ok_or(AuthError::UnknownPrincipal)
    }

    async fn grant(&self, principal: &D::Principal) -> Result<IssuedToken, AuthError> {
        let issued = self
            .issuer
            .issue_access(
                Self::kind(),
                principal.id(),
                principal.email(),
                principal.role(),
            )
            .map_err(AuthError::Issuance)?;

        if let Some(ledger) = self.directory.sessions() {
            ledger
                .create_session(principal.id(), &issued.token, self.issuer.access_ttl())
                .await?;
        }
        Ok(issued)
    }
}
