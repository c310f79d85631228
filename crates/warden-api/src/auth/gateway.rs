//! Second-factor gateway
//!
//! The second factor is not verified locally. Each principal with 2FA
//! enabled references an [`AuthProfile`](warden_core::AuthProfile) naming an
//! external verifier, and the gateway forwards `(username, password)` to it.
//!
//! Verifier contract: `POST <endpoint>` with JSON `{"username", "password"}`,
//! answered by `{"authenticated": bool, "message": string?}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use warden_core::AuthProfileStore;

/// Reasons a second-factor check did not succeed
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication profile {0} not found")]
    ProfileNotFound(i64),

    #[error("authentication profile is inactive")]
    ProfileInactive,

    #[error("{0}")]
    Rejected(String),

    /// Transport or decoding failure; the detail is logged, never returned
    #[error("verifier unavailable")]
    Unavailable,

    #[error("verifier timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Store(#[from] warden_core::StoreError),
}

/// External second-factor verification
#[async_trait]
pub trait SecondFactorGateway: Send + Sync {
    async fn verify(
        &self,
        profile_id: i64,
        username: &str,
        password: &str,
    ) -> Result<(), GatewayError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    authenticated: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Gateway posting credentials to the profile's HTTP endpoint
pub struct HttpSecondFactorGateway {
    client: reqwest::Client,
    profiles: Arc<dyn AuthProfileStore>,
}

impl HttpSecondFactorGateway {
    pub fn new(
        profiles: Arc<dyn AuthProfileStore>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client, profiles })
    }
}

#[async_trait]
impl SecondFactorGateway for HttpSecondFactorGateway {
    async fn verify(
        &self,
        profile_id: i64,
        username: &str,
        password: &str,
    ) -> Result<(), GatewayError> {
        let profile = self
            .profiles
            .find_auth_profile(profile_id)
            .await?
            .ok_or(GatewayError::ProfileNotFound(profile_id))?;

        if !profile.is_active {
            return Err(GatewayError::ProfileInactive);
        }

        tracing::debug!(profile = %profile.name, "Forwarding second factor to verifier");

        let response = self
            .client
            .post(&profile.endpoint)
            .json(&VerifyRequest { username, password })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    tracing::warn!(profile = %profile.name, error = %e, "Verifier request failed");
                    GatewayError::Unavailable
                }
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Rejected(format!(
                "verifier responded with {}",
                response.status()
            )));
        }

        let body: VerifyResponse = response.json().await.map_err(|e| {
            tracing::warn!(profile = %profile.name, error = %e, "Unreadable verifier response");
            GatewayError::Unavailable
        })?;

        if body.authenticated {
            Ok(())
        } else {
            Err(GatewayError::Rejected(
                body.message
                    .unwrap_or_else(|| "credentials rejected".to_string()),
            ))
        }
    }
}
