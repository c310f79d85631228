//! Authentication and authorization module
//!
//! - Token issuance and validation (access and temp tokens)
//! - Principal directories for users and administrators
//! - The generic authentication service
//! - Second-factor delegation to external verifiers
//! - Middleware for request authentication

pub mod gateway;
pub mod jwt;
pub mod middleware;
pub mod principal;
pub mod service;

pub use gateway::{GatewayError, HttpSecondFactorGateway, SecondFactorGateway};
pub use jwt::{Claims, IssuedToken, SigningKey, TokenClass, TokenError, TokenIssuer};
pub use middleware::{require_admin, require_super_admin, require_user, BearerToken};
pub use principal::{AdminDirectory, PrincipalDirectory, UserDirectory};
pub use service::{AuthError, AuthService, LoginOutcome};
