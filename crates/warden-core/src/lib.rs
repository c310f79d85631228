//! Warden Core - Domain models, storage traits and guard rules
//!
//! This crate defines the pieces of the authentication core that do not
//! depend on HTTP:
//! - Principal models (users, administrators) and session records
//! - Salted password hashing
//! - Super-admin invariant rules
//! - Credential store and session ledger traits with in-memory and
//!   PostgreSQL backends
//! - Configuration management

pub mod config;
pub mod guard;
pub mod password;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, SecondFactorConfig,
    ServerConfig, StorageBackend,
};
pub use guard::GuardViolation;
pub use password::{PasswordConfig, PasswordError, PasswordHasher, PasswordScheme};
pub use store::{
    AdminStore, AuthProfileStore, MemoryStore, PgStore, SessionLedger, StoreError, StoreResult,
    UniqueField, UserStore,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Principals
// ============================================================================

/// Which population a principal belongs to.
///
/// Users and admins live in separate tables and have separate uniqueness
/// domains, so the same email may exist once in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Admin,
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Administrator role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    #[default]
    Admin,
    SuperAdmin,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl std::fmt::Display for AdminRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown admin role: {other}")),
        }
    }
}

/// Capabilities the auth flow needs from any principal record.
///
/// Implemented by [`User`] and [`Admin`]; the HTTP layer's generic auth
/// service only ever talks to principals through this trait.
pub trait Principal: Clone + Send + Sync + 'static {
    /// Population this record type belongs to
    const KIND: PrincipalKind;

    fn id(&self) -> i64;
    fn email(&self) -> &str;
    fn username(&self) -> &str;
    fn password_hash(&self) -> &str;
    fn is_active(&self) -> bool;

    /// Role carried by the principal, `None` for kinds without roles
    fn role(&self) -> Option<AdminRole>;

    fn second_factor_enabled(&self) -> bool;
    fn auth_profile_id(&self) -> Option<i64>;

    /// Profile to verify against when a second factor is actually required.
    ///
    /// The flag alone is not enough: a principal with `enable_2fa` set but no
    /// profile assigned logs in with the first factor only.
    fn second_factor_profile(&self) -> Option<i64> {
        if self.second_factor_enabled() {
            self.auth_profile_id()
        } else {
            None
        }
    }
}

/// Ordinary user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub enable_2fa: bool,
    pub auth_profile_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Principal for User {
    const KIND: PrincipalKind = PrincipalKind::User;

    fn id(&self) -> i64 {
        self.id
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn password_hash(&self) -> &str {
        &self.password_hash
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn role(&self) -> Option<AdminRole> {
        None
    }

    fn second_factor_enabled(&self) -> bool {
        self.enable_2fa
    }

    fn auth_profile_id(&self) -> Option<i64> {
        self.auth_profile_id
    }
}

/// Administrator account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub enable_2fa: bool,
    pub auth_profile_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Admin {
    /// Active super admins are the ones the invariant counts
    pub fn is_active_super_admin(&self) -> bool {
        self.is_active && self.role == AdminRole::SuperAdmin
    }
}

impl Principal for Admin {
    const KIND: PrincipalKind = PrincipalKind::Admin;

    fn id(&self) -> i64 {
        self.id
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn password_hash(&self) -> &str {
        &self.password_hash
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn role(&self) -> Option<AdminRole> {
        Some(self.role)
    }

    fn second_factor_enabled(&self) -> bool {
        self.enable_2fa
    }

    fn auth_profile_id(&self) -> Option<i64> {
        self.auth_profile_id
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Data for a new user; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// Self-service profile changes
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
}

/// Data for a new administrator; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: AdminRole,
}

/// Partial administrator update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct AdminChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub role: Option<AdminRole>,
    pub is_active: Option<bool>,
}

impl AdminChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.username.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }
}

/// Second-factor settings applied to a principal.
///
/// When `enable_2fa` is false the stored profile reference is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondFactorSettings {
    pub enable_2fa: bool,
    pub auth_profile_id: Option<i64>,
}

impl SecondFactorSettings {
    pub fn disabled() -> Self {
        Self {
            enable_2fa: false,
            auth_profile_id: None,
        }
    }

    /// Profile reference as it should be persisted
    pub fn stored_profile(&self) -> Option<i64> {
        if self.enable_2fa {
            self.auth_profile_id
        } else {
            None
        }
    }
}

// ============================================================================
// Sessions and authentication profiles
// ============================================================================

/// Server-side record binding an issued admin token to its owner and expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub admin_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// External verifier a second factor is delegated to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProfile {
    pub id: i64,
    pub name: String,
    pub endpoint: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuthProfile {
    pub name: String,
    pub endpoint: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(role: AdminRole, is_active: bool) -> Admin {
        Admin {
            id: 1,
            email: "root@example.com".to_string(),
            username: "root".to_string(),
            password_hash: String::new(),
            role,
            is_active,
            enable_2fa: false,
            auth_profile_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_admin_role_round_trips_through_str() {
        for role in [AdminRole::Admin, AdminRole::SuperAdmin] {
            assert_eq!(role.as_str().parse::<AdminRole>().unwrap(), role);
        }
        assert!("owner".parse::<AdminRole>().is_err());
    }

    #[test]
    fn test_admin_role_serde_uses_snake_case() {
        let json = serde_json::to_string(&AdminRole::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
    }

    #[test]
    fn test_second_factor_requires_profile() {
        let mut a = admin(AdminRole::Admin, true);
        a.enable_2fa = true;
        assert_eq!(a.second_factor_profile(), None);

        a.auth_profile_id = Some(7);
        assert_eq!(a.second_factor_profile(), Some(7));

        a.enable_2fa = false;
        assert_eq!(a.second_factor_profile(), None);
    }

    #[test]
    fn test_active_super_admin() {
        assert!(admin(AdminRole::SuperAdmin, true).is_active_super_admin());
        assert!(!admin(AdminRole::SuperAdmin, false).is_active_super_admin());
        assert!(!admin(AdminRole::Admin, true).is_active_super_admin());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let mut a = admin(AdminRole::Admin, true);
        a.password_hash = "secret$hash".to_string();
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("secret$hash"));
    }

    #[test]
    fn test_disabled_settings_drop_profile() {
        let settings = SecondFactorSettings {
            enable_2fa: false,
            auth_profile_id: Some(3),
        };
        assert_eq!(settings.stored_profile(), None);
    }
}
