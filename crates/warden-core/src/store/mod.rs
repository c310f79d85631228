//! Credential store and session ledger
//!
//! Storage is split per concern so the auth layer can depend on exactly what
//! it uses. Both backends implement every trait:
//! - [`MemoryStore`]: single-process, for tests and local development
//! - [`PgStore`]: PostgreSQL via SQLx

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::guard::GuardViolation;
use crate::{
    Admin, AdminChanges, AuthProfile, NewAdmin, NewAuthProfile, NewUser, SecondFactorSettings,
    SessionRecord, User, UserChanges,
};

/// Column whose uniqueness a write would break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
    ProfileName,
    Token,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Username => write!(f, "username"),
            Self::ProfileName => write!(f, "profile name"),
            Self::Token => write!(f, "token"),
        }
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Duplicate {0}")]
    Duplicate(UniqueField),

    #[error(transparent)]
    Guard(#[from] GuardViolation),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// User accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; fails with `Duplicate` on email or username clash
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Apply self-service changes; uniqueness is checked against other users
    async fn update_user_profile(&self, id: i64, changes: UserChanges) -> StoreResult<User>;

    async fn set_user_second_factor(
        &self,
        id: i64,
        settings: SecondFactorSettings,
    ) -> StoreResult<User>;
}

/// Administrator accounts.
///
/// `update_admin` and `delete_admin` enforce the super-admin invariant
/// atomically with the write.
#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn create_admin(&self, admin: NewAdmin) -> StoreResult<Admin>;

    async fn find_admin_by_id(&self, id: i64) -> StoreResult<Option<Admin>>;

    async fn find_admin_by_email(&self, email: &str) -> StoreResult<Option<Admin>>;

    /// Admins ordered by id
    async fn list_admins(&self, skip: i64, limit: i64) -> StoreResult<Vec<Admin>>;

    async fn count_active_super_admins(&self) -> StoreResult<u64>;

    /// Apply a partial update under the super-admin guard.
    ///
    /// Deactivation revokes the admin's sessions in the same step.
    async fn update_admin(&self, id: i64, changes: AdminChanges) -> StoreResult<Admin>;

    /// Delete an admin (and its sessions) under the super-admin guard
    async fn delete_admin(&self, id: i64, requester_id: i64) -> StoreResult<()>;

    async fn set_admin_second_factor(
        &self,
        id: i64,
        settings: SecondFactorSettings,
    ) -> StoreResult<Admin>;

    async fn set_admin_password(&self, id: i64, password_hash: String) -> StoreResult<()>;
}

/// Server-side record of issued admin tokens
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Record `token` as owned by `admin_id`, valid for `ttl` from now
    async fn create_session(
        &self,
        admin_id: i64,
        token: &str,
        ttl: Duration,
    ) -> StoreResult<SessionRecord>;

    /// Look up a session that has not yet expired.
    ///
    /// Expired records that were never deleted are reported as absent.
    async fn find_valid_session(&self, token: &str) -> StoreResult<Option<SessionRecord>>;

    /// Remove the session for `token`; returns how many rows went away
    async fn delete_session(&self, token: &str) -> StoreResult<u64>;

    /// Remove every session owned by `admin_id`
    async fn delete_sessions_for(&self, admin_id: i64) -> StoreResult<u64>;

    /// Remove sessions whose expiry has passed
    async fn purge_expired_sessions(&self) -> StoreResult<u64>;
}

/// External verifier definitions used by the second factor
#[async_trait]
pub trait AuthProfileStore: Send + Sync {
    async fn create_auth_profile(&self, profile: NewAuthProfile) -> StoreResult<AuthProfile>;

    async fn find_auth_profile(&self, id: i64) -> StoreResult<Option<AuthProfile>>;
}
