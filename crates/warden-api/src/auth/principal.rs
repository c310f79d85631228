//! Principal directories
//!
//! A directory is what the generic [`AuthService`](super::AuthService) knows
//! about one population of principals: how to look a principal up by email
//! and whether issued tokens are tracked server-side.

use async_trait::async_trait;
use std::sync::Arc;
use warden_core::{
    Admin, AdminStore, Principal, SessionLedger, StoreResult, User, UserStore,
};

/// Lookup capability for one principal kind
#[async_trait]
pub trait PrincipalDirectory: Send + Sync + 'static {
    type Principal: Principal;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Self::Principal>>;

    /// Ledger backing server-side sessions, if this kind has any.
    ///
    /// Without one, logout is a no-op and tokens stay valid until expiry.
    fn sessions(&self) -> Option<&dyn SessionLedger> {
        None
    }
}

/// Ordinary users; tokens are stateless
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PrincipalDirectory for UserDirectory {
    type Principal = User;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.store.find_user_by_email(email).await
    }
}

/// Administrators; every issued access token is recorded in the ledger
#[derive(Clone)]
pub struct AdminDirectory {
    store: Arc<dyn AdminStore>,
    sessions: Arc<dyn SessionLedger>,
}

impl AdminDirectory {
    pub fn new(store: Arc<dyn AdminStore>, sessions: Arc<dyn SessionLedger>) -> Self {
        Self { store, sessions }
    }
}

#[async_trait]
impl PrincipalDirectory for AdminDirectory {
    type Principal = Admin;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        self.store.find_admin_by_email(email).await
    }

    fn sessions(&self) -> Option<&dyn SessionLedger> {
        Some(self.sessions.as_ref())
    }
}
