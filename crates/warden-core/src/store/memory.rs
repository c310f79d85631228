//! In-memory store
//!
//! Every guarded admin mutation takes the single write lock before counting
//! super admins, so the count and the write are observed atomically by
//! concurrent tasks.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    AdminStore, AuthProfileStore, SessionLedger, StoreError, StoreResult, UniqueField, UserStore,
};
use crate::guard;
use crate::{
    Admin, AdminChanges, AuthProfile, NewAdmin, NewAuthProfile, NewUser, SecondFactorSettings,
    SessionRecord, User, UserChanges,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    admins: BTreeMap<i64, Admin>,
    sessions: HashMap<String, SessionRecord>,
    profiles: BTreeMap<i64, AuthProfile>,
    next_user_id: i64,
    next_admin_id: i64,
    next_session_id: i64,
    next_profile_id: i64,
}

impl MemoryState {
    fn other_active_super_admins(&self, excluding: i64) -> u64 {
        self.admins
            .values()
            .filter(|a| a.id != excluding && a.is_active_super_admin())
            .count() as u64
    }

    fn admin_field_taken(&self, field: UniqueField, value: &str, excluding: i64) -> bool {
        self.admins.values().any(|a| {
            a.id != excluding
                && match field {
                    UniqueField::Email => a.email == value,
                    UniqueField::Username => a.username == value,
                    _ => false,
                }
        })
    }

    fn user_field_taken(&self, field: UniqueField, value: &str, excluding: i64) -> bool {
        self.users.values().any(|u| {
            u.id != excluding
                && match field {
                    UniqueField::Email => u.email == value,
                    UniqueField::Username => u.username == value,
                    _ => false,
                }
        })
    }
}

/// Store keeping every record in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a session's expiry into the past without deleting it
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn expire_session(&self, token: &str) -> bool {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(token) {
            Some(session) => {
                session.expires_at = Utc::now() - Duration::seconds(1);
                true
            }
            None => false,
        }
    }

    /// Number of stored session rows, expired ones included
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.user_field_taken(UniqueField::Email, &user.email, 0) {
            return Err(StoreError::Duplicate(UniqueField::Email));
        }
        if state.user_field_taken(UniqueField::Username, &user.username, 0) {
            return Err(StoreError::Duplicate(UniqueField::Username));
        }

        state.next_user_id += 1;
        let record = User {
            id: state.next_user_id,
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            is_active: true,
            enable_2fa: false,
            auth_profile_id: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user_profile(&self, id: i64, changes: UserChanges) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&id) {
            return Err(StoreError::NotFound("User"));
        }
        if let Some(username) = &changes.username {
            if state.user_field_taken(UniqueField::Username, username, id) {
                return Err(StoreError::Duplicate(UniqueField::Username));
            }
        }
        if let Some(email) = &changes.email {
            if state.user_field_taken(UniqueField::Email, email, id) {
                return Err(StoreError::Duplicate(UniqueField::Email));
            }
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or(StoreError::NotFound("User"))?;
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        user.updated_at = Some(Utc::now());
        Ok(user.clone())
    }

    async fn set_user_second_factor(
        &self,
        id: i64,
        settings: SecondFactorSettings,
    ) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or(StoreError::NotFound("User"))?;
        user.enable_2fa = settings.enable_2fa;
        user.auth_profile_id = settings.stored_profile();
        user.updated_at = Some(Utc::now());
        Ok(user.clone())
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn create_admin(&self, admin: NewAdmin) -> StoreResult<Admin> {
        let mut state = self.state.write().await;
        if state.admin_field_taken(UniqueField::Email, &admin.email, 0) {
            return Err(StoreError::Duplicate(UniqueField::Email));
        }
        if state.admin_field_taken(UniqueField::Username, &admin.username, 0) {
            return Err(StoreError::Duplicate(UniqueField::Username));
        }

        state.next_admin_id += 1;
        let record = Admin {
            id: state.next_admin_id,
            email: admin.email,
            username: admin.username,
            password_hash: admin.password_hash,
            role: admin.role,
            is_active: true,
            enable_2fa: false,
            auth_profile_id: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.admins.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_admin_by_id(&self, id: i64) -> StoreResult<Option<Admin>> {
        Ok(self.state.read().await.admins.get(&id).cloned())
    }

    async fn find_admin_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        let state = self.state.read().await;
        Ok(state.admins.values().find(|a| a.email == email).cloned())
    }

    async fn list_admins(&self, skip: i64, limit: i64) -> StoreResult<Vec<Admin>> {
        let state = self.state.read().await;
        Ok(state
            .admins
            .values()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_active_super_admins(&self) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .admins
            .values()
            .filter(|a| a.is_active_super_admin())
            .count() as u64)
    }

    async fn update_admin(&self, id: i64, changes: AdminChanges) -> StoreResult<Admin> {
        let mut state = self.state.write().await;
        let current = state
            .admins
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("Admin"))?;

        if let Some(email) = &changes.email {
            if state.admin_field_taken(UniqueField::Email, email, id) {
                return Err(StoreError::Duplicate(UniqueField::Email));
            }
        }
        if let Some(username) = &changes.username {
            if state.admin_field_taken(UniqueField::Username, username, id) {
                return Err(StoreError::Duplicate(UniqueField::Username));
            }
        }

        let others = state.other_active_super_admins(id);
        guard::check_update(&current, &changes, others)?;

        let admin = state
            .admins
            .get_mut(&id)
            .ok_or(StoreError::NotFound("Admin"))?;
        if let Some(email) = changes.email {
            admin.email = email;
        }
        if let Some(username) = changes.username {
            admin.username = username;
        }
        if let Some(role) = changes.role {
            admin.role = role;
        }
        if let Some(active) = changes.is_active {
            admin.is_active = active;
        }
        admin.updated_at = Some(Utc::now());
        let admin = admin.clone();

        if changes.is_active == Some(false) {
            state.sessions.retain(|_, s| s.admin_id != id);
        }
        Ok(admin)
    }

    async fn delete_admin(&self, id: i64, requester_id: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let admin = state
            .admins
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("Admin"))?;

        let others = state.other_active_super_admins(id);
        guard::check_delete(&admin, requester_id, others)?;

        state.admins.remove(&id);
        state.sessions.retain(|_, s| s.admin_id != id);
        Ok(())
    }

    async fn set_admin_second_factor(
        &self,
        id: i64,
        settings: SecondFactorSettings,
    ) -> StoreResult<Admin> {
        let mut state = self.state.write().await;
        let admin = state
            .admins
            .get_mut(&id)
            .ok_or(StoreError::NotFound("Admin"))?;
        admin.enable_2fa = settings.enable_2fa;
        admin.auth_profile_id = settings.stored_profile();
        admin.updated_at = Some(Utc::now());
        Ok(admin.clone())
    }

    async fn set_admin_password(&self, id: i64, password_hash: String) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let admin = state
            .admins
            .get_mut(&id)
            .ok_or(StoreError::NotFound("Admin"))?;
        admin.password_hash = password_hash;
        admin.updated_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl SessionLedger for MemoryStore {
    async fn create_session(
        &self,
        admin_id: i64,
        token: &str,
        ttl: Duration,
    ) -> StoreResult<SessionRecord> {
        let mut state = self.state.write().await;
        if !state.admins.contains_key(&admin_id) {
            return Err(StoreError::NotFound("Admin"));
        }
        if state.sessions.contains_key(token) {
            return Err(StoreError::Duplicate(UniqueField::Token));
        }

        state.next_session_id += 1;
        let now = Utc::now();
        let record = SessionRecord {
            id: state.next_session_id,
            admin_id,
            token: token.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };
        state.sessions.insert(record.token.clone(), record.clone());
        Ok(record)
    }

    async fn find_valid_session(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let state = self.state.read().await;
        let now = Utc::now();
        Ok(state
            .sessions
            .get(token)
            .filter(|s| s.is_valid_at(now))
            .cloned())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        Ok(u64::from(state.sessions.remove(token).is_some()))
    }

    async fn delete_sessions_for(&self, admin_id: i64) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.admin_id != admin_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn purge_expired_sessions(&self) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.is_valid_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl AuthProfileStore for MemoryStore {
    async fn create_auth_profile(&self, profile: NewAuthProfile) -> StoreResult<AuthProfile> {
        let mut state = self.state.write().await;
        if state.profiles.values().any(|p| p.name == profile.name) {
            return Err(StoreError::Duplicate(UniqueField::ProfileName));
        }

        state.next_profile_id += 1;
        let record = AuthProfile {
            id: state.next_profile_id,
            name: profile.name,
            endpoint: profile.endpoint,
            is_active: profile.is_active,
            created_at: Utc::now(),
        };
        state.profiles.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_auth_profile(&self, id: i64) -> StoreResult<Option<AuthProfile>> {
        Ok(self.state.read().await.profiles.get(&id).cloned())
    }
}
