//! Application state management

use std::sync::Arc;
use std::time::{Duration, Instant};
use warden_core::{
    AdminStore, AppConfig, AuthProfileStore, MemoryStore, PasswordHasher, SessionLedger,
    UserStore,
};

use crate::auth::{
    AdminDirectory, AuthService, HttpSecondFactorGateway, SecondFactorGateway, SigningKey,
    TokenIssuer, UserDirectory,
};

/// Storage handles, one per concern
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub admins: Arc<dyn AdminStore>,
    pub sessions: Arc<dyn SessionLedger>,
    pub profiles: Arc<dyn AuthProfileStore>,
}

impl Stores {
    /// Use one backend for every concern
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: UserStore + AdminStore + SessionLedger + AuthProfileStore + 'static,
    {
        Self {
            users: backend.clone(),
            admins: backend.clone(),
            sessions: backend.clone(),
            profiles: backend,
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    pub stores: Stores,
    pub hasher: Arc<PasswordHasher>,
    pub issuer: Arc<TokenIssuer>,
    pub user_auth: AuthService<UserDirectory>,
    pub admin_auth: AuthService<AdminDirectory>,
}

impl AppState {
    /// Build state with the HTTP second-factor gateway
    pub fn new(config: AppConfig, stores: Stores) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(config.auth.password_scheme)?;
        let gateway = HttpSecondFactorGateway::new(
            stores.profiles.clone(),
            Duration::from_secs(config.second_factor.timeout_secs),
        )?;
        Ok(Self::with_parts(config, stores, hasher, Arc::new(gateway)))
    }

    /// Build state from explicit parts
    pub fn with_parts(
        config: AppConfig,
        stores: Stores,
        hasher: PasswordHasher,
        gateway: Arc<dyn SecondFactorGateway>,
    ) -> Self {
        let key = SigningKey::from_config(&config.auth);
        let issuer = Arc::new(TokenIssuer::new(key, &config.auth));
        let hasher = Arc::new(hasher);
        let timeout = Duration::from_secs(config.second_factor.timeout_secs);

        let user_auth = AuthService::new(
            UserDirectory::new(stores.users.clone()),
            issuer.clone(),
            hasher.clone(),
            gateway.clone(),
            timeout,
        );
        let admin_auth = AuthService::new(
            AdminDirectory::new(stores.admins.clone(), stores.sessions.clone()),
            issuer.clone(),
            hasher.clone(),
            gateway,
            timeout,
        );

        Self {
            config,
            start_time: Instant::now(),
            stores,
            hasher,
            issuer,
            user_auth,
            admin_auth,
        }
    }

    /// State over a fresh in-memory store
    pub fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        Self::new(config, Stores::from_backend(Arc::new(MemoryStore::new())))
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
