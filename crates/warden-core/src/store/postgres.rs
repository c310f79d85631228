//! PostgreSQL store
//!
//! Principal, session and profile persistence using SQLx. Guarded admin
//! mutations run in one transaction that first locks every active super
//! admin row, so two concurrent demotions or deletions serialize and the
//! second one sees the first one's result.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};

use super::{
    AdminStore, AuthProfileStore, SessionLedger, StoreError, StoreResult, UniqueField, UserStore,
};
use crate::guard;
use crate::{
    Admin, AdminChanges, AuthProfile, NewAdmin, NewAuthProfile, NewUser, SecondFactorSettings,
    SessionRecord, User, UserChanges,
};

macro_rules! user_columns {
    () => {
        "id, email, username, password_hash, is_active, enable_2fa, auth_profile_id, created_at, updated_at"
    };
}

macro_rules! admin_columns {
    () => {
        "id, email, username, password_hash, role, is_active, enable_2fa, auth_profile_id, created_at, updated_at"
    };
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
    }

    /// Lock the active super admin rows and return their ids.
    ///
    /// Every guarded mutation takes these locks first and in id order.
    async fn lock_super_admins(tx: &mut Transaction<'_, Postgres>) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM admins WHERE role = 'super_admin' AND is_active ORDER BY id FOR UPDATE",
        )
        .fetch_all(&mut **tx)
        .await?;
        Ok(ids)
    }

    async fn lock_admin(tx: &mut Transaction<'_, Postgres>, id: i64) -> StoreResult<Admin> {
        sqlx::query_as::<_, AdminRow>(concat!(
            "SELECT ",
            admin_columns!(),
            " FROM admins WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::NotFound("Admin"))?
        .try_into()
    }
}

/// Map a unique-constraint violation to the column it protects
fn map_unique(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("username") => Some(UniqueField::Username),
                Some(c) if c.contains("email") => Some(UniqueField::Email),
                Some(c) if c.contains("token") => Some(UniqueField::Token),
                Some(c) if c.contains("name") => Some(UniqueField::ProfileName),
                _ => None,
            };
            if let Some(field) = field {
                return StoreError::Duplicate(field);
            }
        }
    }
    err.into()
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    password_hash: String,
    is_active: bool,
    enable_2fa: bool,
    auth_profile_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            is_active: row.is_active,
            enable_2fa: row.enable_2fa,
            auth_profile_id: row.auth_profile_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Admin row from database
#[derive(Debug, FromRow)]
struct AdminRow {
    id: i64,
    email: String,
    username: String,
    password_hash: String,
    role: String,
    is_active: bool,
    enable_2fa: bool,
    auth_profile_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<AdminRow> for Admin {
    type Error = StoreError;

    fn try_from(row: AdminRow) -> Result<Self, Self::Error> {
        Ok(Admin {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            role: row.role.parse().map_err(StoreError::Database)?,
            is_active: row.is_active,
            enable_2fa: row.enable_2fa,
            auth_profile_id: row.auth_profile_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Session row from database
#[derive(Debug, FromRow)]
struct SessionRow {
    id: i64,
    admin_id: i64,
    token: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        SessionRecord {
            id: row.id,
            admin_id: row.admin_id,
            token: row.token,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// Auth profile row from database
#[derive(Debug, FromRow)]
struct ProfileRow {
    id: i64,
    name: String,
    endpoint: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for AuthProfile {
    fn from(row: ProfileRow) -> Self {
        AuthProfile {
            id: row.id,
            name: row.name,
            endpoint: row.endpoint,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let email_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(&user.email)
                .fetch_one(&mut *tx)
                .await?;
        if email_taken {
            return Err(StoreError::Duplicate(UniqueField::Email));
        }

        let username_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(&user.username)
                .fetch_one(&mut *tx)
                .await?;
        if username_taken {
            return Err(StoreError::Duplicate(UniqueField::Username));
        }

        let row = sqlx::query_as::<_, UserRow>(concat!(
            "INSERT INTO users (email, username, password_hash) VALUES ($1, $2, $3) RETURNING ",
            user_columns!()
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn update_user_profile(&self, id: i64, changes: UserChanges) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(StoreError::NotFound("User"));
        }

        if let Some(username) = &changes.username {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND id <> $2)",
            )
            .bind(username)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(StoreError::Duplicate(UniqueField::Username));
            }
        }
        if let Some(email) = &changes.email {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND id <> $2)",
            )
            .bind(email)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(StoreError::Duplicate(UniqueField::Email));
            }
        }

        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users SET username = COALESCE($2, username), email = COALESCE($3, email), ",
            "updated_at = NOW() WHERE id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn set_user_second_factor(
        &self,
        id: i64,
        settings: SecondFactorSettings,
    ) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users SET enable_2fa = $2, auth_profile_id = $3, updated_at = NOW() ",
            "WHERE id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(settings.enable_2fa)
        .bind(settings.stored_profile())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("User"))?;
        Ok(row.into())
    }
}

#[async_trait]
impl AdminStore for PgStore {
    async fn create_admin(&self, admin: NewAdmin) -> StoreResult<Admin> {
        let mut tx = self.pool.begin().await?;

        let email_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admins WHERE email = $1)")
                .bind(&admin.email)
                .fetch_one(&mut *tx)
                .await?;
        if email_taken {
            return Err(StoreError::Duplicate(UniqueField::Email));
        }

        let username_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admins WHERE username = $1)")
                .bind(&admin.username)
                .fetch_one(&mut *tx)
                .await?;
        if username_taken {
            return Err(StoreError::Duplicate(UniqueField::Username));
        }

        let row = sqlx::query_as::<_, AdminRow>(concat!(
            "INSERT INTO admins (email, username, password_hash, role) VALUES ($1, $2, $3, $4) ",
            "RETURNING ",
            admin_columns!()
        ))
        .bind(&admin.email)
        .bind(&admin.username)
        .bind(&admin.password_hash)
        .bind(admin.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_admin_by_id(&self, id: i64) -> StoreResult<Option<Admin>> {
        sqlx::query_as::<_, AdminRow>(concat!(
            "SELECT ",
            admin_columns!(),
            " FROM admins WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Admin::try_from)
        .transpose()
    }

    async fn find_admin_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        sqlx::query_as::<_, AdminRow>(concat!(
            "SELECT ",
            admin_columns!(),
            " FROM admins WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(Admin::try_from)
        .transpose()
    }

    async fn list_admins(&self, skip: i64, limit: i64) -> StoreResult<Vec<Admin>> {
        let rows = sqlx::query_as::<_, AdminRow>(concat!(
            "SELECT ",
            admin_columns!(),
            " FROM admins ORDER BY id OFFSET $1 LIMIT $2"
        ))
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Admin::try_from).collect()
    }

    async fn count_active_super_admins(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM admins WHERE role = 'super_admin' AND is_active",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn update_admin(&self, id: i64, changes: AdminChanges) -> StoreResult<Admin> {
        let mut tx = self.pool.begin().await?;
        let super_admins = Self::lock_super_admins(&mut tx).await?;
        let current = Self::lock_admin(&mut tx, id).await?;

        if let Some(email) = &changes.email {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM admins WHERE email = $1 AND id <> $2)",
            )
            .bind(email)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(StoreError::Duplicate(UniqueField::Email));
            }
        }
        if let Some(username) = &changes.username {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM admins WHERE username = $1 AND id <> $2)",
            )
            .bind(username)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(StoreError::Duplicate(UniqueField::Username));
            }
        }

        let others = super_admins.iter().filter(|&&sid| sid != id).count() as u64;
        guard::check_update(&current, &changes, others)?;
        let deactivating = changes.is_active == Some(false);

        let row = sqlx::query_as::<_, AdminRow>(concat!(
            "UPDATE admins SET email = COALESCE($2, email), username = COALESCE($3, username), ",
            "role = COALESCE($4, role), is_active = COALESCE($5, is_active), updated_at = NOW() ",
            "WHERE id = $1 RETURNING ",
            admin_columns!()
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.username)
        .bind(changes.role.map(|r| r.as_str()))
        .bind(changes.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        if deactivating {
            sqlx::query("DELETE FROM admin_sessions WHERE admin_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn delete_admin(&self, id: i64, requester_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let super_admins = Self::lock_super_admins(&mut tx).await?;
        let admin = Self::lock_admin(&mut tx, id).await?;

        let others = super_admins.iter().filter(|&&sid| sid != id).count() as u64;
        guard::check_delete(&admin, requester_id, others)?;

        // Sessions go with the admin through ON DELETE CASCADE
        sqlx::query("DELETE FROM admins WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_admin_second_factor(
        &self,
        id: i64,
        settings: SecondFactorSettings,
    ) -> StoreResult<Admin> {
        sqlx::query_as::<_, AdminRow>(concat!(
            "UPDATE admins SET enable_2fa = $2, auth_profile_id = $3, updated_at = NOW() ",
            "WHERE id = $1 RETURNING ",
            admin_columns!()
        ))
        .bind(id)
        .bind(settings.enable_2fa)
        .bind(settings.stored_profile())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("Admin"))?
        .try_into()
    }

    async fn set_admin_password(&self, id: i64, password_hash: String) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE admins SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Admin"));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionLedger for PgStore {
    async fn create_session(
        &self,
        admin_id: i64,
        token: &str,
        ttl: Duration,
    ) -> StoreResult<SessionRecord> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, SessionRow>(
            "INSERT INTO admin_sessions (admin_id, token, created_at, expires_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, admin_id, token, created_at, expires_at",
        )
        .bind(admin_id)
        .bind(token)
        .bind(now)
        .bind(now + ttl)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(row.into())
    }

    async fn find_valid_session(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, admin_id, token, created_at, expires_at FROM admin_sessions \
             WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRecord::from))
    }

    async fn delete_session(&self, token: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_sessions_for(&self, admin_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE admin_id = $1")
            .bind(admin_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuthProfileStore for PgStore {
    async fn create_auth_profile(&self, profile: NewAuthProfile) -> StoreResult<AuthProfile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO auth_profiles (name, endpoint, is_active) VALUES ($1, $2, $3) \
             RETURNING id, name, endpoint, is_active, created_at",
        )
        .bind(&profile.name)
        .bind(&profile.endpoint)
        .bind(profile.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(row.into())
    }

    async fn find_auth_profile(&self, id: i64) -> StoreResult<Option<AuthProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, name, endpoint, is_active, created_at FROM auth_profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AuthProfile::from))
    }
}
