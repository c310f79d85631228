//! Warden CLI - Operator command-line interface
//!
//! Usage:
//!   warden create-super-admin --email <email> --username <name> [--password <pw>]
//!   warden reset-admin-password --email <email> [--password <pw>]
//!   warden add-auth-profile --name <name> --endpoint <url>
//!   warden purge-sessions

use anyhow::{bail, Context};
use base64::Engine;
use clap::{Parser, Subcommand};
use rand::RngCore;
use validator::{ValidateEmail, ValidateUrl};
use warden_core::{
    AdminRole, AdminStore, AppConfig, AuthProfileStore, NewAdmin, NewAuthProfile,
    PasswordHasher, PgStore, SessionLedger,
};

const MIN_PASSWORD_LEN: usize = 8;
const GENERATED_PASSWORD_BYTES: usize = 18;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden authentication service operator CLI")]
#[command(version)]
struct Cli {
    /// PostgreSQL connection URL (defaults to the server configuration)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an active super admin
    CreateSuperAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        /// Generated and printed when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Replace an administrator's password
    ResetAdminPassword {
        #[arg(long)]
        email: String,
        /// Generated and printed when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Register an external second-factor verifier
    AddAuthProfile {
        #[arg(long)]
        name: String,
        #[arg(long)]
        endpoint: String,
    },
    /// Delete expired admin sessions
    PurgeSessions,
}

/// Random URL-safe password for operators who do not supply one
fn generate_password() -> String {
    let mut bytes = [0u8; GENERATED_PASSWORD_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Use the given password or generate one; the flag says whether to print it
fn resolve_password(password: Option<String>) -> anyhow::Result<(String, bool)> {
    match password {
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
            bail!("password must be at least {MIN_PASSWORD_LEN} characters")
        }
        Some(p) => Ok((p, false)),
        None => Ok((generate_password(), true)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let url = cli
        .database_url
        .unwrap_or_else(|| config.database.postgres_url.clone());

    let store = PgStore::connect(&url, config.database.pool_size)
        .await
        .context("failed to connect to PostgreSQL")?;
    store.migrate().await?;

    match cli.command {
        Commands::CreateSuperAdmin {
            email,
            username,
            password,
        } => {
            if !email.validate_email() {
                bail!("invalid email address: {email}");
            }
            let (password, generated) = resolve_password(password)?;
            let hasher = PasswordHasher::new(config.auth.password_scheme)?;

            let admin = store
                .create_admin(NewAdmin {
                    email,
                    username,
                    password_hash: hasher.hash(&password)?,
                    role: AdminRole::SuperAdmin,
                })
                .await?;
            tracing::info!(id = admin.id, "Super admin created");

            println!("Created super admin {} <{}> (id {})", admin.username, admin.email, admin.id);
            if generated {
                println!("Generated password: {password}");
            }
        }
        Commands::ResetAdminPassword { email, password } => {
            let admin = store
                .find_admin_by_email(&email)
                .await?
                .with_context(|| format!("no administrator with email {email}"))?;
            let (password, generated) = resolve_password(password)?;
            let hasher = PasswordHasher::new(config.auth.password_scheme)?;

            store
                .set_admin_password(admin.id, hasher.hash(&password)?)
                .await?;
            let revoked = store.delete_sessions_for(admin.id).await?;
            tracing::info!(id = admin.id, revoked, "Admin password reset");

            println!("Password reset for {} ({revoked} sessions revoked)", admin.email);
            if generated {
                println!("Generated password: {password}");
            }
        }
        Commands::AddAuthProfile { name, endpoint } => {
            if !endpoint.validate_url() {
                bail!("invalid endpoint URL: {endpoint}");
            }
            let profile = store
                .create_auth_profile(NewAuthProfile {
                    name,
                    endpoint,
                    is_active: true,
                })
                .await?;
            println!("Created authentication profile {} (id {})", profile.name, profile.id);
        }
        Commands::PurgeSessions => {
            let removed = store.purge_expired_sessions().await?;
            println!("Removed {removed} expired sessions");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_super_admin() {
        let cli = Cli::try_parse_from([
            "warden",
            "create-super-admin",
            "--email",
            "root@example.com",
            "--username",
            "root",
        ])
        .unwrap();
        match cli.command {
            Commands::CreateSuperAdmin {
                email,
                username,
                password,
            } => {
                assert_eq!(email, "root@example.com");
                assert_eq!(username, "root");
                assert!(password.is_none());
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_add_auth_profile_requires_endpoint() {
        assert!(Cli::try_parse_from(["warden", "add-auth-profile", "--name", "otp"]).is_err());
    }

    #[test]
    fn test_generated_passwords() {
        let a = generate_password();
        let b = generate_password();
        assert_ne!(a, b);
        assert_eq!(a.len(), 24);
        assert!(a.len() >= MIN_PASSWORD_LEN);
    }

    #[test]
    fn test_resolve_password() {
        assert!(resolve_password(Some("short".to_string())).is_err());

        let (password, generated) = resolve_password(Some("LongEnough1".to_string())).unwrap();
        assert_eq!(password, "LongEnough1");
        assert!(!generated);

        let (_, generated) = resolve_password(None).unwrap();
        assert!(generated);
    }
}
