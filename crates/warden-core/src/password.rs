//! Password hashing and verification
//!
//! Two stored formats are understood:
//! - Argon2id PHC strings (`$argon2id$v=19$m=...`), the default for new hashes
//! - Legacy salted SHA-256: `hex(salt) + "$" + hex(sha256(hex(salt) || password))`
//!
//! The legacy format is a single fast digest and is weak against offline
//! guessing. It exists so that hashes written by earlier deployments keep
//! verifying; [`PasswordHasher::needs_rehash`] tells callers when a stored
//! hash should be upgraded.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Salt length for the legacy scheme, in bytes
const LEGACY_SALT_LEN: usize = 16;

/// Separator between salt and digest in the legacy format
const LEGACY_SEPARATOR: char = '$';

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),
}

/// Scheme used when hashing new passwords
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordScheme {
    #[default]
    #[serde(rename = "argon2id")]
    Argon2id,
    #[serde(rename = "salted-sha256")]
    SaltedSha256,
}

impl std::str::FromStr for PasswordScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argon2id" | "argon2" => Ok(Self::Argon2id),
            "salted-sha256" | "sha256" => Ok(Self::SaltedSha256),
            other => Err(format!("unknown password scheme: {other}")),
        }
    }
}

/// Argon2 cost parameters
///
/// Defaults follow OWASP guidance. Tests use lighter settings.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (lanes, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))
    }
}

/// One-way password hasher
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    scheme: PasswordScheme,
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            scheme: PasswordScheme::Argon2id,
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    /// Create a hasher for the given scheme with default Argon2 costs
    pub fn new(scheme: PasswordScheme) -> Result<Self, PasswordError> {
        Self::with_config(scheme, &PasswordConfig::default())
    }

    /// Create a hasher with explicit Argon2 costs
    pub fn with_config(
        scheme: PasswordScheme,
        config: &PasswordConfig,
    ) -> Result<Self, PasswordError> {
        if scheme == PasswordScheme::SaltedSha256 {
            tracing::warn!(
                "Password scheme 'salted-sha256' selected; new hashes use a single fast digest"
            );
        }
        Ok(Self {
            scheme,
            params: config.to_params()?,
        })
    }

    /// Hash a plaintext password with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        match self.scheme {
            PasswordScheme::Argon2id => self.hash_argon2(password),
            PasswordScheme::SaltedSha256 => Ok(hash_legacy(password)),
        }
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// Never fails: a stored form that cannot be parsed simply does not match.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        if stored.starts_with("$argon2") {
            verify_argon2(password, stored)
        } else {
            verify_legacy(password, stored)
        }
    }

    /// Whether a stored hash was produced by a different scheme than the
    /// configured one
    pub fn needs_rehash(&self, stored: &str) -> bool {
        let is_argon2 = stored.starts_with("$argon2");
        match self.scheme {
            PasswordScheme::Argon2id => !is_argon2,
            PasswordScheme::SaltedSha256 => is_argon2,
        }
    }

    fn hash_argon2(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        );

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

fn verify_argon2(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn hash_legacy(password: &str) -> String {
    let mut salt = [0u8; LEGACY_SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);
    let digest = legacy_digest(&salt_hex, password);
    format!("{salt_hex}{LEGACY_SEPARATOR}{}", hex::encode(digest))
}

fn verify_legacy(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(LEGACY_SEPARATOR) else {
        return false;
    };
    if salt_hex.len() < LEGACY_SALT_LEN * 2 || hex::decode(salt_hex).is_err() {
        return false;
    }
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };

    let actual = legacy_digest(salt_hex, password);
    actual.as_slice().ct_eq(&expected).into()
}

/// The salt is mixed in as its hex text, not its raw bytes.
fn legacy_digest(salt_hex: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_argon2() -> PasswordHasher {
        let config = PasswordConfig {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        };
        PasswordHasher::with_config(PasswordScheme::Argon2id, &config).unwrap()
    }

    fn legacy() -> PasswordHasher {
        PasswordHasher::new(PasswordScheme::SaltedSha256).unwrap()
    }

    #[test]
    fn test_argon2_hash_and_verify() {
        let hasher = light_argon2();
        let hash = hasher.hash("SecureP@ssw0rd!").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("SecureP@ssw0rd!", &hash));
        assert!(!hasher.verify("WrongPassword", &hash));
    }

    #[test]
    fn test_legacy_hash_and_verify() {
        let hasher = legacy();
        let hash = hasher.hash("password123").unwrap();

        let (salt, digest) = hash.split_once('$').unwrap();
        assert_eq!(salt.len(), 32);
        assert_eq!(digest.len(), 64);
        assert!(hasher.verify("password123", &hash));
        assert!(!hasher.verify("password124", &hash));
    }

    #[test]
    fn test_same_password_produces_different_hashes() {
        for hasher in [light_argon2(), legacy()] {
            let hash1 = hasher.hash("SamePassword123!").unwrap();
            let hash2 = hasher.hash("SamePassword123!").unwrap();

            assert_ne!(hash1, hash2);
            assert!(hasher.verify("SamePassword123!", &hash1));
            assert!(hasher.verify("SamePassword123!", &hash2));
        }
    }

    #[test]
    fn test_legacy_matches_known_vector() {
        // sha256("00112233445566778899aabbccddeeff" + "admin123")
        let salt = "00112233445566778899aabbccddeeff";
        let digest = hex::encode(legacy_digest(salt, "admin123"));
        let stored = format!("{salt}${digest}");

        // Either configured scheme verifies legacy hashes
        assert!(light_argon2().verify("admin123", &stored));
        assert!(legacy().verify("admin123", &stored));
    }

    #[test]
    fn test_malformed_stored_forms_never_match() {
        let hasher = legacy();
        let malformed = [
            "",
            "no-separator-here",
            "$",
            "zz112233445566778899aabbccddeeff$00",
            "0011$abcd",
            "00112233445566778899aabbccddeeff$not-hex",
            "$argon2id$garbage",
            "$argon2id$v=19$m=8192,t=1,p=1$short",
        ];
        for stored in malformed {
            assert!(!hasher.verify("password", stored), "stored form: {stored:?}");
        }
    }

    #[test]
    fn test_needs_rehash() {
        let argon = light_argon2();
        let legacy_hasher = legacy();
        let legacy_hash = legacy_hasher.hash("pw").unwrap();
        let argon_hash = argon.hash("pw").unwrap();

        assert!(argon.needs_rehash(&legacy_hash));
        assert!(!argon.needs_rehash(&argon_hash));
        assert!(legacy_hasher.needs_rehash(&argon_hash));
    }

    #[test]
    fn test_custom_config_is_encoded_in_hash() {
        let hash = light_argon2().hash("TestPassword123!").unwrap();
        assert!(hash.contains("m=8192"));
        assert!(hash.contains("t=1"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("argon2id".parse::<PasswordScheme>(), Ok(PasswordScheme::Argon2id));
        assert_eq!(
            "salted-sha256".parse::<PasswordScheme>(),
            Ok(PasswordScheme::SaltedSha256)
        );
        assert!("md5".parse::<PasswordScheme>().is_err());
    }

    #[test]
    fn test_legacy_digest_length_mismatch_never_matches() {
        let stored = legacy().hash("hunter22").unwrap();
        let (salt, digest) = stored.split_once('$').unwrap();

        // A truncated digest must not match on its common prefix
        let truncated = format!("{salt}${}", &digest[..digest.len() - 2]);
        assert!(!legacy().verify("hunter22", &truncated));
        let extended = format!("{salt}${digest}00");
        assert!(!legacy().verify("hunter22", &extended));
    }
}
