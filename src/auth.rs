use crate::config::SecurityConfig;
use crate::storage::{Store, User};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// User registration/login and JWT issuance — the ambient auth collaborator
/// named at the HTTP seam (spec §6) but not specified further there.
/// Password hashing reuses the teacher's own `argon2` dependency (used for
/// wallet key derivation in `quanta::crypto::wallet`); JWT claim shape and
/// route semantics follow `original_source/src/api/auth.py`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("address already registered")]
    AlreadyRegistered,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub address: String,
    pub exp: i64,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub fn register(store: &dyn Store, address: &str, password: &str) -> Result<(), AuthError> {
    if store
        .get_user(address)
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .is_some()
    {
        return Err(AuthError::AlreadyRegistered);
    }
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .to_string();
    let now = now_secs();
    store
        .save_user(&User {
            address: address.to_string(),
            password_hash,
            reputation_score: 100,
            created_at: now,
            last_activity: now,
        })
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    tracing::info!(address, "user registered");
    Ok(())
}

pub fn login(
    store: &dyn Store,
    security: &SecurityConfig,
    address: &str,
    password: &str,
) -> Result<String, AuthError> {
    let mut user = store
        .get_user(address)
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or(AuthError::InvalidCredentials)?;

    let parsed = PasswordHash::new(&user.password_hash).map_err(|e| AuthError::Internal(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)?;

    user.last_activity = now_secs();
    store.save_user(&user).map_err(|e| AuthError::Internal(e.to_string()))?;

    let exp = chrono::Utc::now().timestamp() + security.jwt_expiry_secs;
    let claims = Claims {
        address: address.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(security.jwt_secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn verify_token(security: &SecurityConfig, token: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(security.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::InvalidToken)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SledStore;

    fn store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn register_then_login_round_trips() {
        let (_dir, store) = store();
        let security = SecurityConfig::default();
        register(&store, "alice", "hunter2").unwrap();
        let token = login(&store, &security, "alice", "hunter2").unwrap();
        let claims = verify_token(&security, &token).unwrap();
        assert_eq!(claims.address, "alice");
    }

    #[test]
    fn login_rejects_wrong_password() {
        let (_dir, store) = store();
        let security = SecurityConfig::default();
        register(&store, "alice", "hunter2").unwrap();
        assert!(login(&store, &security, "alice", "wrong").is_err());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (_dir, store) = store();
        register(&store, "alice", "hunter2").unwrap();
        assert!(matches!(
            register(&store, "alice", "other"),
            Err(AuthError::AlreadyRegistered)
        ));
    }
}
