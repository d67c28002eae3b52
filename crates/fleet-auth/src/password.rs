//! Constant-time password hashing and verification (§4.7: "passwords are
//! verified with a constant-time hash compare").
//!
//! Argon2id is the only hashing scheme this crate produces; [`verify`] still
//! accepts any PHC-formatted hash argon2's `PasswordHash` parser understands,
//! so a future parameter change stays backward-compatible with rows hashed
//! under older settings.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;

use crate::error::AuthError;

/// Hash a raw password with a fresh random salt, returning the PHC string
/// to store in `users.password_hash`.
///
/// Raw passwords never appear in logs or error messages (§4.7) — this
/// function's `Err` path never echoes the input back.
pub fn hash(raw_password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(raw_password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Verify a raw password against a stored PHC hash in constant time.
///
/// Returns `Ok(true)`/`Ok(false)` for a well-formed comparison; `Err` only
/// when the stored hash itself is malformed (a store-integrity problem, not
/// a credential mismatch — callers should map both `Ok(false)` and `Err` to
/// [`AuthError::InvalidCredentials`] so a corrupt row cannot be
/// distinguished from a wrong password by an attacker).
pub fn verify(raw_password: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::PasswordHash(format!("stored hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(raw_password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let h = hash("p4ssw0rdz!").unwrap();
        assert!(verify("p4ssw0rdz!", &h).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let h = hash("p4ssw0rdz!").unwrap();
        assert!(!verify("wrong-password", &h).unwrap());
    }

    #[test]
    fn two_hashes_of_same_password_differ() {
        let a = hash("same-input").unwrap();
        let b = hash("same-input").unwrap();
        assert_ne!(a, b, "distinct random salts must produce distinct hashes");
    }

    #[test]
    fn verify_rejects_malformed_stored_hash() {
        assert!(verify("anything", "not-a-phc-hash").is_err());
    }

    #[test]
    fn hash_never_echoes_raw_password_in_output() {
        let h = hash("super-secret-phrase").unwrap();
        assert!(!h.contains("super-secret-phrase"));
    }
}
