use argon2::{
    Argon2, Params,
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::thread_rng;

use super::error::AuthError;

const MIN_PASSWORD_LEN: usize = 8;

// Argon2id cost parameters: 64 MiB, 3 passes, 2 lanes, 32-byte output.
const MEMORY_KIB: u32 = 64 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 2;
const OUTPUT_LEN: usize = 32;

/// Argon2id over `plaintext || pepper`. The pepper is a deployment secret
/// separate from the per-hash salt; without it an exfiltrated hash column is
/// not crackable offline.
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
}

impl PasswordHasher {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }

        let salt = SaltString::generate(&mut thread_rng());
        let hash = self
            .argon2()?
            .hash_password(self.peppered(password).as_bytes(), &salt)
            .map_err(|err| AuthError::Internal(format!("password hashing failed: {err}")))?
            .to_string();
        Ok(hash)
    }

    /// Ok(()) on match, `InvalidCredentials` on mismatch. Anything else
    /// (unparseable stored hash, hasher failure) is an internal error, so
    /// callers can tell "wrong password" from "hashing subsystem broke".
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|err| AuthError::Internal(format!("stored hash unparseable: {err}")))?;

        match self
            .argon2()?
            .verify_password(self.peppered(password).as_bytes(), &parsed)
        {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(AuthError::InvalidCredentials),
            Err(err) => Err(AuthError::Internal(format!(
                "password verification failed: {err}"
            ))),
        }
    }

    fn peppered(&self, password: &str) -> String {
        format!("{password}{}", self.pepper)
    }

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(MEMORY_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
            .map_err(|err| AuthError::Internal(format!("bad argon2 params: {err}")))?;
        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::PasswordHasher;
    use crate::auth::error::AuthError;

    #[test]
    fn verify_accepts_matching_password() {
        let hasher = PasswordHasher::new("unit-test-pepper");
        let hash = hasher.hash("correct horse battery").expect("hash");
        hasher
            .verify("correct horse battery", &hash)
            .expect("matching password should verify");
    }

    #[test]
    fn verify_rejects_wrong_password_as_invalid_credentials() {
        let hasher = PasswordHasher::new("unit-test-pepper");
        let hash = hasher.hash("correct horse battery").expect("hash");

        let err = hasher
            .verify("incorrect horse battery", &hash)
            .expect_err("wrong password should fail");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn verify_is_pepper_sensitive() {
        let hasher = PasswordHasher::new("pepper-a");
        let hash = hasher.hash("correct horse battery").expect("hash");

        let other = PasswordHasher::new("pepper-b");
        let err = other
            .verify("correct horse battery", &hash)
            .expect_err("different pepper should fail");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn short_passwords_are_rejected_at_hash_time() {
        let hasher = PasswordHasher::new("unit-test-pepper");
        let err = hasher.hash("short").expect_err("short password");
        assert!(matches!(err, AuthError::PasswordTooShort));
    }

    #[test]
    fn corrupt_stored_hash_is_an_internal_error_not_a_mismatch() {
        let hasher = PasswordHasher::new("unit-test-pepper");
        let err = hasher
            .verify("correct horse battery", "not-a-phc-string")
            .expect_err("corrupt hash should fail");
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
