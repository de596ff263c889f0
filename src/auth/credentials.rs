use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::AppError;

pub const INVALID_CREDENTIAL: &str = "Invalid credential.";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern is valid")
});

/// Email/password pair as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Structural check only. Says nothing about whether the email is registered.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.is_empty() || email.len() > 254 || !EMAIL_RE.is_match(email) {
        return Err(AppError::Validation(INVALID_CREDENTIAL.into()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::Validation(INVALID_CREDENTIAL.into()));
    }
    Ok(())
}

/// Salted bcrypt hash for storage.
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Constant-time check of a plaintext password against a stored hash.
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn accepts_well_formed_credentials() {
        assert!(Credentials::new("a@test.com", "pw1").validate().is_ok());
        assert!(Credentials::new("first.last+tag@sub.example.org", "x").validate().is_ok());
    }

    #[test]
    fn rejects_empty_email() {
        let err = Credentials::new("", "pw1").validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == INVALID_CREDENTIAL));
    }

    #[test]
    fn rejects_malformed_email() {
        for email in ["plain", "a@", "@test.com", "a@test", "a b@test.com", "a@test..com"] {
            assert!(
                Credentials::new(email, "pw1").validate().is_err(),
                "{email} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_password() {
        assert!(Credentials::new("a@test.com", "").validate().is_err());
    }

    #[test]
    fn whitespace_password_is_not_empty() {
        assert!(Credentials::new("a@test.com", " ").validate().is_ok());
    }

    #[test]
    fn hash_is_salted_and_verifies() {
        let h1 = hash_password("pw1", TEST_COST).unwrap();
        let h2 = hash_password("pw1", TEST_COST).unwrap();
        assert_ne!(h1, h2);
        assert_ne!(h1, "pw1");
        assert!(verify_password("pw1", &h1));
        assert!(verify_password("pw1", &h2));
    }

    #[test]
    fn verification_is_exact() {
        let hash = hash_password("pw1", TEST_COST).unwrap();
        assert!(!verify_password("PW1", &hash));
        assert!(!verify_password("pw1 ", &hash));
        assert!(!verify_password("", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("pw1", "pw1"));
    }
}
