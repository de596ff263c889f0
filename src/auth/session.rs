use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::auth::credentials::{self, Credentials};
use crate::db::models::{ActiveSession, NewUser, User};
use crate::store::{RecordStore, StoreError, UserFilter};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("user does not exist")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("token not found")]
    TokenNotFound,

    #[error("token invalid")]
    TokenInvalid,

    #[error("email already registered")]
    EmailTaken,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConstraintViolation(_) => SessionError::EmailTaken,
            other => SessionError::Store(other),
        }
    }
}

/// Opaque value handed to the client. Only its digest is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Cryptographically random 32-byte hex token.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl ActiveSession {
    /// Exact, constant-time comparison of a presented token against this session.
    pub fn matches(&self, token: &SessionToken) -> bool {
        let presented = token.digest();
        presented.as_bytes().ct_eq(self.token_hash.as_bytes()).into()
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: User,
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

/// Issues, validates and invalidates the single active session of a user.
///
/// Every call re-reads the user from the store; nothing is cached. Two
/// concurrent logins for one user race and the last write wins.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn RecordStore>,
    ttl: Duration,
    bcrypt_cost: u32,
}

impl SessionManager {
    pub fn new(store: Arc<dyn RecordStore>, ttl: Duration, bcrypt_cost: u32) -> Self {
        Self {
            store,
            ttl,
            bcrypt_cost,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// bcrypt hash at the configured cost, computed on the blocking pool.
    pub async fn hash_password(&self, password: &str) -> Result<String, SessionError> {
        let password = password.to_owned();
        let cost = self.bcrypt_cost;
        let hash =
            tokio::task::spawn_blocking(move || credentials::hash_password(&password, cost))
                .await
                .map_err(|e| SessionError::Task(e.to_string()))??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, SessionError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || credentials::verify_password(&password, &hash))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))
    }

    /// Create a user from already-validated credentials. The password is hashed.
    pub async fn register(&self, creds: &Credentials) -> Result<User, SessionError> {
        let password_hash = self.hash_password(&creds.password).await?;
        let user = self
            .store
            .insert_user(NewUser {
                email: creds.email.clone(),
                password_hash,
            })
            .await?;
        tracing::info!(user_id = %user.id, "Registered user");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, SessionError> {
        let mut user = match self.store.query_user(&UserFilter::by_email(email)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(SessionError::UserNotFound),
            Err(e) => return Err(e.into()),
        };

        if !self.verify_password(password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Login rejected: wrong password");
            return Err(SessionError::WrongPassword);
        }

        let token = SessionToken::generate();
        let expires_at = Utc::now() + self.ttl;
        // A new login replaces whatever session the user had before.
        user.session = Some(ActiveSession {
            token_hash: token.digest(),
            expires_at: expires_at.timestamp(),
        });
        let user = self.store.update_user(&user).await?;

        tracing::info!(user_id = %user.id, "Session issued");
        Ok(IssuedSession {
            user,
            token,
            expires_at,
        })
    }

    /// Resolve a presented token to its user. Expired sessions are treated
    /// exactly like missing ones and are never extended here.
    pub async fn validate_token(&self, token: Option<&str>) -> Result<User, SessionError> {
        let token = SessionToken::new(token.ok_or(SessionError::TokenNotFound)?);

        let user = match self
            .store
            .query_user(&UserFilter::by_token_hash(&token.digest()))
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(SessionError::TokenInvalid),
            Err(e) => return Err(e.into()),
        };

        let live = user
            .session
            .as_ref()
            .is_some_and(|s| s.is_live_at(Utc::now()) && s.matches(&token));
        if live {
            Ok(user)
        } else {
            Err(SessionError::TokenInvalid)
        }
    }

    /// Clear the session of `email`, but only if `token` is that user's
    /// live session. On any failure nothing is written.
    pub async fn logout(&self, email: &str, token: Option<&str>) -> Result<User, SessionError> {
        let token = SessionToken::new(token.ok_or(SessionError::TokenNotFound)?);

        let mut user = match self.store.query_user(&UserFilter::by_email(email)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(SessionError::UserNotFound),
            Err(e) => return Err(e.into()),
        };

        let valid = user
            .session
            .as_ref()
            .is_some_and(|s| s.is_live_at(Utc::now()) && s.matches(&token));
        if !valid {
            tracing::warn!(user_id = %user.id, "Logout rejected: token invalid");
            return Err(SessionError::TokenInvalid);
        }

        user.session = None;
        let user = self.store.update_user(&user).await?;
        tracing::info!(user_id = %user.id, "Session cleared");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TEST_COST: u32 = 4;

    fn manager_with_ttl(ttl: Duration) -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone(), ttl, TEST_COST);
        (store, manager)
    }

    fn manager() -> (Arc<MemoryStore>, SessionManager) {
        manager_with_ttl(Duration::minutes(30))
    }

    async fn registered(manager: &SessionManager, email: &str, password: &str) -> User {
        manager
            .register(&Credentials::new(email, password))
            .await
            .unwrap()
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = SessionToken::generate();
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(SessionToken::generate(), SessionToken::generate());
    }

    #[test]
    fn digest_is_not_the_token() {
        let token = SessionToken::generate();
        assert_ne!(token.digest(), token.as_str());
        assert_eq!(token.digest(), token.digest());
    }

    #[tokio::test]
    async fn register_stores_a_hash_not_the_password() {
        let (_, manager) = manager();
        let user = registered(&manager, "a@test.com", "pw1").await;
        assert_ne!(user.password_hash, "pw1");
        assert!(user.session.is_none());
    }

    #[tokio::test]
    async fn register_twice_is_email_taken() {
        let (_, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        let err = manager
            .register(&Credentials::new("a@test.com", "pw2"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmailTaken));
    }

    #[tokio::test]
    async fn login_then_validate_returns_same_user() {
        let (_, manager) = manager();
        let user = registered(&manager, "a@test.com", "pw1").await;

        let issued = manager.login("a@test.com", "pw1").await.unwrap();
        assert_eq!(issued.user.id, user.id);

        let resolved = manager
            .validate_token(Some(issued.token.as_str()))
            .await
            .unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn login_stores_digest_only() {
        let (store, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        let issued = manager.login("a@test.com", "pw1").await.unwrap();

        let stored = store
            .query_user(&UserFilter::by_email("a@test.com"))
            .await
            .unwrap();
        let session = stored.session.unwrap();
        assert_ne!(session.token_hash, issued.token.as_str());
        assert_eq!(session.token_hash, issued.token.digest());
        assert_eq!(session.expires_at, issued.expires_at.timestamp());
    }

    #[tokio::test]
    async fn login_unknown_email_is_user_not_found() {
        let (_, manager) = manager();
        let err = manager.login("nobody@test.com", "pw1").await.unwrap_err();
        assert!(matches!(err, SessionError::UserNotFound));
    }

    #[tokio::test]
    async fn login_wrong_password_writes_nothing() {
        let (store, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        let err = manager.login("a@test.com", "wrong").await.unwrap_err();
        assert!(matches!(err, SessionError::WrongPassword));

        let stored = store
            .query_user(&UserFilter::by_email("a@test.com"))
            .await
            .unwrap();
        assert!(stored.session.is_none());
    }

    #[tokio::test]
    async fn password_comparison_is_exact() {
        let (_, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        assert!(manager.login("a@test.com", "PW1").await.is_err());
        assert!(manager.login("a@test.com", " pw1").await.is_err());
        assert!(manager.login("A@test.com", "pw1").await.is_err());
    }

    #[tokio::test]
    async fn second_login_replaces_first_session() {
        let (_, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        let first = manager.login("a@test.com", "pw1").await.unwrap();
        let second = manager.login("a@test.com", "pw1").await.unwrap();

        assert!(matches!(
            manager.validate_token(Some(first.token.as_str())).await,
            Err(SessionError::TokenInvalid)
        ));
        assert!(manager
            .validate_token(Some(second.token.as_str()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn missing_token_is_token_not_found() {
        let (_, manager) = manager();
        assert!(matches!(
            manager.validate_token(None).await,
            Err(SessionError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_token_is_token_invalid() {
        let (_, manager) = manager();
        let bogus = SessionToken::generate();
        assert!(matches!(
            manager.validate_token(Some(bogus.as_str())).await,
            Err(SessionError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn token_comparison_is_exact() {
        let (_, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        let issued = manager.login("a@test.com", "pw1").await.unwrap();
        let upper = issued.token.as_str().to_uppercase();
        let padded = format!(" {}", issued.token.as_str());
        assert!(manager.validate_token(Some(&upper)).await.is_err());
        assert!(manager.validate_token(Some(&padded)).await.is_err());
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let (_, manager) = manager_with_ttl(Duration::zero());
        registered(&manager, "a@test.com", "pw1").await;
        let issued = manager.login("a@test.com", "pw1").await.unwrap();

        assert!(matches!(
            manager.validate_token(Some(issued.token.as_str())).await,
            Err(SessionError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn stale_marker_is_not_extended_by_validation() {
        let (store, manager) = manager();
        let mut user = registered(&manager, "a@test.com", "pw1").await;
        let token = SessionToken::generate();
        let expired_at = (Utc::now() - Duration::minutes(1)).timestamp();
        user.session = Some(ActiveSession {
            token_hash: token.digest(),
            expires_at: expired_at,
        });
        store.update_user(&user).await.unwrap();

        assert!(manager.validate_token(Some(token.as_str())).await.is_err());

        let stored = store.query_user(&UserFilter::by_id(&user.id)).await.unwrap();
        assert_eq!(stored.token_expires_in(), expired_at);
    }

    #[tokio::test]
    async fn logout_clears_marker_and_token_stops_validating() {
        let (store, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        let issued = manager.login("a@test.com", "pw1").await.unwrap();

        manager
            .logout("a@test.com", Some(issued.token.as_str()))
            .await
            .unwrap();

        let stored = store
            .query_user(&UserFilter::by_email("a@test.com"))
            .await
            .unwrap();
        assert!(stored.session.is_none());
        assert_eq!(stored.token_expires_in(), 0);
        assert!(manager
            .validate_token(Some(issued.token.as_str()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn repeat_logout_is_token_invalid() {
        let (_, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        let issued = manager.login("a@test.com", "pw1").await.unwrap();
        manager
            .logout("a@test.com", Some(issued.token.as_str()))
            .await
            .unwrap();

        assert!(matches!(
            manager.logout("a@test.com", Some(issued.token.as_str())).await,
            Err(SessionError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn logout_with_another_users_token_keeps_session() {
        let (store, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        registered(&manager, "b@test.com", "pw2").await;
        let alice = manager.login("a@test.com", "pw1").await.unwrap();
        let bob = manager.login("b@test.com", "pw2").await.unwrap();

        assert!(matches!(
            manager.logout("a@test.com", Some(bob.token.as_str())).await,
            Err(SessionError::TokenInvalid)
        ));

        let stored = store
            .query_user(&UserFilter::by_email("a@test.com"))
            .await
            .unwrap();
        assert_eq!(stored.session_token_hash(), Some(alice.token.digest().as_str()));
    }

    #[tokio::test]
    async fn logout_with_expired_session_is_token_invalid() {
        let (store, manager) = manager_with_ttl(Duration::zero());
        registered(&manager, "a@test.com", "pw1").await;
        let issued = manager.login("a@test.com", "pw1").await.unwrap();

        assert!(matches!(
            manager.logout("a@test.com", Some(issued.token.as_str())).await,
            Err(SessionError::TokenInvalid)
        ));

        let stored = store
            .query_user(&UserFilter::by_email("a@test.com"))
            .await
            .unwrap();
        assert_eq!(stored.token_expires_in(), issued.expires_at.timestamp());
        assert_eq!(stored.session_token_hash(), Some(issued.token.digest().as_str()));
    }

    #[tokio::test]
    async fn hash_password_produces_verifiable_hash() {
        let (_, manager) = manager();
        let hash = manager.hash_password("pw1").await.unwrap();
        assert_ne!(hash, "pw1");
        assert!(manager.verify_password("pw1", &hash).await.unwrap());
        assert!(!manager.verify_password("pw2", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn logout_without_token_is_token_not_found() {
        let (_, manager) = manager();
        registered(&manager, "a@test.com", "pw1").await;
        assert!(matches!(
            manager.logout("a@test.com", None).await,
            Err(SessionError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn logout_unknown_email_is_user_not_found() {
        let (_, manager) = manager();
        let token = SessionToken::generate();
        assert!(matches!(
            manager.logout("nobody@test.com", Some(token.as_str())).await,
            Err(SessionError::UserNotFound)
        ));
    }
}
