// Record store - the persistence boundary for users and posts.
// Owns no business rules; callers get exactly what they ask for.
pub mod filter;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{NewPost, NewUser, Post, User};

pub use filter::{Filter, PostField, PostFilter, UserField, UserFilter, Value};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(msg.unwrap_or_else(|| code.to_string()))
            }
            other => StoreError::Sql(other),
        }
    }
}

/// Condition-based access to users and posts.
///
/// `query_*` and `delete_*` act on the first record (insertion order)
/// matching the filter. `update_*` addresses the record by its id and
/// fails with `NotFound` when it no longer exists.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query_user(&self, filter: &UserFilter) -> Result<User, StoreError>;

    /// Persist a new user, assigning id and timestamps.
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Persist email, password hash and session marker. Returns the stored row.
    async fn update_user(&self, user: &User) -> Result<User, StoreError>;

    /// Remove the first matching user together with its posts.
    async fn delete_user(&self, filter: &UserFilter) -> Result<User, StoreError>;

    async fn query_post(&self, filter: &PostFilter) -> Result<Post, StoreError>;

    /// All matching posts, oldest first.
    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, StoreError>;

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError>;

    /// Persist content fields. The author is never rewritten.
    async fn update_post(&self, post: &Post) -> Result<Post, StoreError>;

    async fn delete_post(&self, filter: &PostFilter) -> Result<Post, StoreError>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
