use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{new_id, PostFilter, RecordStore, StoreError, UserFilter};
use crate::db::models::{NewPost, NewUser, Post, User};

/// In-process store with the same contract as [`super::SqliteStore`],
/// including the unique-email constraint and cascading user deletes.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    posts: Vec<Post>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Tables {
    fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|u| u.email == email && Some(u.id.as_str()) != except_id)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query_user(&self, filter: &UserFilter) -> Result<User, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .users
            .iter()
            .find(|u| filter.matches(*u))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::ConstraintViolation(
                "UNIQUE constraint failed: users.email".into(),
            ));
        }
        let now = timestamp();
        let user = User {
            id: new_id(),
            email: user.email,
            password_hash: user.password_hash,
            session: None,
            created_at: now.clone(),
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        let idx = tables
            .users
            .iter()
            .position(|u| u.id == user.id)
            .ok_or(StoreError::NotFound)?;
        if tables.email_taken(&user.email, Some(&user.id)) {
            return Err(StoreError::ConstraintViolation(
                "UNIQUE constraint failed: users.email".into(),
            ));
        }
        let stored = &mut tables.users[idx];
        stored.email = user.email.clone();
        stored.password_hash = user.password_hash.clone();
        stored.session = user.session.clone();
        stored.updated_at = timestamp();
        Ok(stored.clone())
    }

    async fn delete_user(&self, filter: &UserFilter) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        let idx = tables
            .users
            .iter()
            .position(|u| filter.matches(u))
            .ok_or(StoreError::NotFound)?;
        let user = tables.users.remove(idx);
        tables.posts.retain(|p| p.author != user.id);
        Ok(user)
    }

    async fn query_post(&self, filter: &PostFilter) -> Result<Post, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .posts
            .iter()
            .find(|p| filter.matches(*p))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .filter(|p| filter.matches(*p))
            .cloned()
            .collect())
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.iter().any(|u| u.id == post.author) {
            return Err(StoreError::ConstraintViolation(
                "FOREIGN KEY constraint failed".into(),
            ));
        }
        let now = timestamp();
        let post = Post {
            id: new_id(),
            author: post.author,
            document: post.document,
            comments: post.comments,
            tags: post.tags,
            likes: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, post: &Post) -> Result<Post, StoreError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .posts
            .iter_mut()
            .find(|p| p.id == post.id)
            .ok_or(StoreError::NotFound)?;
        stored.document = post.document.clone();
        stored.comments = post.comments.clone();
        stored.tags = post.tags.clone();
        stored.likes = post.likes;
        stored.updated_at = timestamp();
        Ok(stored.clone())
    }

    async fn delete_post(&self, filter: &PostFilter) -> Result<Post, StoreError> {
        let mut tables = self.tables.lock().await;
        let idx = tables
            .posts
            .iter()
            .position(|p| filter.matches(p))
            .ok_or(StoreError::NotFound)?;
        Ok(tables.posts.remove(idx))
    }
}
