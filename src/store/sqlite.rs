use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::{new_id, PostFilter, RecordStore, StoreError, UserFilter};
use crate::db::models::{ActiveSession, NewPost, NewUser, Post, Tags, User};
use crate::state::DbPool;

const USER_COLUMNS: &str =
    "id, email, password_hash, session_token_hash, token_expires_in, created_at, updated_at";
const POST_COLUMNS: &str = "id, author, document, comments, tags, likes, created_at, updated_at";

/// SQLite implementation over the shared r2d2 pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run `f` on a pooled connection off the async runtime.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let token_hash: Option<String> = row.get(3)?;
    let expires_at: i64 = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        session: ActiveSession::from_columns(token_hash, expires_at),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Raw `posts` row; JSON columns are decoded afterwards so a corrupt value
/// surfaces as a serialization error rather than a generic SQL one.
struct PostRow {
    id: String,
    author: String,
    document: String,
    comments: String,
    tags: String,
    likes: u32,
    created_at: String,
    updated_at: String,
}

impl PostRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author: row.get(1)?,
            document: row.get(2)?,
            comments: row.get(3)?,
            tags: row.get(4)?,
            likes: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl TryFrom<PostRow> for Post {
    type Error = StoreError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let comments: Vec<String> = serde_json::from_str(&row.comments)?;
        let tags: Tags = serde_json::from_str(&row.tags)?;
        Ok(Post {
            id: row.id,
            author: row.author,
            document: row.document,
            comments,
            tags,
            likes: row.likes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn first_user(conn: &Connection, filter: &UserFilter) -> Result<User, StoreError> {
    let (clause, values) = filter.to_sql();
    let sql = format!(
        "SELECT {} FROM users{} ORDER BY rowid LIMIT 1",
        USER_COLUMNS, clause
    );
    let user = conn.query_row(&sql, params_from_iter(values.iter()), user_from_row)?;
    Ok(user)
}

fn user_by_id(conn: &Connection, id: &str) -> Result<User, StoreError> {
    first_user(conn, &UserFilter::by_id(id))
}

fn matching_posts(
    conn: &Connection,
    filter: &PostFilter,
    limit: Option<u32>,
) -> Result<Vec<Post>, StoreError> {
    let (clause, values) = filter.to_sql();
    let mut sql = format!("SELECT {} FROM posts{} ORDER BY rowid", POST_COLUMNS, clause);
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), PostRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(Post::try_from).collect()
}

fn first_post(conn: &Connection, filter: &PostFilter) -> Result<Post, StoreError> {
    matching_posts(conn, filter, Some(1))?
        .into_iter()
        .next()
        .ok_or(StoreError::NotFound)
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn query_user(&self, filter: &UserFilter) -> Result<User, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| first_user(conn, &filter)).await
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.with_conn(move |conn| {
            let id = new_id();
            conn.execute(
                "INSERT INTO users (id, email, password_hash) VALUES (?1, ?2, ?3)",
                params![id, user.email, user.password_hash],
            )?;
            user_by_id(conn, &id)
        })
        .await
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let user = user.clone();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE users SET email = ?1, password_hash = ?2, session_token_hash = ?3,
                        token_expires_in = ?4, updated_at = datetime('now')
                 WHERE id = ?5",
                params![
                    user.email,
                    user.password_hash,
                    user.session_token_hash(),
                    user.token_expires_in(),
                    user.id
                ],
            )?;
            if rows == 0 {
                return Err(StoreError::NotFound);
            }
            user_by_id(conn, &user.id)
        })
        .await
    }

    async fn delete_user(&self, filter: &UserFilter) -> Result<User, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let user = first_user(&tx, &filter)?;
            tx.execute("DELETE FROM users WHERE id = ?1", params![user.id])?;
            tx.commit()?;
            Ok(user)
        })
        .await
    }

    async fn query_post(&self, filter: &PostFilter) -> Result<Post, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| first_post(conn, &filter)).await
    }

    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| matching_posts(conn, &filter, None))
            .await
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError> {
        self.with_conn(move |conn| {
            let id = new_id();
            conn.execute(
                "INSERT INTO posts (id, author, document, comments, tags, likes)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    id,
                    post.author,
                    post.document,
                    serde_json::to_string(&post.comments)?,
                    serde_json::to_string(&post.tags)?,
                ],
            )?;
            first_post(conn, &PostFilter::by_id(&id))
        })
        .await
    }

    async fn update_post(&self, post: &Post) -> Result<Post, StoreError> {
        let post = post.clone();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE posts SET document = ?1, comments = ?2, tags = ?3, likes = ?4,
                        updated_at = datetime('now')
                 WHERE id = ?5",
                params![
                    post.document,
                    serde_json::to_string(&post.comments)?,
                    serde_json::to_string(&post.tags)?,
                    post.likes,
                    post.id
                ],
            )?;
            if rows == 0 {
                return Err(StoreError::NotFound);
            }
            first_post(conn, &PostFilter::by_id(&post.id))
        })
        .await
    }

    async fn delete_post(&self, filter: &PostFilter) -> Result<Post, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let post = first_post(&tx, &filter)?;
            tx.execute("DELETE FROM posts WHERE id = ?1", params![post.id])?;
            tx.commit()?;
            Ok(post)
        })
        .await
    }
}
