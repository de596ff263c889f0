use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side record of a user's login: the SHA-256 digest of the token
/// handed to the client and the unix time it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub token_hash: String,
    pub expires_at: i64,
}

impl ActiveSession {
    /// Rebuild from the two `users` columns. An expiry of `0` (or a missing
    /// digest) is the "no session" sentinel.
    pub fn from_columns(token_hash: Option<String>, expires_at: i64) -> Option<Self> {
        match token_hash {
            Some(token_hash) if expires_at > 0 && !token_hash.is_empty() => Some(Self {
                token_hash,
                expires_at,
            }),
            _ => None,
        }
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now.timestamp()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub session: Option<ActiveSession>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Unix timestamp column value; `0` means no session.
    pub fn token_expires_in(&self) -> i64 {
        self.session.as_ref().map(|s| s.expires_at).unwrap_or(0)
    }

    pub fn session_token_hash(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token_hash.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

/// Ordered set of tags. Duplicates are dropped, keeping the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        let mut out: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !out.contains(&tag) {
                out.push(tag);
            }
        }
        Self(out)
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub document: String,
    pub comments: Vec<String>,
    pub tags: Tags,
    pub likes: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author: String,
    pub document: String,
    pub comments: Vec<String>,
    pub tags: Tags,
}

// -- Response views --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub id: String,
    pub email: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostView {
    pub id: String,
    pub author: String,
    pub doc: String,
    pub comments: Vec<String>,
    pub tags: Tags,
    pub likes: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            author: post.author,
            doc: post.document,
            comments: post.comments,
            tags: post.tags,
            likes: post.likes,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn tags_drop_duplicates_keeping_order() {
        let tags = Tags::from(vec![
            "rust".to_string(),
            "web".to_string(),
            "rust".to_string(),
            "db".to_string(),
        ]);
        assert_eq!(tags.as_slice(), &["rust", "web", "db"]);
    }

    #[test]
    fn tags_deserialize_as_an_ordered_set() {
        let tags: Tags = serde_json::from_str(r#"["b","a","b"]"#).unwrap();
        assert_eq!(tags.as_slice(), &["b", "a"]);
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"["b","a"]"#);
    }

    #[test]
    fn zero_expiry_means_no_session() {
        assert!(ActiveSession::from_columns(Some("abc".into()), 0).is_none());
        assert!(ActiveSession::from_columns(None, 1_700_000_000).is_none());
        assert!(ActiveSession::from_columns(Some("abc".into()), 1_700_000_000).is_some());
    }

    #[test]
    fn session_is_not_live_at_expiry() {
        let now = Utc::now();
        let session = ActiveSession {
            token_hash: "abc".into(),
            expires_at: now.timestamp(),
        };
        assert!(!session.is_live_at(now));
        assert!(session.is_live_at(now - Duration::seconds(1)));
    }
}
