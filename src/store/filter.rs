// Typed equality filters - the "condition map" of the record store without
// stringly field names. Columns come from closed enums, never from input.
use std::fmt;

use crate::db::models::{Post, User};

/// A comparable column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
}

impl Value {
    /// SQL equality semantics: `NULL` never equals anything, itself included.
    pub fn sql_eq(&self, other: &Value) -> bool {
        !matches!(self, Value::Null) && self == other
    }

    pub(crate) fn to_sql(&self) -> rusqlite::types::Value {
        match self {
            Value::Null => rusqlite::types::Value::Null,
            Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
            Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A filterable column of some entity table.
pub trait Field: Copy + fmt::Debug + Send + Sync + 'static {
    fn column(self) -> &'static str;
}

/// A record that can report the value of each of its filterable fields.
pub trait Record<F: Field> {
    fn value_of(&self, field: F) -> Value;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Id,
    Email,
    SessionTokenHash,
}

impl Field for UserField {
    fn column(self) -> &'static str {
        match self {
            UserField::Id => "id",
            UserField::Email => "email",
            UserField::SessionTokenHash => "session_token_hash",
        }
    }
}

impl Record<UserField> for User {
    fn value_of(&self, field: UserField) -> Value {
        match field {
            UserField::Id => self.id.as_str().into(),
            UserField::Email => self.email.as_str().into(),
            UserField::SessionTokenHash => self.session_token_hash().into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostField {
    Id,
    Author,
}

impl Field for PostField {
    fn column(self) -> &'static str {
        match self {
            PostField::Id => "id",
            PostField::Author => "author",
        }
    }
}

impl Record<PostField> for Post {
    fn value_of(&self, field: PostField) -> Value {
        match field {
            PostField::Id => self.id.as_str().into(),
            PostField::Author => self.author.as_str().into(),
        }
    }
}

/// Conjunction of `field = value` terms. Empty matches every record.
#[derive(Debug, Clone)]
pub struct Filter<F: Field> {
    terms: Vec<(F, Value)>,
}

pub type UserFilter = Filter<UserField>;
pub type PostFilter = Filter<PostField>;

impl<F: Field> Default for Filter<F> {
    fn default() -> Self {
        Self { terms: Vec::new() }
    }
}

impl<F: Field> Filter<F> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: F, value: impl Into<Value>) -> Self {
        self.terms.push((field, value.into()));
        self
    }

    pub fn matches<R: Record<F>>(&self, record: &R) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| record.value_of(*field).sql_eq(value))
    }

    /// Render as `WHERE a = ?1 AND b = ?2` plus positional parameters.
    /// Empty filter renders as an empty clause.
    pub(crate) fn to_sql(&self) -> (String, Vec<rusqlite::types::Value>) {
        if self.terms.is_empty() {
            return (String::new(), Vec::new());
        }
        let clause = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ?{}", field.column(), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params = self.terms.iter().map(|(_, v)| v.to_sql()).collect();
        (format!(" WHERE {}", clause), params)
    }
}

impl UserFilter {
    pub fn by_id(id: &str) -> Self {
        Self::all().eq(UserField::Id, id)
    }

    pub fn by_email(email: &str) -> Self {
        Self::all().eq(UserField::Email, email)
    }

    pub fn by_token_hash(token_hash: &str) -> Self {
        Self::all().eq(UserField::SessionTokenHash, token_hash)
    }
}

impl PostFilter {
    pub fn by_id(id: &str) -> Self {
        Self::all().eq(PostField::Id, id)
    }

    pub fn by_author(author: &str) -> Self {
        Self::all().eq(PostField::Author, author)
    }
}
