use crate::db::models::Post;
use crate::error::{AppError, NOT_THE_AUTHOR};
use crate::extractors::CurrentUser;

/// Allow a post mutation only when the caller is its author. Exact match.
pub fn ensure_author(user: &CurrentUser, post: &Post) -> Result<(), AppError> {
    if post.author == user.id {
        return Ok(());
    }
    tracing::warn!(
        user_id = %user.id,
        post_id = %post.id,
        "Rejected post mutation by non-author"
    );
    Err(AppError::Forbidden(NOT_THE_AUTHOR.into()))
}
