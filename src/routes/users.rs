use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::credentials::{self, Credentials};
use crate::db::models::UserView;
use crate::error::{AppError, AppResult, EMAIL_TAKEN};
use crate::extractors::{get_cookie_value, ApiJson, CurrentUser};
use crate::routes::not_found;
use crate::state::AppState;
use crate::store::{StoreError, UserFilter};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/users/me", get(me).put(update_me).delete(delete_me))
}

// -- Cookies --

fn session_cookie(name: &str, token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

// -- Request bodies --

#[derive(Deserialize)]
pub struct LogoutRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

// -- Handlers --

async fn register(
    State(state): State<AppState>,
    ApiJson(creds): ApiJson<Credentials>,
) -> AppResult<Json<UserView>> {
    creds.validate()?;
    let user = state.sessions.register(&creds).await?;
    Ok(Json(UserView::from(&user)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(creds): ApiJson<Credentials>,
) -> AppResult<impl IntoResponse> {
    let issued = state.sessions.login(&creds.email, &creds.password).await?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        issued.token.as_str(),
        state.sessions.ttl().num_seconds(),
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LogoutRequest>,
) -> AppResult<impl IntoResponse> {
    let cookie_name = &state.config.auth.cookie_name;
    let token = get_cookie_value(&headers, cookie_name);
    state.sessions.logout(&body.email, token).await?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
    ))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<UserView>> {
    let user = state
        .store
        .query_user(&UserFilter::by_id(&user.id))
        .await
        .map_err(not_found("User"))?;
    Ok(Json(UserView::from(&user)))
}

async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<UserView>> {
    let mut user = state
        .store
        .query_user(&UserFilter::by_id(&current.id))
        .await
        .map_err(not_found("User"))?;

    if let Some(email) = body.email {
        credentials::validate_email(&email)?;
        user.email = email;
    }
    if let Some(password) = body.password {
        credentials::validate_password(&password)?;
        user.password_hash = state.sessions.hash_password(&password).await?;
    }

    let user = state.store.update_user(&user).await.map_err(|e| match e {
        StoreError::ConstraintViolation(_) => AppError::Validation(EMAIL_TAKEN.into()),
        other => not_found("User")(other),
    })?;
    tracing::info!(user_id = %user.id, "Updated user");
    Ok(Json(UserView::from(&user)))
}

async fn delete_me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let user = state
        .store
        .delete_user(&UserFilter::by_id(&current.id))
        .await
        .map_err(not_found("User"))?;
    tracing::info!(user_id = %user.id, "Deleted user");
    Ok((
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
        Json(UserView::from(&user)),
    ))
}
