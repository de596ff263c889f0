use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::extractors::{get_cookie_value, CurrentUser};
use crate::state::AppState;

/// Gatekeeper for protected routes. Resolves the session cookie to a user
/// and attaches it as [`CurrentUser`]; rejects with 401 otherwise.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token =
        get_cookie_value(req.headers(), &state.config.auth.cookie_name).map(str::to_owned);
    let user = state.sessions.validate_token(token.as_deref()).await.map_err(|e| {
        tracing::debug!(path = %req.uri().path(), "Rejected request: {}", e);
        AppError::from(e)
    })?;

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        email: user.email,
    });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    use crate::auth::credentials::Credentials;
    use crate::config::Config;
    use crate::error::{TOKEN_INVALID, TOKEN_NOT_FOUND};
    use crate::store::MemoryStore;

    async fn whoami(user: CurrentUser) -> String {
        user.email
    }

    fn test_state() -> AppState {
        let mut config = Config::default();
        config.auth.bcrypt_cost = 4;
        AppState::new(Arc::new(MemoryStore::new()), config)
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    async fn call(app: Router, cookie: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn missing_cookie_is_token_not_found() {
        let (status, body) = call(app(test_state()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains(TOKEN_NOT_FOUND));
    }

    #[tokio::test]
    async fn unknown_token_is_token_invalid() {
        let (status, body) = call(app(test_state()), Some("access_token=deadbeef")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains(TOKEN_INVALID));
    }

    #[tokio::test]
    async fn valid_token_reaches_handler_with_identity() {
        let state = test_state();
        state
            .sessions
            .register(&Credentials::new("a@test.com", "pw1"))
            .await
            .unwrap();
        let issued = state.sessions.login("a@test.com", "pw1").await.unwrap();

        let cookie = format!("access_token={}", issued.token.as_str());
        let (status, body) = call(app(state), Some(&cookie)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a@test.com");
    }
}
