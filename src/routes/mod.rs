pub mod posts;
pub mod users;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::auth::middleware::require_auth;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::StoreError;

/// Full HTTP surface. Protected routes sit behind `require_auth`; reads and
/// the login flow are public.
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(users::protected_router())
        .merge(posts::protected_router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(users::router())
        .merge(posts::router())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn a store miss into a client-facing 400, leaving real failures as 500s.
pub(crate) fn not_found(what: &'static str) -> impl FnOnce(StoreError) -> AppError {
    move |err| match err {
        StoreError::NotFound => AppError::NotFound(format!("{what} not found.")),
        other => AppError::Store(other),
    }
}
