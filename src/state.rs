use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::session::SessionManager;
use crate::config::Config;
use crate::store::RecordStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub sessions: SessionManager,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, config: Config) -> Self {
        let sessions = SessionManager::new(
            store.clone(),
            config.auth.session_ttl(),
            config.auth.bcrypt_cost,
        );
        Self {
            store,
            sessions,
            config,
        }
    }
}
