//! Shared application state handed to every router.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::notifications::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub http: reqwest::Client,
    pub config: Arc<AppConfig>,
    pub registry: ConnectionRegistry,
    pub nats: Option<async_nats::Client>,
}
