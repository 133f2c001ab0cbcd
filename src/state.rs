use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    storage::DocumentStore,
};

pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared by every API handler. Mail delivery is not reachable from here;
/// handlers only queue alerts and the worker sends them.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub documents: Arc<dyn DocumentStore>,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        documents: Arc<dyn DocumentStore>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            documents,
            jwt: Arc::new(jwt),
        }
    }

    /// Pooled connection for handler-local diesel work.
    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool.get().map_err(|err| {
            tracing::error!(error = %err, "database pool exhausted");
            AppError::internal("database unavailable")
        })
    }
}
