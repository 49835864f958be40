//! PostgreSQL implementation of the store traits.

mod commits;
mod identity;
mod projects;
mod pull_requests;
mod repositories;
mod stats;

use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::AsyncPgConnection;

use crate::db::DbPool;
use crate::error::CoreResult;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> CoreResult<Object<AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }
}
