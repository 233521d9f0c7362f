use std::time::Duration;

use anyhow::{Context, Result};
use diesel::{
    Connection, PgConnection,
    connection::CacheSize,
    r2d2::{ConnectionManager, CustomizeConnection, Error as R2d2Error, Pool},
};
use tracing::info;

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

pub type PgPoolSquad = Pool<ConnectionManager<PgConnection>>;

/// Statement caching is disabled for transaction-mode poolers.
#[derive(Debug)]
struct NoStatementCache;

impl CustomizeConnection<PgConnection, R2d2Error> for NoStatementCache {
    fn on_acquire(&self, conn: &mut PgConnection) -> std::result::Result<(), R2d2Error> {
        conn.set_prepared_statement_cache_size(CacheSize::Disabled);
        Ok(())
    }
}

pub fn establish_connection(database_url: &str, max_size: u32) -> Result<PgPoolSquad> {
    let pool = Pool::builder()
        .max_size(max_size.max(1))
        .connection_timeout(CHECKOUT_TIMEOUT)
        .connection_customizer(Box::new(NoStatementCache))
        .build(ConnectionManager::<PgConnection>::new(database_url))
        .context("failed to build postgres pool")?;

    info!(max_size = pool.max_size(), "postgres: pool ready");
    Ok(pool)
}
