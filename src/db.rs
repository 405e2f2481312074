use std::sync::Arc;

use anyhow::Context;
use sqlx::MySqlPool;

use crate::store::{InMemoryStore, MySqlStore, RecordStore};

/// Opens the configured record store: MySQL when a database URL is given,
/// otherwise a process-local in-memory store.
pub async fn init_db(
    database_url: Option<&str>,
    channel_capacity: usize,
) -> anyhow::Result<Arc<dyn RecordStore>> {
    match database_url {
        Some(url) => {
            let pool = MySqlPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let store = MySqlStore::new(pool, channel_capacity);
            store
                .ensure_schema()
                .await
                .context("Failed to prepare records table")?;
            log::info!("Using MySQL record store");
            Ok(Arc::new(store))
        }
        None => {
            log::warn!("DATABASE_URL not set, records are kept in memory only");
            Ok(Arc::new(InMemoryStore::new(channel_capacity)))
        }
    }
}
