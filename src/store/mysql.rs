use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, MySqlPool};
use tokio::sync::broadcast;

use super::{ChangeEvent, ChangeFeed, Collection, Record, RecordStore, StoreError};

const CREATE_RECORDS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        collection VARCHAR(32) NOT NULL,
        id VARCHAR(64) NOT NULL,
        body LONGTEXT NOT NULL,
        created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
        updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6) ON UPDATE CURRENT_TIMESTAMP(6),
        PRIMARY KEY (collection, id)
    )
"#;

#[derive(FromRow)]
struct RecordRow {
    id: String,
    body: String,
}

/// MySQL-backed store: one `records` table keyed by (collection, id).
///
/// The change feed covers writes made through this process.
pub struct MySqlStore {
    pool: MySqlPool,
    feed: ChangeFeed,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool, feed_capacity: usize) -> Self {
        Self {
            pool,
            feed: ChangeFeed::new(feed_capacity),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_RECORDS_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

fn is_duplicate_key(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23000");
    }
    false
}

#[async_trait]
impl RecordStore for MySqlStore {
    async fn load(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, body
            FROM records
            WHERE collection = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(collection.as_ref())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Record, StoreError> {
                Ok(Record {
                    id: row.id,
                    body: serde_json::from_str(&row.body)?,
                })
            })
            .collect()
    }

    async fn put(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO records (collection, id, body)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE body = VALUES(body)
            "#,
        )
        .bind(collection.as_ref())
        .bind(id)
        .bind(body.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, %collection, id, "Record upsert failed");
            StoreError::from(e)
        })?;

        self.feed.upserted(collection, id, body);
        Ok(())
    }

    async fn append(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO records (collection, id, body)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(collection.as_ref())
        .bind(id)
        .bind(body.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                self.feed.upserted(collection, id, body);
                Ok(())
            }
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate {
                collection,
                id: id.to_string(),
            }),
            Err(e) => {
                tracing::error!(error = %e, %collection, id, "Record append failed");
                Err(e.into())
            }
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection.as_ref())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing {
                collection,
                id: id.to_string(),
            });
        }

        self.feed.deleted(collection, id);
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe(collection)
    }
}
