use crate::store::{DocumentPath, DocumentStore, Snapshot, StoreError, WriteBatch};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::instrument;

/// Document store backed by a single Postgres `documents` table.
///
/// A batch runs inside one transaction. Creating a document is an insert that does nothing when
/// the path already exists; updating is a compare-and-set on `version`. Either touching zero rows
/// means another writer got there first, and the transaction is rolled back.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &DocumentPath) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>("SELECT data, version FROM documents WHERE path = $1")
            .bind(path.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(data, version)| Snapshot { data, version: u64::try_from(version).unwrap_or(0) }))
    }

    #[instrument(skip(self, batch), fields(writes = batch.writes().len()))]
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for write in batch.into_writes() {
            let key = write.path.to_string();
            let affected = if write.expected_version == 0 {
                sqlx::query("INSERT INTO documents (path, data, version, updated_at) VALUES ($1, $2, 1, NOW()) ON CONFLICT (path) DO NOTHING")
                    .bind(&key)
                    .bind(&write.data)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
            } else {
                let expected = i64::try_from(write.expected_version).unwrap_or(i64::MAX);
                sqlx::query("UPDATE documents SET data = $2, version = version + 1, updated_at = NOW() WHERE path = $1 AND version = $3")
                    .bind(&key)
                    .bind(&write.data)
                    .bind(expected)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
            };
            if affected == 0 {
                tx.rollback().await?;
                return Err(StoreError::Conflict { path: key });
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
