//! `PostgreSQL` primary store.
//!
//! Every entity kind lives in one JSONB document table:
//!
//! ```sql
//! storefront.document (kind TEXT, id UUID, data JSONB, created_at, updated_at)
//! ```
//!
//! Business-key uniqueness (user email, discount code, one cart per user) is
//! enforced by partial unique indexes; see `migrations/0001_documents.sql`.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;
use uuid::Uuid;

use super::store::{Document, Filter, Kind, PrimaryStore, StoreError};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(
                db_err
                    .constraint()
                    .map_or_else(|| "duplicate key".to_owned(), str::to_owned),
            );
        }
        Self::Unavailable(e.to_string())
    }
}

/// Primary store backed by a `sqlx` connection pool.
#[derive(Debug, Clone)]
pub struct PgPrimaryStore {
    pool: PgPool,
}

impl PgPrimaryStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrimaryStore for PgPrimaryStore {
    #[instrument(skip(self))]
    async fn get(&self, kind: Kind, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_scalar::<_, Json<Document>>(
            r"
            SELECT data FROM storefront.document
            WHERE kind = $1 AND id = $2
            ",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|Json(data)| data))
    }

    #[instrument(skip(self))]
    async fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<Document>>(
            r"
            SELECT data FROM storefront.document
            WHERE kind = $1 AND data @> $2
            ORDER BY created_at, id
            ",
        )
        .bind(kind.as_str())
        .bind(Json(filter.as_containment()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|Json(data)| data).collect())
    }

    #[instrument(skip(self, document))]
    async fn create(
        &self,
        kind: Kind,
        id: Uuid,
        document: Document,
    ) -> Result<Document, StoreError> {
        let Json(data) = sqlx::query_scalar::<_, Json<Document>>(
            r"
            INSERT INTO storefront.document (kind, id, data)
            VALUES ($1, $2, $3)
            RETURNING data
            ",
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(Json(document))
        .fetch_one(&self.pool)
        .await?;

        Ok(data)
    }

    #[instrument(skip(self, patch))]
    async fn update(
        &self,
        kind: Kind,
        id: Uuid,
        mut patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        if let Some(fields) = patch.as_object_mut() {
            fields.remove("id");
        }

        let row = sqlx::query_scalar::<_, Json<Document>>(
            r"
            UPDATE storefront.document
            SET data = data || $3, updated_at = now()
            WHERE kind = $1 AND id = $2
            RETURNING data
            ",
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(Json(patch))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|Json(data)| data))
    }

    #[instrument(skip(self))]
    async fn delete(&self, kind: Kind, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM storefront.document WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
