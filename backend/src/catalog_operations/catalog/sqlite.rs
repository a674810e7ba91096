// catalog/sqlite.rs
use super::{CatalogStore, Collection, Document};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Sqlite, SqlitePool, Transaction};
use tracing::info;

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to database at: {database_url}"))?;
        let catalog = Self::new(pool);
        catalog.initialize().await?;
        Ok(catalog)
    }

    /// Single-connection in-memory catalog. The connection is never
    /// recycled, otherwise the database would vanish with it.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory catalog")?;
        let catalog = Self::new(pool);
        catalog.initialize().await?;
        Ok(catalog)
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_documents (
                collection   TEXT NOT NULL,
                doc_key      TEXT NOT NULL,
                body         TEXT NOT NULL,
                PRIMARY KEY (collection, doc_key)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create catalog_documents table")?;

        info!("catalog schema ready");
        Ok(())
    }

    async fn insert_in(tx: &mut Transaction<'_, Sqlite>, coll: Collection, docs: &[Document]) -> Result<()> {
        for doc in docs {
            let body = serde_json::to_string(&doc.body)?;
            sqlx::query(
                r#"
                INSERT INTO catalog_documents (collection, doc_key, body)
                VALUES (?, ?, ?)
                ON CONFLICT(collection, doc_key) DO UPDATE SET body = excluded.body
                "#,
            )
            .bind(coll.as_str())
            .bind(&doc.key)
            .bind(body)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("insert {} into {coll}", doc.key))?;
        }
        Ok(())
    }
}

fn decode_row(coll: Collection, (key, body): (String, String)) -> Result<Document> {
    let body = serde_json::from_str(&body)
        .with_context(|| format!("corrupt document {key} in {coll}"))?;
    Ok(Document { key, body })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn upsert(&self, coll: Collection, doc: Document) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_in(&mut tx, coll, std::slice::from_ref(&doc)).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_all(&self, coll: Collection) -> Result<Vec<Document>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT doc_key, body FROM catalog_documents WHERE collection = ? ORDER BY doc_key",
        )
        .bind(coll.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("scan {coll}"))?;

        rows.into_iter().map(|row| decode_row(coll, row)).collect()
    }

    async fn find_one(&self, coll: Collection, key: &str) -> Result<Option<Document>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT doc_key, body FROM catalog_documents WHERE collection = ? AND doc_key = ?",
        )
        .bind(coll.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get {key} from {coll}"))?;

        row.map(|row| decode_row(coll, row)).transpose()
    }

    async fn insert_many(&self, coll: Collection, docs: Vec<Document>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_in(&mut tx, coll, &docs).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_all(&self, coll: Collection) -> Result<()> {
        sqlx::query("DELETE FROM catalog_documents WHERE collection = ?")
            .bind(coll.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("remove current data of {coll}"))?;
        Ok(())
    }

    async fn drop_collection(&self, coll: Collection) -> Result<()> {
        // Collections are rows of one table, so dropping is deleting.
        self.delete_all(coll).await
    }

    async fn replace_all(&self, coll: Collection, docs: Vec<Document>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM catalog_documents WHERE collection = ?")
            .bind(coll.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("clear {coll}"))?;
        Self::insert_in(&mut tx, coll, &docs).await?;
        tx.commit().await.with_context(|| format!("commit {coll}"))?;
        Ok(())
    }
}
