//! SQLite [`Store`] implementation backed by sqlx.
//!
//! Embeddings are stored as little-endian f32 BLOBs, cached task results
//! as JSON text. Chunks and cache entries cascade-delete with their
//! document.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{CacheEntry, Chunk, Document, DocumentStatus, EmbeddedChunk};

use super::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run the
    /// schema migration.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("failed to create db directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Config(format!("invalid db path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                text_length INTEGER NOT NULL DEFAULT 0,
                token_count INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_chunks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content     TEXT NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_doc ON document_chunks(document_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_embeddings (
                chunk_id  INTEGER PRIMARY KEY REFERENCES document_chunks(id) ON DELETE CASCADE,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS llm_cache (
                cache_key   TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                task        TEXT NOT NULL,
                result      TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_doc ON llm_cache(document_id, task)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let status: String = row.get("status");
    let created_at: i64 = row.get("created_at");
    Document {
        id: row.get("id"),
        title: row.get("title"),
        status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Error),
        text_length: row.get("text_length"),
        token_count: row.get("token_count"),
        created_at: DateTime::<Utc>::from_timestamp(created_at, 0).unwrap_or_default(),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO documents
                (id, title, status, text_length, token_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(doc.status.as_str())
        .bind(doc.text_length)
        .bind(doc.token_count)
        .bind(doc.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, status, text_length, token_count, created_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        text_length: Option<i64>,
        token_count: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET status = ?,
                text_length = COALESCE(?, text_length),
                token_count = COALESCE(?, token_count)
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(text_length)
        .bind(token_count)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_chunks(
        &self,
        document_id: &str,
        texts: &[String],
        token_counts: &[i64],
    ) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(texts.len());
        for (index, (text, tokens)) in texts.iter().zip(token_counts.iter()).enumerate() {
            let result = sqlx::query(
                r#"
                INSERT INTO document_chunks (document_id, chunk_index, content, token_count)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(document_id)
            .bind(index as i64)
            .bind(text)
            .bind(tokens)
            .execute(&self.pool)
            .await?;
            ids.push(result.last_insert_rowid());
        }
        Ok(ids)
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, token_count
            FROM document_chunks
            WHERE document_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Chunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                index: row.get("chunk_index"),
                content: row.get("content"),
                token_count: row.get("token_count"),
            })
            .collect())
    }

    async fn save_embeddings(&self, chunk_ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        for (chunk_id, vector) in chunk_ids.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding) VALUES (?, ?)",
            )
            .bind(chunk_id)
            .bind(vec_to_blob(vector))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn embeddings_for_document(&self, document_id: &str) -> Result<Vec<EmbeddedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT dc.id, dc.chunk_index, dc.content, ce.embedding
            FROM document_chunks dc
            JOIN chunk_embeddings ce ON ce.chunk_id = dc.id
            WHERE dc.document_id = ?
            ORDER BY dc.chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                EmbeddedChunk {
                    chunk_id: row.get("id"),
                    index: row.get("chunk_index"),
                    content: row.get("content"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn cached_result(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT result FROM llm_cache WHERE cache_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("result");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save_cached_result(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO llm_cache
                (cache_key, document_id, task, result, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.document_id)
        .bind(entry.task.as_str())
        .bind(serde_json::to_string(&entry.result)?)
        .bind(entry.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
